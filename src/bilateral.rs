use ndarray::{Array2, Zip};

use crate::memory::Array2Recycle;

/// Edge-preserving depth denoiser.
///
/// Every window sample is weighted by a precomputed spatial Gaussian and a
/// range Gaussian on its depth difference to the center pixel, so smoothing
/// never blurs across depth discontinuities. Zero depth marks an invalid
/// measurement; it passes through untouched and is skipped as a neighbor.
pub struct BilateralFilter {
    /// Window radius in pixels.
    pub radius: usize,
    /// Range sigma in meters.
    pub e_d: f32,
    spatial: Vec<f32>,
}

impl Default for BilateralFilter {
    fn default() -> Self {
        BilateralFilter::new(2, 4.0, 0.01)
    }
}

impl BilateralFilter {
    /// Creates a filter with a `2 * radius + 1` window.
    ///
    /// # Arguments
    ///
    /// * `radius`: Window radius in pixels.
    /// * `delta`: Spatial Gaussian sigma, in pixels.
    /// * `e_d`: Range Gaussian sigma, in meters.
    pub fn new(radius: usize, delta: f32, e_d: f32) -> Self {
        let spatial = (0..2 * radius + 1)
            .map(|i| {
                let x = i as f32 - radius as f32;
                (-(x * x) / (2.0 * delta * delta)).exp()
            })
            .collect();

        Self { radius, e_d, spatial }
    }

    /// Filters a depth image. It will try to reuse buffers if possible.
    ///
    /// # Arguments
    ///
    /// * `depth`: Input depth map in meters, 0 where invalid.
    /// * `result`: An Array Recycle to reuse memory.
    ///
    /// # Returns
    ///
    /// * The denoised depth map, same size, 0 where the input was 0.
    pub fn filter(&self, depth: &Array2<f32>, result: Array2Recycle<f32>) -> Array2<f32> {
        let (height, width) = depth.dim();
        let mut filtered = result.get((height, width));

        let radius = self.radius as i32;
        let inv_range = 1.0 / (2.0 * self.e_d * self.e_d);

        Zip::indexed(&mut filtered).par_for_each(|(row, col), out| {
            let center = depth[[row, col]];
            if center == 0.0 {
                *out = 0.0;
                return;
            }

            let mut weighted_sum = 0.0f32;
            let mut weight_sum = 0.0f32;
            for i in -radius..=radius {
                let sample_row = (row as i32 + i).clamp(0, height as i32 - 1) as usize;
                for j in -radius..=radius {
                    let sample_col = (col as i32 + j).clamp(0, width as i32 - 1) as usize;
                    let sample = depth[[sample_row, sample_col]];
                    if sample > 0.0 {
                        let diff = sample - center;
                        let factor = self.spatial[(i + radius) as usize]
                            * self.spatial[(j + radius) as usize]
                            * (-(diff * diff) * inv_range).exp();
                        weighted_sum += factor * sample;
                        weight_sum += factor;
                    }
                }
            }

            *out = if weight_sum > 0.0 {
                weighted_sum / weight_sum
            } else {
                0.0
            };
        });

        filtered
    }
}

#[cfg(test)]
mod tests {
    use super::BilateralFilter;
    use crate::memory::Array2Recycle;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    #[test]
    fn test_invalid_depth_passes_through() {
        let mut depth = Array2::<f32>::from_elem((32, 32), 1.5);
        depth[[4, 7]] = 0.0;
        depth[[20, 1]] = 0.0;
        depth[[31, 31]] = 0.0;

        let filtered = BilateralFilter::default().filter(&depth, Array2Recycle::Empty);

        assert_eq!(filtered[[4, 7]], 0.0);
        assert_eq!(filtered[[20, 1]], 0.0);
        assert_eq!(filtered[[31, 31]], 0.0);
    }

    #[test]
    fn test_flat_field_is_unchanged() {
        let depth = Array2::<f32>::from_elem((24, 40), 2.25);
        let filtered = BilateralFilter::default().filter(&depth, Array2Recycle::Empty);

        for value in filtered.iter() {
            assert_abs_diff_eq!(*value, 2.25, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_step_edge_is_preserved() {
        // Two flat regions more than e_d apart; the range weight keeps each
        // side from bleeding into the other.
        let mut depth = Array2::<f32>::from_elem((16, 16), 1.0);
        depth.slice_mut(ndarray::s![.., 8..]).fill(2.0);

        let filtered = BilateralFilter::new(2, 4.0, 0.01).filter(&depth, Array2Recycle::Empty);

        assert_abs_diff_eq!(filtered[[8, 6]], 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(filtered[[8, 9]], 2.0, epsilon = 1e-4);
    }
}
