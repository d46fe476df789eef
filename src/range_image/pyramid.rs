use ndarray::{Array2, ArrayView2, Zip};

use crate::memory::Array2Recycle;

/// Halves a depth image's resolution while rejecting depth discontinuities.
///
/// Each output pixel averages the `2 * radius` window of finer samples
/// aligned at twice its coordinates, but a sample only enters the average
/// when it lies within `e_d` of the window's reference sample (the finer
/// pixel at exactly twice the output coordinates). Smoothing therefore never
/// mixes depths across an edge.
///
/// # Arguments
///
/// * `depth` - Finer-level depth image, 0 where invalid.
/// * `e_d` - Inclusion threshold on the absolute depth difference.
/// * `radius` - Window radius; the window spans `[1 - radius, radius]`.
/// * `data` - An Array Recycle to reuse memory.
pub fn half_sample_robust(
    depth: &ArrayView2<f32>,
    e_d: f32,
    radius: usize,
    data: Array2Recycle<f32>,
) -> Array2<f32> {
    let (in_height, in_width) = depth.dim();
    let mut output = data.get((in_height / 2, in_width / 2));

    let radius = radius as i32;

    Zip::indexed(&mut output).par_for_each(|(row, col), value| {
        let center = depth[[row * 2, col * 2]];

        let mut sum = 0.0f32;
        let mut count = 0.0f32;
        for i in (1 - radius)..=radius {
            let sample_row = (row as i32 * 2 + i).clamp(0, in_height as i32 - 2) as usize;
            for j in (1 - radius)..=radius {
                let sample_col = (col as i32 * 2 + j).clamp(0, in_width as i32 - 2) as usize;
                let sample = depth[[sample_row, sample_col]];
                if (sample - center).abs() < e_d {
                    sum += sample;
                    count += 1.0;
                }
            }
        }

        *value = if count > 0.0 { sum / count } else { 0.0 };
    });

    output
}

#[cfg(test)]
mod tests {
    use super::half_sample_robust;
    use crate::memory::Array2Recycle;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    #[test]
    fn test_halves_resolution() {
        let depth = Array2::<f32>::from_elem((60, 80), 1.75);
        let half = half_sample_robust(&depth.view(), 0.03, 1, Array2Recycle::Empty);

        assert_eq!(half.dim(), (30, 40));
        for value in half.iter() {
            assert_abs_diff_eq!(*value, 1.75, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_rejects_discontinuity() {
        // One far outlier inside the 2x2 block; the average must only use
        // the three samples near the reference depth.
        let depth = array![[1.0f32, 1.01, 9.9, 9.9], [1.02, 5.0, 9.9, 9.9]];

        let half = half_sample_robust(&depth.view(), 0.09, 1, Array2Recycle::Empty);

        assert_eq!(half.dim(), (1, 2));
        assert_abs_diff_eq!(half[[0, 0]], (1.0 + 1.01 + 1.02) / 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(half[[0, 1]], 9.9, epsilon = 1e-6);
    }

    #[test]
    fn test_invalid_block_stays_invalid() {
        let depth = Array2::<f32>::zeros((4, 4));
        let half = half_sample_robust(&depth.view(), 0.03, 1, Array2Recycle::Empty);
        assert!(half.iter().all(|v| *v == 0.0));
    }
}
