use nalgebra::Vector3;
use ndarray::{Array2, ArrayView2, Zip};

use crate::camera::CameraIntrinsics;

/// A vertex/normal map produced from an image-based measurement, keeping its
/// grid structure. The vertices are in the camera frame when built from a
/// depth image and in the world frame when produced by raycasting.
///
/// One mask marks per-pixel validity: a nonzero mask entry means the vertex
/// and the normal are both usable, invalid pixels store zero vectors.
pub struct RangeImage {
    /// 3D points, as array with shape: (height, width).
    pub vertices: Array2<Vector3<f32>>,
    /// Surface normals, unit length where valid, as array with shape: (height, width).
    pub normals: Array2<Vector3<f32>>,
    /// Mask of valid pixels, as array with shape: (height, width).
    pub mask: Array2<u8>,
    valid_points: usize,
}

impl RangeImage {
    /// An all-invalid image, the tracking reference before the first raycast.
    pub fn empty(height: usize, width: usize) -> Self {
        Self {
            vertices: Array2::from_elem((height, width), Vector3::zeros()),
            normals: Array2::from_elem((height, width), Vector3::zeros()),
            mask: Array2::zeros((height, width)),
            valid_points: 0,
        }
    }

    /// Back-projects a depth image into a vertex map.
    ///
    /// Normals are left unset; call [`RangeImage::compute_normals`] before
    /// using the image for tracking.
    ///
    /// # Arguments
    ///
    /// * `depth` - Depth image in meters, 0 where invalid. Preferably
    ///   filtered with the bilateral filter.
    /// * `intrinsics` - Camera parameters at the depth image's resolution.
    pub fn from_depth(depth: &ArrayView2<f32>, intrinsics: &CameraIntrinsics) -> Self {
        let (height, width) = depth.dim();
        let mut vertices = Array2::from_elem((height, width), Vector3::zeros());
        let mut mask = Array2::<u8>::zeros((height, width));

        Zip::indexed(&mut vertices)
            .and(&mut mask)
            .par_for_each(|(row, col), vertex, valid| {
                let z = depth[[row, col]];
                if z > 0.0 {
                    *vertex = intrinsics.backproject(col as f32, row as f32, z);
                    *valid = 1;
                }
            });

        let valid_points = mask.iter().filter(|&&m| m > 0).count();
        Self {
            vertices,
            normals: Array2::from_elem((height, width), Vector3::zeros()),
            mask,
            valid_points,
        }
    }

    /// Assembles an image from per-pixel arrays, counting the valid pixels.
    /// All three arrays must share the same shape.
    pub fn from_parts(
        vertices: Array2<Vector3<f32>>,
        normals: Array2<Vector3<f32>>,
        mask: Array2<u8>,
    ) -> Self {
        let valid_points = mask.iter().filter(|&&m| m > 0).count();
        Self {
            vertices,
            normals,
            mask,
            valid_points,
        }
    }

    pub fn width(&self) -> usize {
        self.vertices.ncols()
    }

    pub fn height(&self) -> usize {
        self.vertices.nrows()
    }

    pub fn valid_points_count(&self) -> usize {
        self.valid_points
    }

    pub fn get_vertex(&self, row: usize, col: usize) -> Option<Vector3<f32>> {
        if row < self.height() && col < self.width() && self.mask[(row, col)] > 0 {
            Some(self.vertices[(row, col)])
        } else {
            None
        }
    }

    pub fn get_normal(&self, row: usize, col: usize) -> Option<Vector3<f32>> {
        if row < self.height() && col < self.width() && self.mask[(row, col)] > 0 {
            Some(self.normals[(row, col)])
        } else {
            None
        }
    }

    /// Computes per-pixel normals by cross-differencing the four direct
    /// neighbors, border indices clamped. A pixel keeps its mask bit only if
    /// its own vertex and all four neighbor vertices carry depth; the cross
    /// product order (vertical difference first) fixes the normal
    /// orientation towards the camera.
    pub fn compute_normals(&mut self) -> &mut Self {
        let height = self.height();
        let width = self.width();

        let vertices = &self.vertices;
        Zip::indexed(&mut self.normals)
            .and(&mut self.mask)
            .par_for_each(|(row, col), normal, valid| {
                let center = vertices[[row, col]];
                let left = vertices[[row, col.saturating_sub(1)]];
                let right = vertices[[row, (col + 1).min(width - 1)]];
                let up = vertices[[row.saturating_sub(1), col]];
                let down = vertices[[(row + 1).min(height - 1), col]];

                if center[2] == 0.0
                    || left[2] == 0.0
                    || right[2] == 0.0
                    || up[2] == 0.0
                    || down[2] == 0.0
                {
                    *normal = Vector3::zeros();
                    *valid = 0;
                    return;
                }

                let cross = (down - up).cross(&(right - left));
                let magnitude = cross.norm();
                if magnitude > 1e-6_f32 {
                    *normal = cross / magnitude;
                    *valid = 1;
                } else {
                    *normal = Vector3::zeros();
                    *valid = 0;
                }
            });

        // Invalid pixels store zeros, including vertices that lost their
        // mask bit to a missing neighbor.
        Zip::from(&mut self.vertices)
            .and(&self.mask)
            .par_for_each(|vertex, valid| {
                if *valid == 0 {
                    *vertex = Vector3::zeros();
                }
            });

        self.valid_points = self.mask.iter().filter(|&&m| m > 0).count();
        self
    }
}
