use ndarray::{ArrayViewMut2, Zip};

use crate::camera::PinholeCamera;
use crate::range_image::RangeImage;
use crate::transform::Transform;

/// Outcome of associating one source pixel with the reference image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchStatus {
    Matched,
    /// Source pixel carries no vertex or normal.
    NoInput,
    /// Projection lands outside the reference image or behind its camera.
    OutOfImage,
    /// The reference pixel it lands on carries no data.
    NoRefNormal,
    /// Corresponding points are farther apart than the distance threshold.
    TooFar,
    /// Normal orientations disagree beyond the threshold.
    WrongNormal,
}

/// Point-to-plane residual and Jacobian row of one source pixel, or its
/// rejection reason. The Jacobian is ordered translation first, rotation
/// moment last, matching the se(3) update layout.
#[derive(Clone, Copy, Debug)]
pub struct Correspondence {
    pub status: MatchStatus,
    pub error: f32,
    pub jacobian: [f32; 6],
}

impl Correspondence {
    fn rejected(status: MatchStatus) -> Self {
        Self {
            status,
            error: 0.0,
            jacobian: [0.0; 6],
        }
    }
}

impl Default for Correspondence {
    fn default() -> Self {
        Self::rejected(MatchStatus::NoInput)
    }
}

/// Projective data association between a source image and the raycast
/// reference.
///
/// Every valid source pixel is moved by `pose` into the world frame and
/// projected through `reference_camera`; the reference pixel it lands on
/// supplies the corresponding point and plane normal. `output` must have the
/// source image's shape. `source` may be any pyramid level while the
/// reference stays at full resolution.
pub fn find_correspondences(
    source: &RangeImage,
    reference: &RangeImage,
    reference_camera: &PinholeCamera,
    pose: &Transform,
    dist_threshold: f32,
    normal_threshold: f32,
    output: ArrayViewMut2<'_, Correspondence>,
) {
    let world_to_reference = reference_camera.world_to_camera().clone();
    let intrinsics = reference_camera.intrinsics.clone();
    let (ref_height, ref_width) = (reference.height(), reference.width());

    Zip::from(output)
        .and(&source.vertices)
        .and(&source.normals)
        .and(&source.mask)
        .par_for_each(|out, vertex, normal, &valid| {
            if valid == 0 {
                *out = Correspondence::rejected(MatchStatus::NoInput);
                return;
            }

            let point = pose.transform_vector(vertex);
            let in_reference = world_to_reference.transform_vector(&point);
            if in_reference[2] <= 0.0 {
                *out = Correspondence::rejected(MatchStatus::OutOfImage);
                return;
            }

            let (u, v) = intrinsics.project(&in_reference);
            let (u, v) = (u + 0.5, v + 0.5);
            if u < 0.0 || u > (ref_width - 1) as f32 || v < 0.0 || v > (ref_height - 1) as f32 {
                *out = Correspondence::rejected(MatchStatus::OutOfImage);
                return;
            }

            let (row, col) = (v as usize, u as usize);
            if reference.mask[(row, col)] == 0 {
                *out = Correspondence::rejected(MatchStatus::NoRefNormal);
                return;
            }

            let reference_vertex = reference.vertices[(row, col)];
            let reference_normal = reference.normals[(row, col)];
            let diff = reference_vertex - point;
            if diff.norm() > dist_threshold {
                *out = Correspondence::rejected(MatchStatus::TooFar);
                return;
            }

            if pose.transform_normal(normal).dot(&reference_normal) < normal_threshold {
                *out = Correspondence::rejected(MatchStatus::WrongNormal);
                return;
            }

            let twist = point.cross(&reference_normal);
            *out = Correspondence {
                status: MatchStatus::Matched,
                error: reference_normal.dot(&diff),
                jacobian: [
                    reference_normal[0],
                    reference_normal[1],
                    reference_normal[2],
                    twist[0],
                    twist[1],
                    twist[2],
                ],
            };
        });
}
