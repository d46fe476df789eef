use itertools::izip;
use ndarray::{s, Array2, ArrayView2};
use tracing::debug;

use super::correspondence::{find_correspondences, Correspondence};
use super::icp_params::IcpParams;
use super::reduction::{reduce, NormalEquations};
use crate::camera::PinholeCamera;
use crate::range_image::RangeImage;
use crate::transform::Transform;

/// Residual bound for accepting a tracking result, meters of mean
/// point-to-plane distance.
const MAX_RMS_RESIDUAL: f32 = 2e-2;

/// Outcome of tracking one frame.
#[derive(Clone, Debug)]
pub struct TrackingResult {
    /// Camera to world pose; the previous pose when tracking was rejected.
    pub pose: Transform,
    pub tracked: bool,
    pub rms_residual: f32,
    /// Matched pixels over total pixels at the finest level.
    pub match_ratio: f32,
    pub matched: usize,
    pub too_far: usize,
    pub wrong_normal: usize,
    pub invalid: usize,
}

impl TrackingResult {
    fn rejected(pose: Transform) -> Self {
        Self {
            pose,
            tracked: false,
            rms_residual: 0.0,
            match_ratio: 0.0,
            matched: 0,
            too_far: 0,
            wrong_normal: 0,
            invalid: 0,
        }
    }
}

/// Coarse-to-fine point-to-plane ICP against the raycast reference.
pub struct IcpTracker {
    params: IcpParams,
    correspondences: Array2<Correspondence>,
}

impl IcpTracker {
    /// `width` and `height` size the correspondence scratch at the finest
    /// pyramid level's resolution.
    pub fn new(params: IcpParams, width: usize, height: usize) -> Self {
        Self {
            params,
            correspondences: Array2::from_elem((height, width), Correspondence::default()),
        }
    }

    pub fn params(&self) -> &IcpParams {
        &self.params
    }

    /// Per-pixel outcome of the last data association at the finest level,
    /// the input of the tracking visualization.
    pub fn correspondences(&self) -> ArrayView2<'_, Correspondence> {
        self.correspondences.view()
    }

    /// Aligns the source pyramid to the reference image.
    ///
    /// `pyramid` is ordered finest first, like `IcpParams::iterations`;
    /// levels run coarse to fine, each filling the top-left block of the
    /// correspondence scratch. The returned pose maps source camera
    /// coordinates to the world. When the result fails the residual or
    /// coverage acceptance test, `tracked` is false and the pose rolls back
    /// to `previous_pose`.
    pub fn track(
        &mut self,
        pyramid: &[RangeImage],
        reference: &RangeImage,
        reference_camera: &PinholeCamera,
        previous_pose: &Transform,
    ) -> TrackingResult {
        if pyramid.is_empty() {
            return TrackingResult::rejected(previous_pose.clone());
        }

        let Self {
            params,
            correspondences,
        } = self;

        let mut pose = previous_pose.clone();
        let mut last = NormalEquations::new();

        for (iterations, level) in izip!(&params.iterations, pyramid).rev() {
            for _ in 0..*iterations {
                let mut scratch =
                    correspondences.slice_mut(s![..level.height(), ..level.width()]);
                find_correspondences(
                    level,
                    reference,
                    reference_camera,
                    &pose,
                    params.dist_threshold,
                    params.normal_threshold,
                    scratch.view_mut(),
                );

                let equations = reduce(&scratch.view(), params.blocks);
                let update = equations.solve();
                last = equations;

                match update {
                    Some(update) => {
                        pose = &Transform::from_se3_exp(&update) * &pose;
                        if update.norm() < params.icp_threshold {
                            break;
                        }
                    }
                    None => {
                        // Degenerate system at this resolution, try the next.
                        debug!(
                            matched = last.matched,
                            level_width = level.width(),
                            "unsolvable normal equations, skipping level"
                        );
                        break;
                    }
                }
            }
        }

        let finest = &pyramid[0];
        let total_pixels = (finest.width() * finest.height()) as f32;
        let match_ratio = last.matched as f32 / total_pixels;
        let rms_residual = last.rms_residual();
        let tracked = last.matched > 0
            && rms_residual <= MAX_RMS_RESIDUAL
            && match_ratio >= params.track_threshold;

        if !tracked {
            debug!(
                rms_residual,
                match_ratio, "tracking rejected, rolling back pose"
            );
        }

        TrackingResult {
            pose: if tracked { pose } else { previous_pose.clone() },
            tracked,
            rms_residual,
            match_ratio,
            matched: last.matched,
            too_far: last.too_far,
            wrong_normal: last.wrong_normal,
            invalid: last.invalid,
        }
    }
}
