use std::time::{Duration, Instant};

use nalgebra::Vector3;
use ndarray::{Array2, ArrayView2};
use serde_derive::Deserialize;
use tracing::debug;

use crate::bilateral::BilateralFilter;
use crate::camera::{CameraIntrinsics, PinholeCamera};
use crate::depth::{check_size_ratio, depth_to_meters};
use crate::error::Error;
use crate::icp::{IcpParams, IcpTracker, TrackingResult};
use crate::integrate::integrate;
use crate::range_image::{half_sample_robust, RangeImage};
use crate::raycast::raycast;
use crate::transform::Transform;
use crate::volume::TsdfVolume;
use crate::Array2Recycle;

/// Parameters of the whole reconstruction pipeline.
///
/// All fields have working defaults and can be partially overridden when
/// deserialized from a JSON configuration file.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    /// Voxel grid resolution per axis.
    pub volume_resolution: [usize; 3],
    /// Metric extent of the voxel grid per axis, in meters.
    pub volume_size: [f32; 3],
    /// The camera starts at `initial_pose_factor * volume_size` on each axis,
    /// looking along +Z.
    pub initial_pose_factor: f32,
    /// ICP iterations per pyramid level, coarsest level first.
    pub pyramid: Vec<usize>,
    /// Input depth is point-sampled down by this factor before any processing.
    pub compute_size_ratio: usize,
    /// Pose increments with a norm below this end the iterations of a level.
    pub icp_threshold: f32,
    /// Minimum fraction of matched pixels for a pose to be accepted.
    pub track_threshold: f32,
    /// Maximum distance between corresponding points, in meters.
    pub dist_threshold: f32,
    /// Minimum dot product between corresponding normals.
    pub normal_threshold: f32,
    /// TSDF truncation distance, in meters.
    pub mu: f32,
    /// Saturation value for per-voxel integration weights.
    pub maxweight: f32,
    /// Fuse a frame into the volume every this many frames.
    pub integration_rate: usize,
    /// Run ICP every this many frames.
    pub tracking_rate: usize,
    /// Emit debug renderings every this many frames.
    pub rendering_rate: usize,
    /// Depth similarity scale of the bilateral filter and the pyramid
    /// downsampling, in meters.
    pub e_delta: f32,
    /// Bilateral filter window radius, in pixels.
    pub filter_radius: usize,
    /// Bilateral filter spatial scale, in pixels.
    pub filter_delta: f32,
    /// Raycasting near plane, in meters.
    pub near_plane: f32,
    /// Raycasting far plane, in meters.
    pub far_plane: f32,
    /// Scale converting raw depth values to meters.
    pub depth_scale: f32,
    /// Number of blocks of the ICP parallel reduction.
    pub reduction_blocks: usize,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            volume_resolution: [256, 256, 256],
            volume_size: [8.0, 8.0, 8.0],
            initial_pose_factor: 0.5,
            pyramid: vec![4, 5, 10],
            compute_size_ratio: 1,
            icp_threshold: 1e-5,
            track_threshold: 0.15,
            dist_threshold: 0.1,
            normal_threshold: 0.8,
            mu: 0.1,
            maxweight: 100.0,
            integration_rate: 2,
            tracking_rate: 1,
            rendering_rate: 4,
            e_delta: 0.01,
            filter_radius: 2,
            filter_delta: 4.0,
            near_plane: 0.4,
            far_plane: 4.0,
            depth_scale: 0.001,
            reduction_blocks: 8,
        }
    }
}

impl PipelineParams {
    /// Rejects parameter combinations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.volume_resolution.iter().any(|&dim| dim == 0) {
            return Err(Error::invalid_parameter(
                "volume resolution must be positive on every axis",
            ));
        }
        if self.volume_size.iter().any(|&size| size <= 0.0) {
            return Err(Error::invalid_parameter(
                "volume size must be positive on every axis",
            ));
        }
        if self.pyramid.is_empty() {
            return Err(Error::invalid_parameter(
                "the pyramid needs at least one level",
            ));
        }
        if self.compute_size_ratio == 0 {
            return Err(Error::invalid_parameter(
                "compute size ratio must be at least 1",
            ));
        }
        if self.tracking_rate == 0 || self.integration_rate == 0 || self.rendering_rate == 0 {
            return Err(Error::invalid_parameter("frame rates must be at least 1"));
        }
        if self.icp_threshold <= 0.0 || self.dist_threshold <= 0.0 {
            return Err(Error::invalid_parameter(
                "ICP thresholds must be positive",
            ));
        }
        if self.track_threshold <= 0.0 || self.track_threshold > 1.0 {
            return Err(Error::invalid_parameter(
                "track threshold must be within (0, 1]",
            ));
        }
        if self.mu <= 0.0 {
            return Err(Error::invalid_parameter(
                "truncation distance must be positive",
            ));
        }
        if self.maxweight < 1.0 {
            return Err(Error::invalid_parameter("max weight must be at least 1"));
        }
        if self.e_delta <= 0.0 || self.filter_delta <= 0.0 {
            return Err(Error::invalid_parameter(
                "filter scales must be positive",
            ));
        }
        if self.near_plane <= 0.0 || self.near_plane >= self.far_plane {
            return Err(Error::invalid_parameter(
                "clipping planes must satisfy 0 < near < far",
            ));
        }
        if self.depth_scale <= 0.0 {
            return Err(Error::invalid_parameter("depth scale must be positive"));
        }
        if self.reduction_blocks == 0 {
            return Err(Error::invalid_parameter(
                "reduction needs at least one block",
            ));
        }
        Ok(())
    }

    /// ICP parameters derived from the pipeline ones. The per-level iteration
    /// counts are flipped into finest first order.
    pub fn icp_params(&self) -> IcpParams {
        IcpParams {
            iterations: self.pyramid.iter().rev().copied().collect(),
            dist_threshold: self.dist_threshold,
            normal_threshold: self.normal_threshold,
            icp_threshold: self.icp_threshold,
            track_threshold: self.track_threshold,
            blocks: self.reduction_blocks,
        }
    }
}

/// Wall clock spent in each stage of one frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameTimings {
    pub preprocessing: Duration,
    pub tracking: Duration,
    pub integration: Duration,
    pub raycasting: Duration,
}

/// Outcome of one processed frame.
#[derive(Clone, Debug)]
pub struct FrameSummary {
    pub frame: usize,
    /// Camera pose after this frame, camera to world.
    pub pose: Transform,
    pub tracked: bool,
    pub integrated: bool,
    pub rms_residual: f32,
    pub match_ratio: f32,
    pub matched: usize,
    pub too_far: usize,
    pub wrong_normal: usize,
    pub invalid: usize,
    pub timings: FrameTimings,
}

/// Dense depth fusion pipeline.
///
/// Feeds raw depth maps through bilateral filtering, a multiscale point cloud
/// pyramid, frame to model ICP, TSDF integration and raycasting, keeping the
/// camera pose and the volume up to date frame after frame.
pub struct FusionPipeline {
    params: PipelineParams,
    intrinsics: CameraIntrinsics,
    input_size: (usize, usize),
    width: usize,
    height: usize,
    volume: TsdfVolume,
    filter: BilateralFilter,
    tracker: IcpTracker,
    pose: Transform,
    reference: RangeImage,
    reference_camera: PinholeCamera,
    last_tracking: TrackingResult,
    meters: Array2<f32>,
    depths: Vec<Array2<f32>>,
    frame: usize,
}

impl FusionPipeline {
    /// Creates a pipeline for raw frames of `input_size` as (height, width)
    /// with the given camera intrinsics at that resolution.
    pub fn new(
        params: PipelineParams,
        intrinsics: &CameraIntrinsics,
        input_size: (usize, usize),
    ) -> Result<Self, Error> {
        params.validate()?;
        let (height, width) = check_size_ratio(input_size, params.compute_size_ratio)?;
        let mut intrinsics = intrinsics.scale(1.0 / params.compute_size_ratio as f64);
        intrinsics.size(width, height);

        let pose = Transform::from_translation(&Vector3::new(
            params.volume_size[0] * params.initial_pose_factor,
            params.volume_size[1] * params.initial_pose_factor,
            params.volume_size[2] * params.initial_pose_factor,
        ));
        let volume = TsdfVolume::new(
            params.volume_resolution,
            Vector3::new(
                params.volume_size[0],
                params.volume_size[1],
                params.volume_size[2],
            ),
        );
        let filter = BilateralFilter::new(params.filter_radius, params.filter_delta, params.e_delta);
        let tracker = IcpTracker::new(params.icp_params(), width, height);
        let reference_camera = PinholeCamera::new(intrinsics.clone(), pose.clone(), width, height);
        let last_tracking = TrackingResult {
            pose: pose.clone(),
            tracked: false,
            rms_residual: 0.0,
            match_ratio: 0.0,
            matched: 0,
            too_far: 0,
            wrong_normal: 0,
            invalid: 0,
        };
        let depths = vec![Array2::default((0, 0)); params.pyramid.len()];

        Ok(Self {
            params,
            intrinsics,
            input_size,
            width,
            height,
            volume,
            filter,
            tracker,
            pose,
            reference: RangeImage::empty(height, width),
            reference_camera,
            last_tracking,
            meters: Array2::default((0, 0)),
            depths,
            frame: 0,
        })
    }

    /// Runs one raw depth frame through every pipeline stage.
    ///
    /// Tracking and integration are subject to their frame rates; skipped
    /// frames carry the previous tracking outcome forward. The first frames
    /// are always fused so that the volume has a surface to raycast against.
    pub fn process_frame(&mut self, depth: &ArrayView2<u16>) -> Result<FrameSummary, Error> {
        if depth.dim() != self.input_size {
            return Err(Error::invalid_parameter(format!(
                "expected a {}x{} depth frame, got {}x{}",
                self.input_size.1,
                self.input_size.0,
                depth.dim().1,
                depth.dim().0
            )));
        }

        let start = Instant::now();
        self.meters = depth_to_meters(
            depth,
            self.params.compute_size_ratio,
            self.params.depth_scale,
            Array2Recycle::Recycle(std::mem::take(&mut self.meters)),
        );

        // Level 0 is the bilateral filtered map, the coarser levels come from
        // robust half sampling of the level above.
        for level in 0..self.depths.len() {
            let recycle = Array2Recycle::Recycle(std::mem::take(&mut self.depths[level]));
            self.depths[level] = if level == 0 {
                self.filter.filter(&self.meters, recycle)
            } else {
                half_sample_robust(
                    &self.depths[level - 1].view(),
                    self.params.e_delta * 3.0,
                    1,
                    recycle,
                )
            };
        }

        let mut pyramid = Vec::with_capacity(self.depths.len());
        for (level, level_depth) in self.depths.iter().enumerate() {
            let mut image = RangeImage::from_depth(
                &level_depth.view(),
                &self.intrinsics.pyramid_level(level),
            );
            image.compute_normals();
            pyramid.push(image);
        }
        let preprocessing = start.elapsed();

        let start = Instant::now();
        if self.frame % self.params.tracking_rate == 0 {
            let outcome = self.tracker.track(
                &pyramid,
                &self.reference,
                &self.reference_camera,
                &self.pose,
            );
            self.pose = outcome.pose.clone();
            self.last_tracking = outcome;
        }
        let tracking = start.elapsed();

        let start = Instant::now();
        let integrated = (self.last_tracking.tracked
            && self.frame % self.params.integration_rate == 0)
            || self.frame <= 3;
        if integrated {
            let camera = self.camera();
            integrate(
                &mut self.volume,
                &self.depths[0].view(),
                &camera,
                self.params.mu,
                self.params.maxweight,
            );
        }
        let integration = start.elapsed();

        // The model view raycast here becomes the reference of the next
        // frame, with the camera it was rendered from.
        let start = Instant::now();
        if self.frame > 2 {
            let camera = self.camera();
            self.reference = raycast(
                &self.volume,
                &camera,
                self.params.near_plane,
                self.params.far_plane,
                self.params.mu,
            );
            self.reference_camera = camera;
        }
        let raycasting = start.elapsed();

        let summary = FrameSummary {
            frame: self.frame,
            pose: self.pose.clone(),
            tracked: self.last_tracking.tracked,
            integrated,
            rms_residual: self.last_tracking.rms_residual,
            match_ratio: self.last_tracking.match_ratio,
            matched: self.last_tracking.matched,
            too_far: self.last_tracking.too_far,
            wrong_normal: self.last_tracking.wrong_normal,
            invalid: self.last_tracking.invalid,
            timings: FrameTimings {
                preprocessing,
                tracking,
                integration,
                raycasting,
            },
        };
        debug!(
            frame = summary.frame,
            tracked = summary.tracked,
            integrated = summary.integrated,
            rms_residual = summary.rms_residual,
            match_ratio = summary.match_ratio,
            "frame processed"
        );

        self.frame += 1;
        Ok(summary)
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    /// Current camera pose, camera to world.
    pub fn pose(&self) -> &Transform {
        &self.pose
    }

    pub fn volume(&self) -> &TsdfVolume {
        &self.volume
    }

    /// Latest raycast model view, empty until enough frames were fused.
    pub fn reference(&self) -> &RangeImage {
        &self.reference
    }

    pub fn tracker(&self) -> &IcpTracker {
        &self.tracker
    }

    /// Bilateral filtered depth of the last processed frame, in meters.
    pub fn filtered_depth(&self) -> &Array2<f32> {
        &self.depths[0]
    }

    /// Camera at the current pose and computation resolution.
    pub fn camera(&self) -> PinholeCamera {
        PinholeCamera::new(
            self.intrinsics.clone(),
            self.pose.clone(),
            self.width,
            self.height,
        )
    }

    /// Number of frames processed so far.
    pub fn frame_count(&self) -> usize {
        self.frame
    }

    /// Computation resolution as (height, width).
    pub fn computation_size(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}
