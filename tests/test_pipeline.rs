use nalgebra::Vector3;
use ndarray::Array2;
use rstest::{fixture, rstest};

use fuse3d::camera::{CameraIntrinsics, PinholeCamera};
use fuse3d::integrate::integrate;
use fuse3d::metrics::TransformMetrics;
use fuse3d::pipeline::{FusionPipeline, PipelineParams};
use fuse3d::raycast::raycast;
use fuse3d::transform::Transform;
use fuse3d::volume::TsdfVolume;

#[fixture]
pub fn intrinsics() -> CameraIntrinsics {
    CameraIntrinsics::from_simple_intrinsic(70.0, 70.0, 39.5, 29.5)
}

/// Depth of a box corner seen from its inside: a back wall 1.6 m ahead,
/// walls 0.5 m to each side and 0.45 m above and below. Values in raw
/// millimeter units.
fn box_corner_frame(intrinsics: &CameraIntrinsics) -> Array2<u16> {
    let mut depth = Array2::zeros((60, 80));
    for row in 0..60 {
        for col in 0..80 {
            let direction = intrinsics.backproject(col as f32, row as f32, 1.0);
            let mut t = 1.6f32;
            for (axis, wall) in [(0usize, 0.5f32), (1, 0.45)] {
                if direction[axis].abs() > 1e-6 {
                    let hit = wall / direction[axis].abs();
                    if hit < t {
                        t = hit;
                    }
                }
            }
            depth[(row, col)] = (t * direction[2] * 1000.0) as u16;
        }
    }
    depth
}

fn small_params() -> PipelineParams {
    PipelineParams {
        volume_resolution: [64, 64, 64],
        volume_size: [4.0, 4.0, 4.0],
        ..Default::default()
    }
}

#[rstest]
fn test_integrated_wall_raycasts_at_its_distance(intrinsics: CameraIntrinsics) {
    let mut volume = TsdfVolume::new([64, 64, 64], Vector3::new(4.0, 4.0, 4.0));
    let mut intrinsics = intrinsics;
    intrinsics.size(80, 60);
    let camera = PinholeCamera::new(
        intrinsics,
        Transform::from_translation(&Vector3::new(2.0, 2.0, 0.0)),
        80,
        60,
    );

    let depth = Array2::from_elem((60, 80), 2.0f32);
    integrate(&mut volume, &depth.view(), &camera, 0.1, 100.0);

    let model = raycast(&volume, &camera, 0.4, 4.0, 0.1);
    assert!(model.valid_points_count() > 80 * 60 / 4);

    // The wall must come back at its distance, within one voxel.
    let voxel_size = 4.0 / 64.0;
    let vertex = model.get_vertex(30, 40).unwrap();
    assert!((vertex[2] - 2.0).abs() < voxel_size);
}

#[rstest]
fn test_static_camera_stays_put(intrinsics: CameraIntrinsics) {
    let mut pipeline = FusionPipeline::new(small_params(), &intrinsics, (60, 80)).unwrap();
    let frame = box_corner_frame(&intrinsics);

    let initial = pipeline.pose().clone();
    let mut summaries = Vec::new();
    for _ in 0..6 {
        summaries.push(pipeline.process_frame(&frame.view()).unwrap());
    }

    // The model reference only exists after the first raycast, tracking
    // against it starts at frame 4.
    assert!(!summaries[0].tracked);
    assert!(summaries[4].tracked);
    assert!(summaries[5].tracked);
    assert!(summaries[4].rms_residual < 2e-2);
    assert!(summaries[4].match_ratio > 0.5);

    let drift = TransformMetrics::new(&initial, pipeline.pose());
    assert!(drift.translation < 0.01);
    assert!(drift.angle < 0.01);
}

#[rstest]
fn test_frame_rates_gate_the_stages(intrinsics: CameraIntrinsics) {
    let params = PipelineParams {
        tracking_rate: 2,
        integration_rate: 3,
        ..small_params()
    };
    let mut pipeline = FusionPipeline::new(params, &intrinsics, (60, 80)).unwrap();
    let frame = box_corner_frame(&intrinsics);

    let mut summaries = Vec::new();
    for _ in 0..8 {
        summaries.push(pipeline.process_frame(&frame.view()).unwrap());
    }

    // The first four frames integrate unconditionally to bootstrap the
    // volume.
    for summary in &summaries[0..4] {
        assert!(summary.integrated);
    }
    // Afterwards integration follows its rate, provided tracking holds.
    assert!(summaries[4].tracked);
    assert!(!summaries[4].integrated);
    assert!(!summaries[5].integrated);
    assert!(summaries[6].tracked);
    assert!(summaries[6].integrated);
    // Skipped tracking frames carry the last outcome forward.
    assert_eq!(summaries[5].tracked, summaries[4].tracked);
}

#[rstest]
fn test_empty_frame_rolls_back_instead_of_diverging(intrinsics: CameraIntrinsics) {
    let mut pipeline = FusionPipeline::new(small_params(), &intrinsics, (60, 80)).unwrap();
    let frame = box_corner_frame(&intrinsics);

    for _ in 0..5 {
        pipeline.process_frame(&frame.view()).unwrap();
    }
    let before = pipeline.pose().clone();

    let blank = Array2::<u16>::zeros((60, 80));
    let summary = pipeline.process_frame(&blank.view()).unwrap();

    assert!(!summary.tracked);
    assert!(!summary.integrated);
    let moved = TransformMetrics::new(&before, pipeline.pose());
    assert_eq!(moved.translation, 0.0);
    assert_eq!(moved.angle, 0.0);
}
