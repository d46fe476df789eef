use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use pprof::criterion::{Output, PProfProfiler};

use fuse3d::camera::{CameraIntrinsics, PinholeCamera};
use fuse3d::icp::{IcpParams, IcpTracker};
use fuse3d::range_image::{half_sample_robust, RangeImage};
use fuse3d::transform::Transform;
use fuse3d::Array2Recycle;

/// Box corner depth: a back wall 2.4 m ahead with walls to the sides, above
/// and below. Gives the solver a full rank scene.
fn box_corner_depth(intrinsics: &CameraIntrinsics) -> Array2<f32> {
    Array2::from_shape_fn((480, 640), |(row, col)| {
        let direction = intrinsics.backproject(col as f32, row as f32, 1.0);
        let mut t = 2.4f32;
        for (axis, wall) in [(0usize, 0.9f32), (1, 0.8)] {
            if direction[axis].abs() > 1e-6 {
                t = t.min(wall / direction[axis].abs());
            }
        }
        t * direction[2]
    })
}

fn build_pyramid(
    depth: &Array2<f32>,
    intrinsics: &CameraIntrinsics,
    levels: usize,
) -> Vec<RangeImage> {
    let mut depths = vec![depth.clone()];
    for level in 1..levels {
        depths.push(half_sample_robust(
            &depths[level - 1].view(),
            0.03,
            1,
            Array2Recycle::Empty,
        ));
    }
    depths
        .iter()
        .enumerate()
        .map(|(level, depth)| {
            let mut image = RangeImage::from_depth(&depth.view(), &intrinsics.pyramid_level(level));
            image.compute_normals();
            image
        })
        .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut intrinsics = CameraIntrinsics::from_simple_intrinsic(525.0, 525.0, 319.5, 239.5);
    intrinsics.size(640, 480);

    let depth = box_corner_depth(&intrinsics);
    let pyramid = build_pyramid(&depth, &intrinsics, 3);
    let reference = {
        let mut image = RangeImage::from_depth(&depth.view(), &intrinsics);
        image.compute_normals();
        image
    };
    let pose = Transform::eye();
    let camera = PinholeCamera::new(intrinsics.clone(), pose.clone(), 640, 480);

    c.bench_function("icp track 640x480", |b| {
        let mut tracker = IcpTracker::new(IcpParams::default(), 640, 480);
        b.iter(|| {
            tracker.track(&pyramid, &reference, &camera, &pose);
        });
    });

    c.bench_function("pyramid build 640x480", |b| {
        b.iter(|| {
            build_pyramid(&depth, &intrinsics, 3);
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)));
    targets = criterion_benchmark
}
criterion_main!(benches);
