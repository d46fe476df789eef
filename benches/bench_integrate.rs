use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::Vector3;
use ndarray::Array2;
use pprof::criterion::{Output, PProfProfiler};

use fuse3d::camera::{CameraIntrinsics, PinholeCamera};
use fuse3d::integrate::integrate;
use fuse3d::raycast::raycast;
use fuse3d::transform::Transform;
use fuse3d::volume::TsdfVolume;

fn wall_camera() -> PinholeCamera {
    let mut intrinsics = CameraIntrinsics::from_simple_intrinsic(525.0, 525.0, 319.5, 239.5);
    intrinsics.size(640, 480);
    PinholeCamera::new(
        intrinsics,
        Transform::from_translation(&Vector3::new(4.0, 4.0, 0.0)),
        640,
        480,
    )
}

fn criterion_benchmark(c: &mut Criterion) {
    let camera = wall_camera();
    let depth = Array2::from_elem((480, 640), 2.0f32);

    c.bench_function("integrate frame into 256 volume", |b| {
        let mut volume = TsdfVolume::new([256, 256, 256], Vector3::new(8.0, 8.0, 8.0));
        b.iter(|| {
            integrate(&mut volume, &depth.view(), &camera, 0.1, 100.0);
        });
    });

    c.bench_function("raycast 256 volume", |b| {
        let mut volume = TsdfVolume::new([256, 256, 256], Vector3::new(8.0, 8.0, 8.0));
        integrate(&mut volume, &depth.view(), &camera, 0.1, 100.0);
        b.iter(|| {
            raycast(&volume, &camera, 0.4, 4.0, 0.1);
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)));
    targets = criterion_benchmark
}
criterion_main!(benches);
