use ndarray::ArrayView2;
use rayon::prelude::*;

use crate::camera::PinholeCamera;
use crate::volume::TsdfVolume;

/// Fuses one depth map into the volume.
///
/// Every voxel center is projected into the frame with the camera pose of
/// that frame. Voxels behind the camera, outside the image, or measured
/// deeper than `mu` behind the observed surface keep their state. The rest
/// blend a new truncated distance sample into the running weighted average,
/// with the weight saturating at `max_weight` so the surface can still adapt
/// to new observations.
///
/// Work is split over z-slabs of the grid, which are disjoint ranges of the
/// flat voxel storage.
pub fn integrate(
    volume: &mut TsdfVolume,
    depth: &ArrayView2<f32>,
    camera: &PinholeCamera,
    mu: f32,
    max_weight: f32,
) {
    let size = volume.size();
    let voxel_size = volume.voxel_size();
    let world_to_camera = camera.world_to_camera().clone();
    let intrinsics = camera.intrinsics.clone();
    let (height, width) = (depth.nrows(), depth.ncols());

    let slab = size[0] * size[1];
    volume
        .voxels_mut()
        .par_chunks_mut(slab)
        .enumerate()
        .for_each(|(z, voxels)| {
            let pos_z = (z as f32 + 0.5) * voxel_size[2];
            for y in 0..size[1] {
                let pos_y = (y as f32 + 0.5) * voxel_size[1];
                for x in 0..size[0] {
                    let pos_x = (x as f32 + 0.5) * voxel_size[0];

                    let point = world_to_camera
                        .transform_vector(&nalgebra::Vector3::new(pos_x, pos_y, pos_z));
                    if point[2] < 1e-4 {
                        continue;
                    }

                    let (u, v) = intrinsics.project(&point);
                    let (u, v) = (u + 0.5, v + 0.5);
                    if u < 0.0 || u > (width - 1) as f32 || v < 0.0 || v > (height - 1) as f32 {
                        continue;
                    }

                    let measured = depth[(v as usize, u as usize)];
                    if measured <= 0.0 {
                        continue;
                    }

                    // Projective distance along the pixel ray, not the z
                    // difference.
                    let lambda = (1.0
                        + (point[0] / point[2]).powi(2)
                        + (point[1] / point[2]).powi(2))
                    .sqrt();
                    let diff = (measured - point[2]) * lambda;
                    if diff <= -mu {
                        continue;
                    }

                    let sdf = (diff / mu).min(1.0);
                    let voxel = &mut voxels[x + y * size[0]];
                    voxel.tsdf =
                        ((voxel.tsdf * voxel.weight + sdf) / (voxel.weight + 1.0)).clamp(-1.0, 1.0);
                    voxel.weight = (voxel.weight + 1.0).min(max_weight);
                }
            }
        });
}
