use nalgebra::Vector3;
use ndarray::{Array2, Zip};

use crate::camera::PinholeCamera;
use crate::range_image::RangeImage;
use crate::volume::TsdfVolume;

/// Marches one ray through the volume and returns the world-space surface
/// point, if the ray crosses from free space into negative distance.
///
/// `direction` is the unrotated pixel ray scaled so its camera-space z
/// component is 1, the ray parameter then reads as depth. Marching starts
/// at `large_step` per sample and drops to `step` once the interpolated
/// distance falls under 0.8, the zero crossing is located by linear
/// interpolation between the last two samples.
pub(crate) fn cast_ray(
    volume: &TsdfVolume,
    origin: &Vector3<f32>,
    direction: &Vector3<f32>,
    near: f32,
    far: f32,
    step: f32,
    large_step: f32,
) -> Option<Vector3<f32>> {
    let dim = volume.dim();

    // Slab intersection with the volume box, then clipped to [near, far].
    let mut largest_min = f32::MIN;
    let mut smallest_max = f32::MAX;
    for axis in 0..3 {
        let inverse = 1.0 / direction[axis];
        let bottom = -origin[axis] * inverse;
        let top = (dim[axis] - origin[axis]) * inverse;
        largest_min = largest_min.max(bottom.min(top));
        smallest_max = smallest_max.min(bottom.max(top));
    }
    let tnear = largest_min.max(near);
    let tfar = smallest_max.min(far);
    if tnear >= tfar {
        return None;
    }

    let mut t = tnear;
    let mut step_size = large_step;
    let mut f_t = volume.interp(&(origin + direction * t));
    let mut f_tt = 0.0;

    if f_t > 0.0 {
        while t < tfar {
            f_tt = volume.interp(&(origin + direction * t));
            if f_tt < 0.0 {
                break;
            }
            if f_tt < 0.8 {
                step_size = step;
            }
            f_t = f_tt;
            t += step_size;
        }
        if f_tt < 0.0 {
            t += step_size * f_tt / (f_t - f_tt);
            return Some(origin + direction * t);
        }
    }

    None
}

/// Extracts the visible surface by ray marching, one ray per pixel of the
/// given camera.
///
/// The result is a world-space range image: vertices are ray/surface
/// intersections and normals come from the volume gradient. Pixels whose ray
/// misses the volume, starts inside the surface, or lands on a zero gradient
/// are masked invalid.
pub fn raycast(
    volume: &TsdfVolume,
    camera: &PinholeCamera,
    near: f32,
    far: f32,
    mu: f32,
) -> RangeImage {
    let size = volume.size();
    let dim = volume.dim();
    let step = dim[0].min(dim[1]).min(dim[2]) / size[0].max(size[1]).max(size[2]) as f32;
    let large_step = 0.75 * mu;
    let origin = camera.camera_to_world.translation();

    let (height, width) = (camera.height, camera.width);
    let mut vertices = Array2::from_elem((height, width), Vector3::zeros());
    let mut normals = Array2::from_elem((height, width), Vector3::zeros());
    let mut mask = Array2::<u8>::zeros((height, width));

    Zip::indexed(&mut vertices)
        .and(&mut normals)
        .and(&mut mask)
        .par_for_each(|(row, col), vertex, normal, valid| {
            let direction = camera.pixel_ray(col as f32, row as f32);
            if let Some(hit) = cast_ray(volume, &origin, &direction, near, far, step, large_step) {
                let gradient = volume.grad(&hit);
                let magnitude = gradient.norm();
                if magnitude > 0.0 {
                    *vertex = hit;
                    *normal = gradient / magnitude;
                    *valid = 1;
                }
            }
        });

    RangeImage::from_parts(vertices, normals, mask)
}

#[cfg(test)]
mod tests {
    use super::raycast;
    use crate::camera::{CameraIntrinsics, PinholeCamera};
    use crate::transform::Transform;
    use crate::unit_test::synthetic_intrinsics;
    use crate::volume::TsdfVolume;
    use approx::assert_abs_diff_eq;
    use nalgebra::{Vector3, Vector6};
    use rstest::rstest;

    /// Analytic frontal wall at z = 2 m, truncation band 0.1 m.
    fn wall_volume() -> TsdfVolume {
        let mut volume = TsdfVolume::new([64, 64, 64], Vector3::new(4.0, 4.0, 4.0));
        let size = volume.size();
        for z in 0..size[2] {
            let center_z = volume.voxel_center(0, 0, z)[2];
            let tsdf = ((2.0 - center_z) / 0.1_f32).clamp(-1.0, 1.0);
            for y in 0..size[1] {
                for x in 0..size[0] {
                    let index = x + y * size[0] + z * size[0] * size[1];
                    volume.voxels_mut()[index].tsdf = tsdf;
                    volume.voxels_mut()[index].weight = 1.0;
                }
            }
        }
        volume
    }

    #[rstest]
    fn test_hits_wall_at_measured_depth(synthetic_intrinsics: CameraIntrinsics) {
        let volume = wall_volume();
        let camera = PinholeCamera::new(
            synthetic_intrinsics,
            Transform::from_translation(&Vector3::new(2.0, 2.0, 0.0)),
            80,
            60,
        );

        let image = raycast(&volume, &camera, 0.4, 4.0, 0.1);

        assert!(image.valid_points_count() > image.width() * image.height() / 2);
        let vertex = image.get_vertex(30, 40).unwrap();
        assert_abs_diff_eq!(vertex[2], 2.0, epsilon = 0.01);

        let normal = image.get_normal(30, 40).unwrap();
        assert_abs_diff_eq!(normal[0], 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(normal[1], 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(normal[2], -1.0, epsilon = 1e-4);
    }

    #[rstest]
    fn test_far_plane_clips_surface(synthetic_intrinsics: CameraIntrinsics) {
        let volume = wall_volume();
        let camera = PinholeCamera::new(
            synthetic_intrinsics,
            Transform::from_translation(&Vector3::new(2.0, 2.0, 0.0)),
            80,
            60,
        );

        // The wall sits at depth 2, beyond the 1 m far plane.
        let image = raycast(&volume, &camera, 0.4, 1.0, 0.1);
        assert_eq!(image.valid_points_count(), 0);
    }

    #[rstest]
    fn test_rays_leaving_the_volume_miss(synthetic_intrinsics: CameraIntrinsics) {
        let volume = wall_volume();
        // Rotated half a turn about y, every ray points away from the grid.
        let pose = Transform::from_se3_exp(&Vector6::new(
            2.0,
            2.0,
            0.0,
            0.0,
            std::f32::consts::PI,
            0.0,
        ));
        let camera = PinholeCamera::new(synthetic_intrinsics, pose, 80, 60);

        let image = raycast(&volume, &camera, 0.4, 4.0, 0.1);
        assert_eq!(image.valid_points_count(), 0);
    }
}
