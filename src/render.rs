use image::{Rgb, RgbImage};
use nalgebra::Vector3;
use ndarray::ArrayView2;

use crate::camera::PinholeCamera;
use crate::icp::{Correspondence, MatchStatus};
use crate::range_image::RangeImage;
use crate::raycast::cast_ray;
use crate::volume::TsdfVolume;

/// Maps a value in `[0, 1)` to a red over green to blue color ramp.
fn ramp_color(value: f32) -> Rgb<u8> {
    const V: f32 = 0.75;
    const M: f32 = 0.25;
    const SV: f32 = 0.6667;

    let h = value * 6.0;
    let sextant = h as i32;
    let fract = h - sextant as f32;
    let vsf = V * SV * fract;
    let mid1 = M + vsf;
    let mid2 = V - vsf;
    let (r, g, b) = match sextant {
        0 => (V, mid1, M),
        1 => (mid2, V, M),
        2 => (M, V, mid1),
        3 => (M, mid2, V),
        4 => (mid1, M, V),
        5 => (V, M, mid2),
        _ => (0.0, 0.0, 0.0),
    };
    Rgb([(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8])
}

/// Renders a depth map in meters as colors ramping over the clipping range.
///
/// Depths under the near plane, invalid zero pixels included, render white.
/// Depths past the far plane render black.
pub fn render_depth(depth: &ArrayView2<f32>, near_plane: f32, far_plane: f32) -> RgbImage {
    let range_scale = 1.0 / (far_plane - near_plane);
    RgbImage::from_fn(depth.ncols() as u32, depth.nrows() as u32, |x, y| {
        let value = depth[(y as usize, x as usize)];
        if value < near_plane {
            Rgb([255, 255, 255])
        } else if value > far_plane {
            Rgb([0, 0, 0])
        } else {
            ramp_color((value - near_plane) * range_scale)
        }
    })
}

/// Renders the per-pixel outcome of the last ICP iteration.
///
/// Matched pixels are grey. The rejections are black for missing input, red
/// for out of the reference image, green for no reference normal, blue for
/// too far and yellow for opposing normals.
pub fn render_track(correspondences: &ArrayView2<Correspondence>) -> RgbImage {
    RgbImage::from_fn(
        correspondences.ncols() as u32,
        correspondences.nrows() as u32,
        |x, y| match correspondences[(y as usize, x as usize)].status {
            MatchStatus::Matched => Rgb([128, 128, 128]),
            MatchStatus::NoInput => Rgb([0, 0, 0]),
            MatchStatus::OutOfImage => Rgb([255, 0, 0]),
            MatchStatus::NoRefNormal => Rgb([0, 255, 0]),
            MatchStatus::TooFar => Rgb([0, 0, 255]),
            MatchStatus::WrongNormal => Rgb([255, 255, 0]),
        },
    )
}

/// Renders a range image's normals, one channel per axis. Invalid pixels are
/// black.
pub fn render_normals(image: &RangeImage) -> RgbImage {
    RgbImage::from_fn(image.width() as u32, image.height() as u32, |x, y| {
        let (row, col) = (y as usize, x as usize);
        if image.mask[(row, col)] == 0 {
            return Rgb([0, 0, 0]);
        }
        let normal = image.normals[(row, col)];
        Rgb([
            (normal[0] * 128.0 + 128.0) as u8,
            (normal[1] * 128.0 + 128.0) as u8,
            (normal[2] * 128.0 + 128.0) as u8,
        ])
    })
}

/// Renders the volume surface seen from `camera`, shaded by a single point
/// light plus an ambient term. Rays that miss, start inside the surface or
/// land on a zero gradient render the black background.
pub fn render_volume(
    volume: &TsdfVolume,
    camera: &PinholeCamera,
    near_plane: f32,
    far_plane: f32,
    mu: f32,
    light: &Vector3<f32>,
    ambient: f32,
) -> RgbImage {
    let size = volume.size();
    let dim = volume.dim();
    let step = dim[0].min(dim[1]).min(dim[2]) / size[0].max(size[1]).max(size[2]) as f32;
    let large_step = 0.75 * mu;
    let origin = camera.camera_to_world.translation();

    RgbImage::from_fn(camera.width as u32, camera.height as u32, |x, y| {
        let direction = camera.pixel_ray(x as f32, y as f32);
        let hit = match cast_ray(
            volume,
            &origin,
            &direction,
            near_plane,
            far_plane,
            step,
            large_step,
        ) {
            Some(hit) => hit,
            None => return Rgb([0, 0, 0]),
        };

        let gradient = volume.grad(&hit);
        if gradient.norm() == 0.0 {
            return Rgb([0, 0, 0]);
        }
        let diffuse = gradient.normalize().dot(&(light - hit).normalize()).max(0.0);
        let shade = ((diffuse + ambient).clamp(0.0, 1.0) * 255.0) as u8;
        Rgb([shade, shade, shade])
    })
}
