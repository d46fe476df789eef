use ndarray::{Array2, ArrayView2, Zip};

use crate::error::Error;
use crate::memory::Array2Recycle;

/// Converts a raw integer depth frame into meters at the computation
/// resolution, point-sampling every `ratio`-th pixel. Zero samples stay zero
/// (invalid depth).
///
/// # Arguments
///
/// * `depth` - Raw depth image, usually millimeters.
/// * `ratio` - Input to computation resolution ratio, must divide both axes.
/// * `depth_scale` - Scale from raw units to meters.
/// * `data` - An Array Recycle to reuse memory.
///
/// # Returns
///
/// The depth image in meters.
pub fn depth_to_meters(
    depth: &ArrayView2<u16>,
    ratio: usize,
    depth_scale: f32,
    data: Array2Recycle<f32>,
) -> Array2<f32> {
    let (in_height, in_width) = depth.dim();
    let mut meters = data.get((in_height / ratio, in_width / ratio));

    Zip::indexed(&mut meters).par_for_each(|(row, col), value| {
        *value = depth[[row * ratio, col * ratio]] as f32 * depth_scale;
    });

    meters
}

/// Validates an input resolution against a downsample ratio.
pub fn check_size_ratio(input_size: (usize, usize), ratio: usize) -> Result<(usize, usize), Error> {
    if ratio == 0 {
        return Err(Error::invalid_parameter("size ratio must be at least 1"));
    }
    let (height, width) = input_size;
    if height % ratio != 0 || width % ratio != 0 {
        return Err(Error::invalid_parameter(format!(
            "input size {}x{} is not divisible by the size ratio {}",
            width, height, ratio
        )));
    }

    Ok((height / ratio, width / ratio))
}
