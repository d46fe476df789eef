use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use glob::PatternError;
use image::ImageError;
use ndarray::Array2;
use nshare::ToNdarray2;
use serde_derive::Deserialize;

use crate::camera::CameraIntrinsics;
use crate::error::Error;

#[derive(Debug)]
pub enum DatasetError {
    Io(std::io::Error),
    Parser(String),
    Image(ImageError),
}

impl std::fmt::Display for DatasetError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DatasetError::Io(err) => write!(f, "IO error: {err}"),
            DatasetError::Parser(err) => write!(f, "Parser error: {err}"),
            DatasetError::Image(err) => write!(f, "Image error: {err}"),
        }
    }
}

impl std::error::Error for DatasetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatasetError::Io(err) => Some(err),
            DatasetError::Parser(_) => None,
            DatasetError::Image(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for DatasetError {
    fn from(err: std::io::Error) -> Self {
        DatasetError::Io(err)
    }
}

impl From<ImageError> for DatasetError {
    fn from(err: ImageError) -> Self {
        DatasetError::Image(err)
    }
}

impl From<PatternError> for DatasetError {
    fn from(err: glob::PatternError) -> Self {
        DatasetError::Parser(err.to_string())
    }
}

impl From<DatasetError> for Error {
    fn from(err: DatasetError) -> Self {
        match err {
            DatasetError::Io(err) => Error::Io(err),
            DatasetError::Parser(err) => Error::Parser(err),
            DatasetError::Image(err) => Error::Parser(err.to_string()),
        }
    }
}

/// Source of raw depth frames for the pipeline.
pub trait DepthDataset {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool;
    /// Frame size as (width, height), constant over the whole dataset.
    fn image_size(&self) -> (usize, usize);
    /// Intrinsics at the dataset's native resolution.
    fn intrinsics(&self) -> CameraIntrinsics;
    /// Scale from raw depth units to meters.
    fn depth_scale(&self) -> f32;
    fn get(&self, index: usize) -> Result<Array2<u16>, DatasetError>;
}

/// Packed binary depth stream. Every frame record is `width: u32 LE`,
/// `height: u32 LE` followed by `width * height` little endian `u16`
/// millimeter samples, and all records share one size.
pub struct RawDepthDataset {
    path: PathBuf,
    width: usize,
    height: usize,
    frames: usize,
    intrinsics: CameraIntrinsics,
}

fn read_u32(reader: &mut impl Read) -> Result<u32, DatasetError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

impl RawDepthDataset {
    /// Opens a stream file. The stream itself carries no camera metadata, so
    /// the intrinsics come from the caller.
    pub fn open(path: &Path, intrinsics: CameraIntrinsics) -> Result<Self, DatasetError> {
        let total_bytes = std::fs::metadata(path)?.len() as usize;
        let mut reader = BufReader::new(File::open(path)?);
        let width = read_u32(&mut reader)? as usize;
        let height = read_u32(&mut reader)? as usize;
        if width == 0 || height == 0 {
            return Err(DatasetError::Parser(format!(
                "depth stream starts with a {width}x{height} frame"
            )));
        }

        let record_bytes = 8 + width * height * 2;
        if total_bytes % record_bytes != 0 {
            return Err(DatasetError::Parser(format!(
                "stream length {total_bytes} is not a multiple of its {record_bytes} byte records"
            )));
        }

        let mut intrinsics = intrinsics;
        intrinsics.size(width, height);
        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            frames: total_bytes / record_bytes,
            intrinsics,
        })
    }
}

impl DepthDataset for RawDepthDataset {
    fn len(&self) -> usize {
        self.frames
    }

    fn is_empty(&self) -> bool {
        self.frames == 0
    }

    fn image_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn intrinsics(&self) -> CameraIntrinsics {
        self.intrinsics.clone()
    }

    fn depth_scale(&self) -> f32 {
        0.001
    }

    fn get(&self, index: usize) -> Result<Array2<u16>, DatasetError> {
        if index >= self.frames {
            return Err(DatasetError::Parser(format!(
                "frame {index} is past the {} stream records",
                self.frames
            )));
        }

        let record_bytes = (8 + self.width * self.height * 2) as u64;
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(index as u64 * record_bytes))?;
        let mut reader = BufReader::new(file);

        let width = read_u32(&mut reader)? as usize;
        let height = read_u32(&mut reader)? as usize;
        if width != self.width || height != self.height {
            return Err(DatasetError::Parser(format!(
                "frame {index} is {width}x{height}, the stream started as {}x{}",
                self.width, self.height
            )));
        }

        let mut bytes = vec![0u8; width * height * 2];
        reader.read_exact(&mut bytes)?;
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Array2::from_shape_vec((height, width), samples)
            .map_err(|err| DatasetError::Parser(err.to_string()))
    }
}

/// Camera metadata sidecar of a PNG depth directory.
#[derive(Deserialize, Debug)]
struct CameraMeta {
    fx: f64,
    fy: f64,
    cx: f64,
    cy: f64,
    depth_scale: f32,
}

/// Directory of 16 bit depth PNGs with a `camera.json` metadata sidecar,
/// frames ordered by filename.
pub struct PngDepthDataset {
    depth_images: Vec<PathBuf>,
    intrinsics: CameraIntrinsics,
    depth_scale: f32,
    width: usize,
    height: usize,
}

impl PngDepthDataset {
    pub fn load(base_dir: &str) -> Result<Self, DatasetError> {
        let file = File::open(Path::new(base_dir).join("camera.json"))?;
        let meta: CameraMeta = serde_json::from_reader(BufReader::new(file))
            .map_err(|err| DatasetError::Parser(err.to_string()))?;

        let depth_images: Vec<PathBuf> = glob::glob(&format!("{base_dir}/*.png"))?
            .filter_map(|entry| entry.ok())
            .collect();
        if depth_images.is_empty() {
            return Err(DatasetError::Parser(format!(
                "no depth images under {base_dir}"
            )));
        }

        let first = image::open(&depth_images[0])?.into_luma16();
        let (width, height) = (first.width() as usize, first.height() as usize);

        let mut intrinsics =
            CameraIntrinsics::from_simple_intrinsic(meta.fx, meta.fy, meta.cx, meta.cy);
        intrinsics.size(width, height);
        Ok(Self {
            depth_images,
            intrinsics,
            depth_scale: meta.depth_scale,
            width,
            height,
        })
    }
}

impl DepthDataset for PngDepthDataset {
    fn len(&self) -> usize {
        self.depth_images.len()
    }

    fn is_empty(&self) -> bool {
        self.depth_images.is_empty()
    }

    fn image_size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn intrinsics(&self) -> CameraIntrinsics {
        self.intrinsics.clone()
    }

    fn depth_scale(&self) -> f32 {
        self.depth_scale
    }

    fn get(&self, index: usize) -> Result<Array2<u16>, DatasetError> {
        let depth = image::open(&self.depth_images[index])?
            .into_luma16()
            .into_ndarray2();
        Ok(depth)
    }
}

/// Opens a depth source. Directories become PNG datasets carrying their own
/// metadata, anything else is read as a packed stream with the caller
/// supplied intrinsics.
pub fn open_dataset(
    path: &str,
    intrinsics: Option<CameraIntrinsics>,
) -> Result<Box<dyn DepthDataset>, DatasetError> {
    if Path::new(path).is_dir() {
        return Ok(Box::new(PngDepthDataset::load(path)?));
    }

    let intrinsics = intrinsics.ok_or_else(|| {
        DatasetError::Parser("packed depth streams need explicit camera intrinsics".to_string())
    })?;
    Ok(Box::new(RawDepthDataset::open(Path::new(path), intrinsics)?))
}
