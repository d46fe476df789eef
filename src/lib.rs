pub mod bilateral;
pub mod camera;

pub mod icp;
pub mod io;

pub mod depth;
pub mod range_image;
pub mod transform;
pub mod volume;

pub mod integrate;
pub mod raycast;

pub mod pipeline;
pub mod render;

pub mod error;
pub mod trajectory;


pub mod metrics;

mod memory;
pub use crate::memory::Array2Recycle;
