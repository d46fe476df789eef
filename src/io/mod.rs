pub mod dataset;
pub use dataset::{open_dataset, DatasetError, DepthDataset, PngDepthDataset, RawDepthDataset};

mod trajectory_log;
pub use trajectory_log::{read_trajectory_log, write_trajectory_log};

mod volume;
pub use volume::dump_volume;
