mod range_image;
pub use range_image::RangeImage;

mod pyramid;
pub use pyramid::half_sample_robust;
