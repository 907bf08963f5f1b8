//! Image filters: resampling, reorientation, cropping and simple
//! morphology.

pub mod crop;
pub mod morphology;
pub mod reorient;
pub mod resample;

pub use crop::crop_axis;
pub use morphology::{binarize, dilate};
pub use reorient::reorient;
pub use resample::{resample, ResampleImageFilter};
