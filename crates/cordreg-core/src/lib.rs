pub mod filter;
pub mod geometry;
pub mod image;
pub mod interpolation;
pub mod label;
pub mod spatial;
pub mod transform;

pub use image::{Image, ImageGeometry};
pub use spatial::{Orientation, Point3, Spacing3, Direction3, Vector3};
