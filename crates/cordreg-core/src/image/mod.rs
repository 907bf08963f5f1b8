//! Image types and operations.
//!
//! This module provides the Image type, the grid geometry it is sampled on,
//! and related functionality for representing medical volumes in physical
//! space.

pub mod geometry;
pub mod grid;
pub mod image;
pub mod statistics;

pub use geometry::{ImageGeometry, DEFAULT_SPACE_TOLERANCE};
pub use grid::generate_grid;
pub use image::Image;
