//! Spatial types for points, vectors, spacing, direction matrices and
//! anatomical orientation codes.
//!
//! Numeric types are the nalgebra aliases from [`crate::geometry`].

pub mod orientation;

pub use crate::geometry::{Direction3, Point3, Spacing3, Vector3};
pub use orientation::{AxisCode, Orientation, OrientationParseError, ReorientPlan};
