//! Transform types and operations.
//!
//! This module provides the transform trait and the implementations needed
//! to evaluate warp chains: affine (ITK-style centred), dense displacement
//! field, and an ordered composite.

pub mod affine;
pub mod composite;
pub mod displacement_field;
pub mod trait_;

pub use affine::AffineTransform;
pub use composite::CompositeTransform;
pub use displacement_field::DisplacementFieldTransform;
pub use trait_::{transform_point, Transform};
