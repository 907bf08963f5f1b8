//! Interpolation types and operations.
//!
//! This module provides interpolation traits and implementations
//! for sampling values at continuous coordinates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod linear;
pub mod nearest;
pub mod trait_;

pub use linear::LinearInterpolator;
pub use nearest::NearestNeighborInterpolator;
pub use trait_::Interpolator;

/// Interpolation scheme requested when resampling a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterpolationKind {
    NearestNeighbor,
    Linear,
    /// Higher-order spline; in-process resampling treats it as linear.
    Spline,
}

impl InterpolationKind {
    /// Token used on the command line of the external toolbox.
    pub fn as_str(self) -> &'static str {
        match self {
            InterpolationKind::NearestNeighbor => "nn",
            InterpolationKind::Linear => "linear",
            InterpolationKind::Spline => "spline",
        }
    }
}

impl fmt::Display for InterpolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterpolationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nn" | "nearest" => Ok(InterpolationKind::NearestNeighbor),
            "linear" => Ok(InterpolationKind::Linear),
            "spline" => Ok(InterpolationKind::Spline),
            other => Err(format!("unknown interpolation {other:?}")),
        }
    }
}
