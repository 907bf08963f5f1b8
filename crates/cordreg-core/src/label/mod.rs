//! Landmark labels: single-voxel markers of vertebral levels.
//!
//! This module provides the label set type, validation of user labels,
//! rescaling between grids and synthesis of the extra label used for rigid
//! alignment.

pub mod error;
pub mod landmark;
pub mod resample;
pub mod synthesize;
pub mod validate;

pub use error::LabelError;
pub use landmark::{LabelSet, Landmark};
pub use resample::{resample_landmarks, scaling_factors};
pub use synthesize::{choose_sentinel, synthesize_offset_label, SYNTHETIC_LABEL_VALUE, SYNTHETIC_OFFSET_MM};
pub use validate::{check_correspondence, validate_landmark_pair, EXPECTED_LANDMARKS};
