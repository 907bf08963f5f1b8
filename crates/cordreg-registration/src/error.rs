//! Error types for the registration pipeline.
//!
//! Every variant is fatal for a run; the pipeline has no partial-result mode.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use cordreg_core::label::LabelError;
use thiserror::Error;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Landmark labels failed validation.
    #[error(transparent)]
    Label(#[from] LabelError),

    /// Two inputs that must share a voxel grid do not.
    #[error(
        "{} and {} are not in the same space; check space and orientation of your files",
        first.display(),
        second.display()
    )]
    SpaceMismatch { first: PathBuf, second: PathBuf },

    /// A per-step override could not be parsed or merged.
    #[error("Malformed step override '{input}': {reason}")]
    MalformedStepOverride { input: String, reason: String },

    /// A step declares a type that is not valid at its position.
    #[error("Invalid step type: {0}")]
    InvalidStepType(String),

    /// Point-based alignment of the landmarks failed.
    #[error(
        "Landmark estimation failed ({reason}). Input labels do not seem to be at the right place; \
         check the position of the labels"
    )]
    LandmarkEstimation { reason: String },

    /// A required template volume is absent.
    #[error("Missing template file: {}", .0.display())]
    MissingTemplateFile(PathBuf),

    /// A transform chain cannot be composed.
    #[error("Transform chain error: {0}")]
    TransformChain(String),

    /// The selected toolbox cannot run a step algorithm.
    #[error("Algorithm '{algorithm}' is not supported by the {toolbox} toolbox")]
    UnsupportedAlgorithm { algorithm: String, toolbox: &'static str },

    /// An external program exited unsuccessfully.
    #[error("{program} failed ({status}): {stderr}")]
    ToolFailed {
        program: String,
        status: String,
        stderr: String,
    },

    /// Reading or writing a pipeline artifact failed.
    #[error("Artifact error for {}: {reason}", path.display())]
    ArtifactIo { path: PathBuf, reason: String },

    /// Plain filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create a space mismatch error.
    pub fn space_mismatch(first: impl Into<PathBuf>, second: impl Into<PathBuf>) -> Self {
        Self::SpaceMismatch {
            first: first.into(),
            second: second.into(),
        }
    }

    /// Create a malformed override error.
    pub fn malformed_override(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedStepOverride {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid step type error.
    pub fn invalid_step_type(msg: impl Into<String>) -> Self {
        Self::InvalidStepType(msg.into())
    }

    /// Create a landmark estimation error.
    pub fn landmark_estimation(reason: impl Into<String>) -> Self {
        Self::LandmarkEstimation { reason: reason.into() }
    }

    /// Create a transform chain error.
    pub fn transform_chain(msg: impl Into<String>) -> Self {
        Self::TransformChain(msg.into())
    }

    /// Create an unsupported algorithm error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>, toolbox: &'static str) -> Self {
        Self::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
            toolbox,
        }
    }

    /// Create a tool failure error.
    pub fn tool(program: impl Into<String>, status: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::ToolFailed {
            program: program.into(),
            status: status.into(),
            stderr: stderr.into(),
        }
    }

    /// Create an artifact I/O error.
    pub fn artifact_io(path: impl Into<PathBuf>, reason: impl Display) -> Self {
        Self::ArtifactIo {
            path: path.into(),
            reason: format!("{reason:#}"),
        }
    }
}

/// Attach the artifact path to errors coming from the I/O layer.
pub trait ArtifactContext<T> {
    fn for_artifact(self, path: &Path) -> Result<T>;
}

impl<T, E: Display> ArtifactContext<T> for std::result::Result<T, E> {
    fn for_artifact(self, path: &Path) -> Result<T> {
        self.map_err(|e| RegistrationError::artifact_io(path, e))
    }
}
