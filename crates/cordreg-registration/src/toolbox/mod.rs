//! File-to-file collaborators of the pipeline.
//!
//! Every operation reads its inputs from disk and writes its output to disk,
//! so the pipeline can run against the external toolbox programs
//! ([`CommandToolbox`]) or the in-process implementations
//! ([`NativeToolbox`]) without changing a stage.

use std::path::Path;

use cordreg_core::interpolation::InterpolationKind;
use cordreg_core::Orientation;

use crate::cache::StraighteningArtifacts;
use crate::chain::{StepTransform, TransformChain};
use crate::error::Result;
use crate::plan::RegistrationStep;

pub mod command;
pub mod native;

pub use command::{CommandToolbox, ToolInvocation};
pub use native::NativeToolbox;

/// Voxel-level image operations.
pub trait ImageOps {
    /// Copy `input` to `output`, converting the file format if needed.
    fn convert(&self, input: &Path, output: &Path) -> Result<()>;

    /// Voxels above `threshold` become 1, all others 0.
    fn binarize(&self, input: &Path, output: &Path, threshold: f64) -> Result<()>;

    /// Resample to the given voxel size in mm.
    fn resample_mm(&self, input: &Path, output: &Path, spacing: [f64; 3], interpolation: InterpolationKind)
        -> Result<()>;

    /// Resample by a per-axis factor of the voxel count (linear).
    fn resample_factor(&self, input: &Path, output: &Path, factor: [f64; 3]) -> Result<()>;

    /// Permute and flip axes to the given orientation code.
    fn set_orientation(&self, input: &Path, output: &Path, orientation: Orientation) -> Result<()>;

    /// Keep voxel indices `start..=end` along `axis`.
    fn crop(&self, input: &Path, output: &Path, axis: usize, start: usize, end: usize) -> Result<()>;

    /// Grow non-zero voxels by a ball of `radius` voxels.
    fn dilate(&self, input: &Path, output: &Path, radius: usize) -> Result<()>;

    /// One label per vertebral level at the centre of its body.
    fn vertebral_body_labels(&self, levels: &Path, output: &Path) -> Result<()>;
}

/// Operations on warp chains.
pub trait TransformOps {
    /// Resample `input` onto the grid of `reference` through `chain`.
    fn apply(
        &self,
        input: &Path,
        output: &Path,
        reference: &Path,
        chain: &TransformChain,
        interpolation: InterpolationKind,
    ) -> Result<()>;

    /// Collapse `chain` into one displacement field on the grid of
    /// `reference`.
    fn concatenate(&self, chain: &TransformChain, reference: &Path, output: &Path) -> Result<()>;
}

/// Cord straightening.
pub trait Straightener {
    /// Straighten `segmentation`, writing the straightened volume to
    /// `output` and the warp pair plus straight reference into `workdir`.
    fn straighten(
        &self,
        segmentation: &Path,
        output: &Path,
        workdir: &Path,
        params: Option<&str>,
        verbosity: u8,
    ) -> Result<StraighteningArtifacts>;
}

/// Solver for one refinement step.
pub trait Registrar {
    /// Estimate the transform bringing `source` onto `destination`.
    ///
    /// Warp files are written into `workdir`.
    fn register(
        &self,
        source: &Path,
        destination: &Path,
        step: &RegistrationStep,
        workdir: &Path,
    ) -> Result<StepTransform>;
}

/// Everything the pipeline needs from its collaborators.
pub trait Toolbox: ImageOps + TransformOps + Straightener + Registrar {}

impl<T: ImageOps + TransformOps + Straightener + Registrar> Toolbox for T {}
