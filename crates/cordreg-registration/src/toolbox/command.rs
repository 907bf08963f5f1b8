//! Collaborators backed by the Spinal Cord Toolbox command-line programs.
//!
//! Each operation renders a [`ToolInvocation`] and runs it as a blocking
//! subprocess. A non-zero exit status fails the run with the program's
//! standard error.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use cordreg_core::interpolation::InterpolationKind;
use cordreg_core::Orientation;
use tracing::{debug, error};

use super::{ImageOps, Registrar, Straightener, TransformOps};
use crate::artifact::{add_suffix, file_stem};
use crate::cache::StraighteningArtifacts;
use crate::chain::{StepTransform, TransformChain, Warp};
use crate::error::{RegistrationError, Result};
use crate::plan::{RegistrationStep, StepType};

/// One external program call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Flag followed by its value.
    pub fn opt(self, flag: &str, value: impl AsRef<OsStr>) -> Self {
        self.arg(flag).arg(value)
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn convert(input: &Path, output: &Path) -> Self {
        Self::new("sct_convert").opt("-i", input).opt("-o", output)
    }

    pub fn binarize(input: &Path, output: &Path, threshold: f64) -> Self {
        Self::new("sct_maths")
            .opt("-i", input)
            .opt("-bin", threshold.to_string())
            .opt("-o", output)
    }

    pub fn resample_mm(input: &Path, output: &Path, spacing: [f64; 3], interpolation: InterpolationKind) -> Self {
        let size = spacing.map(format_mm).join("x");
        Self::new("sct_resample")
            .opt("-i", input)
            .opt("-mm", size)
            .opt("-x", interpolation.as_str())
            .opt("-o", output)
    }

    pub fn resample_factor(input: &Path, output: &Path, factor: [f64; 3]) -> Self {
        let factor = factor.map(|f| f.to_string()).join("x");
        Self::new("sct_resample").opt("-i", input).opt("-f", factor).opt("-o", output)
    }

    pub fn set_orientation(input: &Path, output: &Path, orientation: Orientation) -> Self {
        Self::new("sct_image")
            .opt("-i", input)
            .opt("-setorient", orientation.to_string())
            .opt("-o", output)
    }

    pub fn crop(input: &Path, output: &Path, axis: usize, start: usize, end: usize) -> Self {
        Self::new("sct_crop_image")
            .opt("-i", input)
            .opt("-o", output)
            .opt("-dim", axis.to_string())
            .opt("-start", start.to_string())
            .opt("-end", end.to_string())
    }

    pub fn dilate(input: &Path, output: &Path, radius: usize) -> Self {
        Self::new("sct_maths")
            .opt("-i", input)
            .opt("-o", output)
            .opt("-dilate", radius.to_string())
    }

    pub fn vertebral_body_labels(levels: &Path, output: &Path) -> Self {
        Self::new("sct_label_utils")
            .opt("-i", levels)
            .opt("-vert-body", "0")
            .opt("-o", output)
    }

    pub fn apply(
        input: &Path,
        output: &Path,
        reference: &Path,
        chain: &TransformChain,
        interpolation: InterpolationKind,
    ) -> Self {
        Self::new("sct_apply_transfo")
            .opt("-i", input)
            .opt("-d", reference)
            .opt("-w", chain.to_string())
            .opt("-o", output)
            .opt("-x", interpolation.as_str())
    }

    pub fn concatenate(chain: &TransformChain, reference: &Path, output: &Path) -> Self {
        Self::new("sct_concat_transfo")
            .opt("-w", chain.to_string())
            .opt("-d", reference)
            .opt("-o", output)
    }

    pub fn straighten(segmentation: &Path, output: &Path, workdir: &Path, params: Option<&str>, verbosity: u8) -> Self {
        let invocation = Self::new("sct_straighten_spinalcord")
            .opt("-i", segmentation)
            .opt("-s", segmentation)
            .opt("-o", output)
            .opt("-qc", "0")
            .opt("-r", "0")
            .opt("-v", verbosity.to_string())
            .in_dir(workdir);
        match params {
            Some(p) => invocation.opt("-param", p),
            None => invocation,
        }
    }

    /// Segmentation steps pass the masks both as images and as `-iseg`/`-dseg`,
    /// which the program requires for `type=seg`.
    pub fn register(source: &Path, destination: &Path, step: &RegistrationStep, workdir: &Path) -> Self {
        let registered = workdir.join(file_stem(&add_suffix(source, "_reg")) + ".nii.gz");
        let invocation = Self::new("sct_register_multimodal")
            .opt("-i", source)
            .opt("-d", destination);
        let invocation = match step.step_type {
            StepType::Segmentation => invocation.opt("-iseg", source).opt("-dseg", destination),
            _ => invocation,
        };
        invocation
            .opt("-param", step.to_param_string(1))
            .opt("-ofolder", workdir)
            .opt("-o", registered)
            .opt("-r", "0")
            .opt("-v", "0")
            .in_dir(workdir)
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

fn format_mm(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// Names of the warp pair `sct_register_multimodal` writes for a source and
/// destination.
pub fn registration_warps(source: &Path, destination: &Path, workdir: &Path) -> (PathBuf, PathBuf) {
    let (src, dest) = (file_stem(source), file_stem(destination));
    (
        workdir.join(format!("warp_{src}2{dest}.nii.gz")),
        workdir.join(format!("warp_{dest}2{src}.nii.gz")),
    )
}

/// Runs the toolbox programs found on `PATH` or in a given directory.
#[derive(Debug, Clone, Default)]
pub struct CommandToolbox {
    bin_dir: Option<PathBuf>,
}

impl CommandToolbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look programs up in `dir` instead of `PATH`.
    pub fn with_bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(dir.into());
        self
    }

    fn program_path(&self, program: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(program),
            None => PathBuf::from(program),
        }
    }

    /// Run `invocation` to completion.
    pub fn run(&self, invocation: &ToolInvocation) -> Result<()> {
        let mut cmd = Command::new(self.program_path(&invocation.program));
        cmd.args(&invocation.args);
        if let Some(dir) = &invocation.current_dir {
            cmd.current_dir(dir);
        }
        debug!("Running {}", invocation);

        let output = cmd
            .output()
            .map_err(|e| RegistrationError::tool(&invocation.program, "could not be started", e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("{} failed:\n{}", invocation, stderr);
            return Err(RegistrationError::tool(
                &invocation.program,
                output.status.to_string(),
                stderr.trim(),
            ));
        }
        debug!("{}", String::from_utf8_lossy(&output.stdout).trim_end());
        Ok(())
    }
}

impl ImageOps for CommandToolbox {
    fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        self.run(&ToolInvocation::convert(input, output))
    }

    fn binarize(&self, input: &Path, output: &Path, threshold: f64) -> Result<()> {
        self.run(&ToolInvocation::binarize(input, output, threshold))
    }

    fn resample_mm(
        &self,
        input: &Path,
        output: &Path,
        spacing: [f64; 3],
        interpolation: InterpolationKind,
    ) -> Result<()> {
        self.run(&ToolInvocation::resample_mm(input, output, spacing, interpolation))
    }

    fn resample_factor(&self, input: &Path, output: &Path, factor: [f64; 3]) -> Result<()> {
        self.run(&ToolInvocation::resample_factor(input, output, factor))
    }

    fn set_orientation(&self, input: &Path, output: &Path, orientation: Orientation) -> Result<()> {
        self.run(&ToolInvocation::set_orientation(input, output, orientation))
    }

    fn crop(&self, input: &Path, output: &Path, axis: usize, start: usize, end: usize) -> Result<()> {
        self.run(&ToolInvocation::crop(input, output, axis, start, end))
    }

    fn dilate(&self, input: &Path, output: &Path, radius: usize) -> Result<()> {
        self.run(&ToolInvocation::dilate(input, output, radius))
    }

    fn vertebral_body_labels(&self, levels: &Path, output: &Path) -> Result<()> {
        self.run(&ToolInvocation::vertebral_body_labels(levels, output))
    }
}

impl TransformOps for CommandToolbox {
    fn apply(
        &self,
        input: &Path,
        output: &Path,
        reference: &Path,
        chain: &TransformChain,
        interpolation: InterpolationKind,
    ) -> Result<()> {
        self.run(&ToolInvocation::apply(input, output, reference, chain, interpolation))
    }

    fn concatenate(&self, chain: &TransformChain, reference: &Path, output: &Path) -> Result<()> {
        self.run(&ToolInvocation::concatenate(chain, reference, output))
    }
}

impl Straightener for CommandToolbox {
    fn straighten(
        &self,
        segmentation: &Path,
        output: &Path,
        workdir: &Path,
        params: Option<&str>,
        verbosity: u8,
    ) -> Result<StraighteningArtifacts> {
        let invocation = ToolInvocation::straighten(segmentation, output, workdir, params, verbosity);
        self.run(&invocation)?;
        let artifacts = StraighteningArtifacts::in_dir(workdir);
        if !artifacts.all_exist() {
            return Err(RegistrationError::tool(
                invocation.program,
                "success",
                "straightening warps were not written",
            ));
        }
        Ok(artifacts)
    }
}

impl Registrar for CommandToolbox {
    fn register(
        &self,
        source: &Path,
        destination: &Path,
        step: &RegistrationStep,
        workdir: &Path,
    ) -> Result<StepTransform> {
        self.run(&ToolInvocation::register(source, destination, step, workdir))?;
        let (forward, inverse) = registration_warps(source, destination, workdir);
        Ok(StepTransform::with_inverse(Warp::new(forward)?, Warp::new(inverse)?))
    }
}
