//! Immutable handles on pipeline files.
//!
//! Each processing stage produces a new file whose name is derived from its
//! input by appending a stage suffix, so the name alone identifies the
//! stage and the parameters that produced it.

use std::fmt;
use std::path::{Path, PathBuf};

/// What a file represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Anatomical,
    Segmentation,
    Labels,
    Template,
    TemplateSegmentation,
    TemplateLabels,
}

/// Processing stage that produced a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Copied into the workspace.
    Converted,
    Binarized,
    Resampled,
    Reoriented,
    Cropped,
    Straightened,
    Matched,
    Synthesized,
    Dilated,
    StraightAffine,
    Subsampled,
    /// Warped by the transforms of refinement steps up to this index.
    RegStep(usize),
}

impl Stage {
    /// File name suffix appended by this stage.
    pub fn suffix(&self) -> String {
        match self {
            Stage::Converted => String::new(),
            Stage::Binarized => "_bin".to_string(),
            Stage::Resampled => "_1mm".to_string(),
            Stage::Reoriented => "_rpi".to_string(),
            Stage::Cropped => "_crop".to_string(),
            Stage::Straightened => "_straight".to_string(),
            Stage::Matched => "_match".to_string(),
            Stage::Synthesized => "_synth".to_string(),
            Stage::Dilated => "_dilate".to_string(),
            Stage::StraightAffine => "_straightAffine".to_string(),
            Stage::Subsampled => "_sub".to_string(),
            Stage::RegStep(k) => format!("_regStep{k}"),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::RegStep(k) => write!(f, "registration step {k}"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Insert `suffix` before the extension of `path` (`.nii.gz` aware).
pub fn add_suffix(path: &Path, suffix: &str) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let (stem, ext) = match name.strip_suffix(".nii.gz") {
        Some(stem) => (stem.to_string(), ".nii.gz".to_string()),
        None => match name.rfind('.') {
            Some(dot) if dot > 0 => (name[..dot].to_string(), name[dot..].to_string()),
            _ => (name.clone(), String::new()),
        },
    };
    path.with_file_name(format!("{stem}{suffix}{ext}"))
}

/// A file produced by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    role: Role,
    stage: Stage,
    path: PathBuf,
}

impl Artifact {
    /// A freshly converted workspace file.
    pub fn new(role: Role, path: impl Into<PathBuf>) -> Self {
        Self {
            role,
            stage: Stage::Converted,
            path: path.into(),
        }
    }

    /// Handle for the output of `stage` applied to this artifact.
    pub fn advance(&self, stage: Stage) -> Artifact {
        Artifact {
            role: self.role,
            stage,
            path: add_suffix(&self.path, &stage.suffix()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without directory and extension.
    pub fn stem(&self) -> String {
        file_stem(&self.path)
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.role)?;
        if self.stage != Stage::Converted {
            write!(f, " after {}", self.stage)?;
        }
        write!(f, " ({})", self.path.display())
    }
}

/// File name without directory and extension (`.nii.gz` aware).
pub fn file_stem(path: &Path) -> String {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    match name.strip_suffix(".nii.gz") {
        Some(stem) => stem.to_string(),
        None => path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_composition() {
        let data = Artifact::new(Role::Anatomical, "/tmp/ws/data.nii");
        let rpi = data.advance(Stage::Resampled).advance(Stage::Reoriented);
        assert_eq!(rpi.path(), Path::new("/tmp/ws/data_1mm_rpi.nii"));
        assert_eq!(rpi.to_string(), "Anatomical after Reoriented (/tmp/ws/data_1mm_rpi.nii)");
        // The earlier handle is unchanged.
        assert_eq!(data.path(), Path::new("/tmp/ws/data.nii"));
    }

    #[test]
    fn test_suffix_keeps_double_extension() {
        let seg = Artifact::new(Role::Segmentation, "seg.nii.gz");
        assert_eq!(seg.advance(Stage::Cropped).path(), Path::new("seg_crop.nii.gz"));
        assert_eq!(seg.advance(Stage::RegStep(2)).path(), Path::new("seg_regStep2.nii.gz"));
        assert_eq!(seg.stem(), "seg");
        assert_eq!(seg.to_string(), "Segmentation (seg.nii.gz)");
        assert_eq!(
            seg.advance(Stage::RegStep(2)).to_string(),
            "Segmentation after registration step 2 (seg_regStep2.nii.gz)"
        );
    }

    #[test]
    fn test_add_suffix_without_extension() {
        assert_eq!(add_suffix(Path::new("dir/volume"), "_x"), PathBuf::from("dir/volume_x"));
        assert_eq!(file_stem(Path::new("dir/warp.txt")), "warp");
    }
}
