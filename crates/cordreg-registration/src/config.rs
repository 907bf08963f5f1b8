//! Pipeline configuration.
//!
//! A [`PipelineConfig`] is built once, before the pipeline starts, and is
//! only ever borrowed afterwards.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::plan::StepOverride;

/// Which space the registration is anchored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reference {
    /// The subject moves onto the (straight) template.
    #[default]
    Template,
    /// The template moves onto the subject.
    Subject,
}

impl Reference {
    pub fn as_str(self) -> &'static str {
        match self {
            Reference::Template => "template",
            Reference::Subject => "subject",
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "template" => Ok(Reference::Template),
            "subject" => Ok(Reference::Subject),
            other => Err(format!("unknown reference '{other}', expected template or subject")),
        }
    }
}

/// Contrast of the anatomical image, selecting the template intensity volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Contrast {
    T1,
    #[default]
    T2,
    T2s,
}

impl Contrast {
    pub fn as_str(self) -> &'static str {
        match self {
            Contrast::T1 => "t1",
            Contrast::T2 => "t2",
            Contrast::T2s => "t2s",
        }
    }

    /// Descriptions that identify this contrast in a template label index.
    pub fn template_descriptions(self) -> &'static [&'static str] {
        match self {
            Contrast::T1 => &["T1-weighted"],
            Contrast::T2 => &["T2-weighted"],
            Contrast::T2s => &["T2S-weighted", "T2*-weighted"],
        }
    }
}

impl fmt::Display for Contrast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Contrast {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "t1" => Ok(Contrast::T1),
            "t2" => Ok(Contrast::T2),
            "t2s" | "t2*" => Ok(Contrast::T2s),
            other => Err(format!("unknown contrast '{other}', expected t1, t2 or t2s")),
        }
    }
}

/// Where previously computed straightening results are looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CachePolicy {
    /// Always straighten.
    Disabled,
    /// Reuse any straightening files present in a directory.
    Sibling(PathBuf),
    /// Reuse results stored under a content fingerprint.
    Fingerprint(PathBuf),
}

/// Immutable run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Anatomical volume.
    pub anatomical: PathBuf,
    /// Spinal cord segmentation of the anatomical volume.
    pub segmentation: PathBuf,
    /// Two-landmark label volume on the anatomical grid.
    pub labels: PathBuf,
    /// Template root (containing a `template/` folder).
    pub template_dir: PathBuf,
    pub contrast: Contrast,
    pub reference: Reference,
    /// Per-step registration overrides, in the order given.
    pub step_overrides: Vec<StepOverride>,
    /// Extra parameters forwarded verbatim to the straightener.
    pub straighten_params: Option<String>,
    /// Keep the temporary workspace after the run.
    pub keep_temporary: bool,
    /// 0 = quiet, 1 = basic, 2 = extended.
    pub verbosity: u8,
    pub output_dir: PathBuf,
    /// Fraction of z slices kept by the sub-sampling stage.
    pub z_subsample: f64,
    /// Isotropic voxel size in mm for template-reference resampling.
    pub isotropic_mm: f64,
    /// Ball radius, in voxels, used to dilate labels before straightening.
    pub label_dilation: usize,
    /// Physical offset of the synthetic landmark, in mm.
    pub synthetic_offset_mm: f64,
    /// Preferred value of the synthetic landmark.
    pub sentinel_value: f64,
    pub cache: CachePolicy,
}

impl PipelineConfig {
    /// Configuration with default parameters for the given inputs.
    pub fn new(
        anatomical: impl Into<PathBuf>,
        segmentation: impl Into<PathBuf>,
        labels: impl Into<PathBuf>,
        template_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            anatomical: anatomical.into(),
            segmentation: segmentation.into(),
            labels: labels.into(),
            template_dir: template_dir.into(),
            contrast: Contrast::default(),
            reference: Reference::default(),
            step_overrides: Vec::new(),
            straighten_params: None,
            keep_temporary: false,
            verbosity: 1,
            output_dir: PathBuf::from("."),
            z_subsample: 0.25,
            isotropic_mm: 1.0,
            label_dilation: 3,
            synthetic_offset_mm: cordreg_core::label::SYNTHETIC_OFFSET_MM,
            sentinel_value: cordreg_core::label::SYNTHETIC_LABEL_VALUE,
            cache: CachePolicy::Sibling(PathBuf::from(".")),
        }
    }

    pub fn with_contrast(mut self, contrast: Contrast) -> Self {
        self.contrast = contrast;
        self
    }

    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_step_overrides(mut self, overrides: Vec<StepOverride>) -> Self {
        self.step_overrides = overrides;
        self
    }

    pub fn with_straighten_params(mut self, params: impl Into<String>) -> Self {
        self.straighten_params = Some(params.into());
        self
    }

    pub fn keep_temporary(mut self, keep: bool) -> Self {
        self.keep_temporary = keep;
        self
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity.min(2);
        self
    }

    /// Set the output directory.
    ///
    /// A sibling straightening cache that still points at the previous
    /// output directory follows it.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if self.cache == CachePolicy::Sibling(self.output_dir.clone()) {
            self.cache = CachePolicy::Sibling(dir.clone());
        }
        self.output_dir = dir;
        self
    }

    pub fn with_cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_z_subsample(mut self, factor: f64) -> Self {
        self.z_subsample = factor;
        self
    }

    /// Step overrides as expected by the plan builder.
    pub fn overrides(&self) -> Option<&[StepOverride]> {
        (!self.step_overrides.is_empty()).then_some(self.step_overrides.as_slice())
    }

    /// Extension of the anatomical input, `.nii.gz` aware.
    pub fn anatomical_extension(&self) -> String {
        extension_of(&self.anatomical)
    }
}

/// File extension including the leading dot, treating `.nii.gz` as one unit.
pub fn extension_of(path: &Path) -> String {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    if name.ends_with(".nii.gz") {
        return ".nii.gz".to_string();
    }
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enums_parse_and_display() {
        assert_eq!("subject".parse::<Reference>().unwrap(), Reference::Subject);
        assert_eq!("Template".parse::<Reference>().unwrap().to_string(), "template");
        assert!("both".parse::<Reference>().is_err());

        assert_eq!("t2s".parse::<Contrast>().unwrap(), Contrast::T2s);
        assert_eq!(Contrast::T1.to_string(), "t1");
        assert!("flair".parse::<Contrast>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::new("a.nii.gz", "s.nii.gz", "l.nii.gz", "/pam50");
        assert_eq!(config.reference, Reference::Template);
        assert_eq!(config.contrast, Contrast::T2);
        assert_eq!(config.z_subsample, 0.25);
        assert_eq!(config.label_dilation, 3);
        assert_eq!(config.sentinel_value, 99.0);
        assert!(config.overrides().is_none());
    }

    #[test]
    fn test_sibling_cache_follows_output_dir() {
        let config = PipelineConfig::new("a.nii", "s.nii", "l.nii", "t").with_output_dir("/out");
        assert_eq!(config.cache, CachePolicy::Sibling(PathBuf::from("/out")));

        let config = PipelineConfig::new("a.nii", "s.nii", "l.nii", "t")
            .with_cache(CachePolicy::Disabled)
            .with_output_dir("/out");
        assert_eq!(config.cache, CachePolicy::Disabled);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Path::new("/data/t2.nii.gz")), ".nii.gz");
        assert_eq!(extension_of(Path::new("t2.nii")), ".nii");
        assert_eq!(extension_of(Path::new("t2")), "");
    }

    #[test]
    fn test_config_serializes() {
        let config = PipelineConfig::new("a.nii", "s.nii", "l.nii", "t").with_reference(Reference::Subject);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"reference\":\"subject\""));
    }
}
