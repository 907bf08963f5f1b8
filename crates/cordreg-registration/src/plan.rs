//! Multi-step registration plan.
//!
//! Step 0 is always a landmark-based linear alignment. Steps 1..N refine it
//! using either the intensity images or the segmentation masks. Plans are
//! values: overrides produce a new plan and never modify an existing one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::Reference;
use crate::error::{RegistrationError, Result};

/// Degrees of freedom of the default landmark step in template mode.
pub const TEMPLATE_LANDMARK_DOF: &str = "Tx_Ty_Tz_Sz";
/// Degrees of freedom of the landmark step in subject mode.
pub const SUBJECT_LANDMARK_DOF: &str = "Tx_Ty_Tz_Rx_Ry_Rz_Sz";

/// Data a step registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    /// Landmark labels (step 0 only).
    Label,
    /// Intensity volumes.
    Image,
    /// Segmentation masks.
    Segmentation,
}

impl StepType {
    /// Short name used on command lines.
    pub fn as_str(self) -> &'static str {
        match self {
            StepType::Label => "label",
            StepType::Image => "im",
            StepType::Segmentation => "seg",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepType {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "label" => Ok(StepType::Label),
            "im" | "image" => Ok(StepType::Image),
            "seg" | "segmentation" => Ok(StepType::Segmentation),
            other => Err(RegistrationError::invalid_step_type(format!(
                "'{other}' (expected label, im or seg)"
            ))),
        }
    }
}

/// Parsed degrees-of-freedom string such as `Tx_Ty_Tz_Sz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DegreesOfFreedom {
    pub translation: [bool; 3],
    pub rotation: [bool; 3],
    pub scale: [bool; 3],
}

impl DegreesOfFreedom {
    pub fn any_rotation(&self) -> bool {
        self.rotation.iter().any(|&r| r)
    }

    pub fn any_scale(&self) -> bool {
        self.scale.iter().any(|&s| s)
    }
}

impl FromStr for DegreesOfFreedom {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut dof = DegreesOfFreedom::default();
        for token in s.split('_').filter(|t| !t.is_empty()) {
            let mut chars = token.chars();
            let (kind, axis) = match (chars.next(), chars.next(), chars.next()) {
                (Some(kind), Some(axis), None) => (kind, axis),
                _ => return Err(format!("unknown degree of freedom '{token}'")),
            };
            let axis = match axis {
                'x' => 0,
                'y' => 1,
                'z' => 2,
                _ => return Err(format!("unknown axis in degree of freedom '{token}'")),
            };
            match kind {
                'T' => dof.translation[axis] = true,
                'R' => dof.rotation[axis] = true,
                'S' => dof.scale[axis] = true,
                _ => return Err(format!("unknown degree of freedom '{token}'")),
            }
        }
        Ok(dof)
    }
}

/// Configuration of one registration step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationStep {
    pub index: usize,
    pub step_type: StepType,
    pub algorithm: String,
    pub metric: String,
    pub iterations: u32,
    pub shrink: u32,
    pub smoothing_sigma: f64,
    pub gradient_step: f64,
    /// Per-axis deformation switch, e.g. `1x1x0`.
    pub deformation: String,
    pub degrees_of_freedom: String,
    pub slicewise: bool,
    /// Polynomial degree for slice-wise algorithms.
    pub poly: u32,
    pub laplacian: f64,
    /// In-plane smoothing of the estimated warp, in mm.
    pub smooth_warp_xy: f64,
    pub pca_eigenratio_threshold: f64,
}

impl RegistrationStep {
    /// A step with the toolbox defaults.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            step_type: StepType::Image,
            algorithm: "syn".to_string(),
            metric: "MeanSquares".to_string(),
            iterations: 10,
            shrink: 1,
            smoothing_sigma: 0.0,
            gradient_step: 0.5,
            deformation: "1x1x0".to_string(),
            degrees_of_freedom: "Tx_Ty_Tz_Rx_Ry_Rz".to_string(),
            slicewise: false,
            poly: 5,
            laplacian: 0.0,
            smooth_warp_xy: 2.0,
            pca_eigenratio_threshold: 1.6,
        }
    }

    pub fn with_type(mut self, step_type: StepType) -> Self {
        self.step_type = step_type;
        self
    }

    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = algorithm.into();
        self
    }

    pub fn with_dof(mut self, dof: impl Into<String>) -> Self {
        self.degrees_of_freedom = dof.into();
        self
    }

    pub fn dof(&self) -> Result<DegreesOfFreedom> {
        self.degrees_of_freedom
            .parse()
            .map_err(|reason| RegistrationError::malformed_override(&self.degrees_of_freedom, reason))
    }

    /// Return a copy with the fields set in `ov` replaced.
    pub fn merged(&self, ov: &StepOverride) -> Self {
        let mut step = self.clone();
        if let Some(v) = ov.step_type {
            step.step_type = v;
        }
        if let Some(v) = &ov.algorithm {
            step.algorithm = v.clone();
        }
        if let Some(v) = &ov.metric {
            step.metric = v.clone();
        }
        if let Some(v) = ov.iterations {
            step.iterations = v;
        }
        if let Some(v) = ov.shrink {
            step.shrink = v;
        }
        if let Some(v) = ov.smoothing_sigma {
            step.smoothing_sigma = v;
        }
        if let Some(v) = ov.gradient_step {
            step.gradient_step = v;
        }
        if let Some(v) = &ov.deformation {
            step.deformation = v.clone();
        }
        if let Some(v) = &ov.degrees_of_freedom {
            step.degrees_of_freedom = v.clone();
        }
        if let Some(v) = ov.slicewise {
            step.slicewise = v;
        }
        if let Some(v) = ov.poly {
            step.poly = v;
        }
        if let Some(v) = ov.laplacian {
            step.laplacian = v;
        }
        if let Some(v) = ov.smooth_warp_xy {
            step.smooth_warp_xy = v;
        }
        if let Some(v) = ov.pca_eigenratio_threshold {
            step.pca_eigenratio_threshold = v;
        }
        step
    }

    /// `key=value` rendering understood by the registration program.
    pub fn to_param_string(&self, step_label: usize) -> String {
        format!(
            "step={},type={},algo={},metric={},iter={},shrink={},smooth={},gradStep={},deformation={},\
             poly={},slicewise={},laplacian={},dof={},smoothWarpXY={},pca_eigenratio_th={}",
            step_label,
            self.step_type,
            self.algorithm,
            self.metric,
            self.iterations,
            self.shrink,
            self.smoothing_sigma,
            self.gradient_step,
            self.deformation,
            self.poly,
            u8::from(self.slicewise),
            self.laplacian,
            self.degrees_of_freedom,
            self.smooth_warp_xy,
            self.pca_eigenratio_threshold,
        )
    }
}

/// A user-supplied partial step record, e.g. `step=1,type=seg,algo=slicereg`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOverride {
    pub index: usize,
    pub step_type: Option<StepType>,
    pub algorithm: Option<String>,
    pub metric: Option<String>,
    pub iterations: Option<u32>,
    pub shrink: Option<u32>,
    pub smoothing_sigma: Option<f64>,
    pub gradient_step: Option<f64>,
    pub deformation: Option<String>,
    pub degrees_of_freedom: Option<String>,
    pub slicewise: Option<bool>,
    pub poly: Option<u32>,
    pub laplacian: Option<f64>,
    pub smooth_warp_xy: Option<f64>,
    pub pca_eigenratio_threshold: Option<f64>,
}

fn parse_field<T: FromStr>(record: &str, key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RegistrationError::malformed_override(record, format!("invalid value '{value}' for {key}")))
}

impl StepOverride {
    /// Parse one `,`-separated record of `key=value` pairs.
    pub fn parse(record: &str) -> Result<Self> {
        let mut ov = StepOverride::default();
        let mut index = None;
        for pair in record.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| RegistrationError::malformed_override(record, format!("'{pair}' is not key=value")))?;
            let value = value.trim();
            match key.trim() {
                "step" => index = Some(parse_field::<usize>(record, "step", value)?),
                "type" => ov.step_type = Some(value.parse()?),
                "algo" => ov.algorithm = Some(value.to_string()),
                "metric" => ov.metric = Some(value.to_string()),
                "iter" => ov.iterations = Some(parse_field(record, "iter", value)?),
                "shrink" => ov.shrink = Some(parse_field(record, "shrink", value)?),
                "smooth" => ov.smoothing_sigma = Some(parse_field(record, "smooth", value)?),
                "gradStep" => ov.gradient_step = Some(parse_field(record, "gradStep", value)?),
                "deformation" => ov.deformation = Some(value.to_string()),
                "dof" => {
                    value
                        .parse::<DegreesOfFreedom>()
                        .map_err(|reason| RegistrationError::malformed_override(record, reason))?;
                    ov.degrees_of_freedom = Some(value.to_string());
                }
                "slicewise" => ov.slicewise = Some(parse_field::<u8>(record, "slicewise", value)? != 0),
                "poly" => ov.poly = Some(parse_field(record, "poly", value)?),
                "laplacian" => ov.laplacian = Some(parse_field(record, "laplacian", value)?),
                "smoothWarpXY" => ov.smooth_warp_xy = Some(parse_field(record, "smoothWarpXY", value)?),
                "pca_eigenratio_th" => {
                    ov.pca_eigenratio_threshold = Some(parse_field(record, "pca_eigenratio_th", value)?)
                }
                other => {
                    return Err(RegistrationError::malformed_override(
                        record,
                        format!("unknown key '{other}'"),
                    ))
                }
            }
        }
        ov.index = index.ok_or_else(|| RegistrationError::malformed_override(record, "missing step="))?;
        Ok(ov)
    }

    /// Parse `:`-separated records.
    pub fn parse_list(input: &str) -> Result<Vec<Self>> {
        input
            .split(':')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(Self::parse)
            .collect()
    }
}

/// Ordered, contiguous list of registration steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationPlan {
    steps: Vec<RegistrationStep>,
}

impl RegistrationPlan {
    /// Label alignment, then centre-of-mass + rotation on the segmentation,
    /// then a deformable segmentation step.
    pub fn default_plan() -> Self {
        let step0 = RegistrationStep::new(0)
            .with_type(StepType::Label)
            .with_dof(TEMPLATE_LANDMARK_DOF);
        let mut step1 = RegistrationStep::new(1)
            .with_type(StepType::Segmentation)
            .with_algorithm("centermassrot");
        step1.smoothing_sigma = 2.0;
        let mut step2 = RegistrationStep::new(2)
            .with_type(StepType::Segmentation)
            .with_algorithm("bsplinesyn");
        step2.metric = "MeanSquares".to_string();
        step2.iterations = 3;
        step2.smoothing_sigma = 1.0;
        Self {
            steps: vec![step0, step1, step2],
        }
    }

    /// Plan for a run, from the defaults and optional user overrides.
    ///
    /// With overrides, only step 0 of the default plan is kept and the
    /// overrides are merged in ascending step order. In subject mode the
    /// landmark step is widened to rotations before overrides apply.
    pub fn from_user(reference: Reference, overrides: Option<&[StepOverride]>) -> Result<Self> {
        let mut plan = Self::default_plan();
        if reference == Reference::Subject {
            plan.steps[0].degrees_of_freedom = SUBJECT_LANDMARK_DOF.to_string();
        }
        if let Some(overrides) = overrides {
            plan.steps.truncate(1);
            let mut sorted: Vec<&StepOverride> = overrides.iter().collect();
            sorted.sort_by_key(|ov| ov.index);
            for ov in sorted {
                plan = plan.with_override(ov)?;
            }
        }
        plan.validate()?;
        Ok(plan)
    }

    /// Merge one override into a new plan.
    ///
    /// An existing step keeps every field the override leaves unset; the
    /// step right after the last one is created from the defaults.
    pub fn with_override(&self, ov: &StepOverride) -> Result<Self> {
        let mut steps = self.steps.clone();
        match ov.index {
            i if i < steps.len() => steps[i] = steps[i].merged(ov),
            i if i == steps.len() => steps.push(RegistrationStep::new(i).merged(ov)),
            i => {
                return Err(RegistrationError::malformed_override(
                    format!("step={i}"),
                    format!("steps must be contiguous; the next step is {}", steps.len()),
                ))
            }
        }
        Ok(Self { steps })
    }

    /// Check the structural rules of a plan.
    pub fn validate(&self) -> Result<()> {
        for (i, step) in self.steps.iter().enumerate() {
            if step.index != i {
                return Err(RegistrationError::malformed_override(
                    format!("step={}", step.index),
                    format!("expected step {i}"),
                ));
            }
        }
        let first = self
            .steps
            .first()
            .ok_or_else(|| RegistrationError::invalid_step_type("plan has no landmark step"))?;
        if first.step_type != StepType::Label {
            return Err(RegistrationError::invalid_step_type(format!(
                "step 0 must be of type label, found {}",
                first.step_type
            )));
        }
        first.dof()?;
        if let Some(step) = self.refinement_steps().iter().find(|s| s.step_type == StepType::Label) {
            return Err(RegistrationError::invalid_step_type(format!(
                "step {} has type label; only step 0 may",
                step.index
            )));
        }
        Ok(())
    }

    pub fn steps(&self) -> &[RegistrationStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The landmark step.
    pub fn landmark_step(&self) -> Option<&RegistrationStep> {
        self.steps.first()
    }

    /// Steps 1..N.
    pub fn refinement_steps(&self) -> &[RegistrationStep] {
        self.steps.get(1..).unwrap_or(&[])
    }
}
