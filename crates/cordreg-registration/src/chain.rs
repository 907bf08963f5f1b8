//! Transform chains and their composition.
//!
//! A [`TransformChain`] lists warps in application order: the first element
//! is applied to the source image, the last one lands in the destination
//! space. The inverse chain of `[a, b, c]` is `[c⁻¹, b⁻¹, a⁻¹]`.
//!
//! Linear warps are inverted algebraically when the chain is evaluated.
//! Dense warps are never inverted by formula; their inverse is a separate
//! field produced together with the forward one.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::Reference;
use crate::error::{RegistrationError, Result};

/// Storage kind of a warp file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarpKind {
    /// ITK affine transform (`.txt`, `.mat`).
    Linear,
    /// Displacement field volume (`.nii`, `.nii.gz`).
    Dense,
}

impl WarpKind {
    /// Infer the kind from a file name.
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path.file_name().map(|n| n.to_string_lossy().to_lowercase()).unwrap_or_default();
        if name.ends_with(".txt") || name.ends_with(".mat") {
            Ok(WarpKind::Linear)
        } else if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            Ok(WarpKind::Dense)
        } else {
            Err(RegistrationError::transform_chain(format!(
                "cannot tell the transform kind of {}",
                path.display()
            )))
        }
    }
}

/// A warp stored in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warp {
    path: PathBuf,
    kind: WarpKind,
}

impl Warp {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let kind = WarpKind::from_path(&path)?;
        Ok(Self { path, kind })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> WarpKind {
        self.kind
    }
}

/// A warp as used in a chain, possibly inverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarpRef {
    warp: Warp,
    inverted: bool,
}

impl WarpRef {
    pub fn forward(warp: Warp) -> Self {
        Self { warp, inverted: false }
    }

    /// The algebraic inverse of a linear warp.
    pub fn inverted(warp: Warp) -> Result<Self> {
        if warp.kind() != WarpKind::Linear {
            return Err(RegistrationError::transform_chain(format!(
                "{} is a dense warp and cannot be inverted algebraically",
                warp.path().display()
            )));
        }
        Ok(Self { warp, inverted: true })
    }

    /// This reference with the inversion flag flipped (linear warps only).
    pub fn invert(&self) -> Result<Self> {
        if self.inverted {
            Ok(Self::forward(self.warp.clone()))
        } else {
            Self::inverted(self.warp.clone())
        }
    }

    pub fn warp(&self) -> &Warp {
        &self.warp
    }

    pub fn path(&self) -> &Path {
        self.warp.path()
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }
}

impl fmt::Display for WarpRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inverted {
            write!(f, "-{}", self.path().display())
        } else {
            write!(f, "{}", self.path().display())
        }
    }
}

/// Forward warp of a step together with its inverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTransform {
    pub forward: Warp,
    pub inverse: WarpRef,
}

impl StepTransform {
    /// A linear step, inverted algebraically.
    pub fn linear(forward: Warp) -> Result<Self> {
        let inverse = WarpRef::inverted(forward.clone())?;
        Ok(Self { forward, inverse })
    }

    /// A step whose inverse was estimated as its own file.
    pub fn with_inverse(forward: Warp, inverse: Warp) -> Self {
        Self {
            forward,
            inverse: WarpRef::forward(inverse),
        }
    }
}

/// Warps in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformChain {
    warps: Vec<WarpRef>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warp: WarpRef) {
        self.warps.push(warp);
    }

    pub fn then(mut self, warp: WarpRef) -> Self {
        self.push(warp);
        self
    }

    pub fn warps(&self) -> &[WarpRef] {
        &self.warps
    }

    pub fn iter(&self) -> impl Iterator<Item = &WarpRef> {
        self.warps.iter()
    }

    pub fn len(&self) -> usize {
        self.warps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warps.is_empty()
    }

    /// Algebraic inverse; fails if any element is dense.
    pub fn inverse(&self) -> Result<Self> {
        let warps = self.warps.iter().rev().map(WarpRef::invert).collect::<Result<_>>()?;
        Ok(Self { warps })
    }
}

impl FromIterator<WarpRef> for TransformChain {
    fn from_iter<I: IntoIterator<Item = WarpRef>>(iter: I) -> Self {
        Self {
            warps: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for TransformChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.warps.iter().map(|w| w.to_string()).collect();
        f.write_str(&rendered.join(","))
    }
}

/// Prefix a refinement step's source is warped by before registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainScope {
    /// Warps of the refinement steps recorded so far.
    StepsOnly,
    /// Landmark affine followed by the refinement steps recorded so far.
    Full,
}

/// Final forward and inverse chains of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedChains {
    /// Source space onto destination space of the run.
    pub forward: TransformChain,
    /// Destination space back onto source space.
    pub inverse: TransformChain,
}

/// Accumulates the transforms of a run as stages complete.
#[derive(Debug, Clone)]
pub struct ChainBuilder {
    reference: Reference,
    expected_steps: usize,
    straightening: Option<(Warp, Warp)>,
    affine: Option<Warp>,
    steps: Vec<StepTransform>,
}

impl ChainBuilder {
    /// Builder for a run with `expected_steps` refinement steps.
    pub fn new(reference: Reference, expected_steps: usize) -> Self {
        Self {
            reference,
            expected_steps,
            straightening: None,
            affine: None,
            steps: Vec::new(),
        }
    }

    /// Record the straightening pair (template reference only).
    pub fn record_straightening(&mut self, curve2straight: Warp, straight2curve: Warp) -> Result<()> {
        if self.reference == Reference::Subject {
            return Err(RegistrationError::transform_chain(
                "straightening is not part of a subject-reference chain",
            ));
        }
        self.straightening = Some((curve2straight, straight2curve));
        Ok(())
    }

    /// Record the step-0 landmark affine.
    pub fn record_landmark_affine(&mut self, affine: Warp) -> Result<()> {
        if affine.kind() != WarpKind::Linear {
            return Err(RegistrationError::transform_chain(format!(
                "landmark transform {} must be linear",
                affine.path().display()
            )));
        }
        self.affine = Some(affine);
        Ok(())
    }

    /// Record the transform estimated by refinement step `index` (1-based).
    pub fn record_step(&mut self, index: usize, transform: StepTransform) -> Result<()> {
        let next = self.steps.len() + 1;
        if index != next {
            return Err(RegistrationError::transform_chain(format!(
                "step {index} recorded out of order; expected step {next}"
            )));
        }
        if index > self.expected_steps {
            return Err(RegistrationError::transform_chain(format!(
                "step {index} exceeds the {} planned refinement steps",
                self.expected_steps
            )));
        }
        self.steps.push(transform);
        Ok(())
    }

    /// Chain the next step's source is warped by.
    pub fn cumulative_forward(&self, scope: ChainScope) -> TransformChain {
        let mut chain = TransformChain::new();
        if scope == ChainScope::Full {
            if let Some(affine) = &self.affine {
                chain.push(WarpRef::forward(affine.clone()));
            }
        }
        for step in &self.steps {
            chain.push(WarpRef::forward(step.forward.clone()));
        }
        chain
    }

    /// Curve-to-straight followed by the landmark affine.
    pub fn straight_affine_prefix(&self) -> Result<TransformChain> {
        let (curve2straight, _) = self.require_straightening()?;
        let affine = self.require_affine()?;
        Ok(TransformChain::new()
            .then(WarpRef::forward(curve2straight.clone()))
            .then(WarpRef::forward(affine.clone())))
    }

    fn require_straightening(&self) -> Result<&(Warp, Warp)> {
        self.straightening
            .as_ref()
            .ok_or_else(|| RegistrationError::transform_chain("straightening warps were not produced"))
    }

    fn require_affine(&self) -> Result<&Warp> {
        self.affine
            .as_ref()
            .ok_or_else(|| RegistrationError::transform_chain("landmark affine was not produced"))
    }

    /// Compose the final chains.
    ///
    /// Every stage the reference mode requires must have been recorded;
    /// nothing is silently omitted.
    pub fn build(&self) -> Result<ComposedChains> {
        let affine = self.require_affine()?;
        if self.steps.len() != self.expected_steps {
            return Err(RegistrationError::transform_chain(format!(
                "{} of {} refinement steps were produced",
                self.steps.len(),
                self.expected_steps
            )));
        }
        let straightening = match self.reference {
            Reference::Template => Some(self.require_straightening()?),
            Reference::Subject => None,
        };

        let mut forward = TransformChain::new();
        if let Some((curve2straight, _)) = straightening {
            forward.push(WarpRef::forward(curve2straight.clone()));
        }
        forward.push(WarpRef::forward(affine.clone()));
        for step in &self.steps {
            forward.push(WarpRef::forward(step.forward.clone()));
        }

        let mut inverse = TransformChain::new();
        for step in self.steps.iter().rev() {
            inverse.push(step.inverse.clone());
        }
        inverse.push(WarpRef::inverted(affine.clone())?);
        if let Some((_, straight2curve)) = straightening {
            inverse.push(WarpRef::forward(straight2curve.clone()));
        }

        Ok(ComposedChains { forward, inverse })
    }
}
