//! Stage tracking for pipeline runs.
//!
//! Observers receive every stage transition; the logging observer reports
//! them through `tracing`, the history observer keeps them for inspection.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::Reference;

/// Coarse pipeline stages, in the order they may occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Validate,
    Convert,
    TemplateLabels,
    Binarize,
    Resample,
    Reorient,
    CropSegmentation,
    Straighten,
    PrepareLabels,
    StraightenLabels,
    SynthesizeLabels,
    EstimateAffine,
    ApplyAffine,
    CropToCord,
    Subsample,
    /// Refinement step `k` (1-based).
    RegisterStep(usize),
    Concatenate,
    ApplyFinal,
    Materialize,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PipelineStage::Validate => "Check inputs and template files",
            PipelineStage::Convert => "Copy input data to the workspace",
            PipelineStage::TemplateLabels => "Generate labels from template vertebral labeling",
            PipelineStage::Binarize => "Binarize segmentation",
            PipelineStage::Resample => "Resample data to isotropic voxels",
            PipelineStage::Reorient => "Change orientation of input images to RPI",
            PipelineStage::CropSegmentation => "Crop segmentation",
            PipelineStage::Straighten => "Straighten the spinal cord",
            PipelineStage::PrepareLabels => "Keep only labels present in both label sets",
            PipelineStage::StraightenLabels => "Apply straightening to labels",
            PipelineStage::SynthesizeLabels => "Add a synthetic landmark",
            PipelineStage::EstimateAffine => "Estimate transformation for step #0",
            PipelineStage::ApplyAffine => "Apply curve -> straight -> affine",
            PipelineStage::CropToCord => "Crop data in template space",
            PipelineStage::Subsample => "Sub-sample in z-direction",
            PipelineStage::RegisterStep(k) => return write!(f, "Estimate transformation for step #{k}"),
            PipelineStage::Concatenate => "Concatenate transformations",
            PipelineStage::ApplyFinal => "Apply warping fields to anat and template",
            PipelineStage::Materialize => "Generate output files",
        };
        f.write_str(text)
    }
}

/// Observer of pipeline progress.
pub trait PipelineObserver: Send + Sync {
    /// Called when a stage starts.
    fn on_stage(&self, stage: PipelineStage);

    /// Called when the run starts.
    fn on_start(&self, _reference: Reference) {
        // Default: no-op
    }

    /// Called when the run completes successfully.
    fn on_complete(&self, _elapsed: Duration) {
        // Default: no-op
    }

    /// Called when the run fails.
    fn on_error(&self, _error: &str) {
        // Default: no-op
    }
}

/// Observer that logs stage transitions to tracing.
#[derive(Debug, Clone, Default)]
pub struct LoggingObserver;

impl PipelineObserver for LoggingObserver {
    fn on_stage(&self, stage: PipelineStage) {
        tracing::info!("{}...", stage);
    }

    fn on_start(&self, reference: Reference) {
        tracing::info!("Registration started (reference: {})", reference);
    }

    fn on_complete(&self, elapsed: Duration) {
        tracing::info!("Finished! Elapsed time: {}s", elapsed.as_secs_f64().round());
    }

    fn on_error(&self, error: &str) {
        tracing::error!("Registration failed: {}", error);
    }
}

/// Observer that records every stage.
#[derive(Debug, Clone, Default)]
pub struct StageHistory {
    stages: Arc<Mutex<Vec<PipelineStage>>>,
}

impl StageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages seen so far, in order.
    pub fn get_history(&self) -> Vec<PipelineStage> {
        self.stages.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn contains(&self, stage: PipelineStage) -> bool {
        self.get_history().contains(&stage)
    }

    pub fn clear(&self) {
        if let Ok(mut stages) = self.stages.lock() {
            stages.clear();
        }
    }
}

impl PipelineObserver for StageHistory {
    fn on_stage(&self, stage: PipelineStage) {
        if let Ok(mut stages) = self.stages.lock() {
            stages.push(stage);
        }
    }
}

/// Fans stage events out to registered observers and measures run time.
#[derive(Clone)]
pub struct StageTracker {
    observers: Vec<Arc<dyn PipelineObserver>>,
    start_time: Arc<Mutex<Option<Instant>>>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self {
            observers: Vec::new(),
            start_time: Arc::new(Mutex::new(None)),
        }
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, observer: Arc<dyn PipelineObserver>) {
        self.observers.push(observer);
    }

    pub fn start(&self, reference: Reference) {
        if let Ok(mut start) = self.start_time.lock() {
            *start = Some(Instant::now());
        }
        for observer in &self.observers {
            observer.on_start(reference);
        }
    }

    pub fn stage(&self, stage: PipelineStage) {
        for observer in &self.observers {
            observer.on_stage(stage);
        }
    }

    /// Time since [`StageTracker::start`].
    pub fn elapsed(&self) -> Duration {
        self.start_time
            .lock()
            .ok()
            .and_then(|start| start.map(|s| s.elapsed()))
            .unwrap_or_default()
    }

    pub fn complete(&self) {
        let elapsed = self.elapsed();
        for observer in &self.observers {
            observer.on_complete(elapsed);
        }
    }

    pub fn error(&self, error: &str) {
        for observer in &self.observers {
            observer.on_error(error);
        }
    }
}
