//! Pipeline controller.
//!
//! A run validates its inputs, copies them into a private workspace, runs
//! the stages of the selected reference mode, composes the final warp
//! chains and publishes the results. Each stage consumes files written by
//! earlier stages and writes new ones next to them.

mod subject_ref;
mod template_ref;

use std::fs;
use std::sync::Arc;

use cordreg_core::interpolation::InterpolationKind;
use cordreg_core::label::{check_correspondence, validate_landmark_pair, LabelSet};
use cordreg_core::Orientation;
use cordreg_io::{read_labels, write_labels};
use tracing::{debug, info};

use crate::artifact::{Artifact, Role, Stage};
use crate::cache::{cache_for, StraighteningArtifacts, StraighteningCache};
use crate::chain::{ChainBuilder, ChainScope, ComposedChains, TransformChain, Warp, WarpRef};
use crate::config::{PipelineConfig, Reference};
use crate::error::{ArtifactContext, RegistrationError, Result};
use crate::output::{materialize, PipelineOutputs, RunResults};
use crate::plan::{DegreesOfFreedom, RegistrationPlan, StepType};
use crate::progress::{LoggingObserver, PipelineObserver, PipelineStage, StageTracker};
use crate::template::TemplateFiles;
use crate::toolbox::Toolbox;
use crate::validation::validate_inputs;
use crate::workspace::Workspace;

const SEGMENTATION_THRESHOLD: f64 = 0.5;
const PLAN_FILE: &str = "registration_plan.json";

/// Workspace copies of the run inputs.
#[derive(Debug, Clone)]
struct Inputs {
    data: Artifact,
    /// Binarized subject segmentation.
    segmentation: Artifact,
    labels: Artifact,
    template: Artifact,
    template_segmentation: Artifact,
    /// One label per template vertebral level.
    template_labels: Artifact,
}

/// Sources and destinations of the refinement steps.
#[derive(Debug, Clone)]
struct StepPairs {
    images: (Artifact, Artifact),
    segmentations: (Artifact, Artifact),
}

/// What a reference mode hands over to the epilogue.
#[derive(Debug, Clone)]
struct ModeOutcome {
    chains: ComposedChains,
    straightening: Option<StraighteningArtifacts>,
}

/// One registration run.
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    toolbox: &'a dyn Toolbox,
    cache: Box<dyn StraighteningCache + 'a>,
    tracker: StageTracker,
}

impl<'a> Pipeline<'a> {
    /// Pipeline using the cache selected by the configuration and logging
    /// stage transitions.
    pub fn new(config: &'a PipelineConfig, toolbox: &'a dyn Toolbox) -> Self {
        let mut tracker = StageTracker::new();
        tracker.add_observer(Arc::new(LoggingObserver));
        Self {
            config,
            toolbox,
            cache: cache_for(&config.cache),
            tracker,
        }
    }

    /// Replace the straightening cache.
    pub fn with_cache(mut self, cache: Box<dyn StraighteningCache + 'a>) -> Self {
        self.cache = cache;
        self
    }

    /// Register an additional stage observer.
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.tracker.add_observer(observer);
        self
    }

    /// Run every stage and publish the results.
    ///
    /// The output directory is only written once all stages succeeded.
    pub fn run(&self) -> Result<PipelineOutputs> {
        self.tracker.start(self.config.reference);
        match self.execute() {
            Ok(outputs) => {
                self.tracker.complete();
                Ok(outputs)
            }
            Err(e) => {
                self.tracker.error(&e.to_string());
                Err(e)
            }
        }
    }

    fn stage(&self, stage: PipelineStage) {
        self.tracker.stage(stage);
    }

    fn execute(&self) -> Result<PipelineOutputs> {
        let config = self.config;

        self.stage(PipelineStage::Validate);
        let plan = RegistrationPlan::from_user(config.reference, config.overrides())?;
        let template = TemplateFiles::discover(&config.template_dir, config.contrast)?;
        validate_inputs(config)?;
        let (subject_labels, _) = read_labels(&config.labels).for_artifact(&config.labels)?;
        validate_landmark_pair(&subject_labels)?;
        for step in plan.steps() {
            debug!("{}", step.to_param_string(step.index));
        }

        let workspace = Workspace::create(config.keep_temporary)?;
        info!("Creating temporary folder ({})", workspace.path().display());
        let plan_json = serde_json::to_string_pretty(&plan)
            .map_err(|e| RegistrationError::artifact_io(workspace.join(PLAN_FILE), e))?;
        fs::write(workspace.join(PLAN_FILE), plan_json)?;

        let inputs = self.prepare_inputs(&workspace, &template, &subject_labels)?;
        let outcome = match config.reference {
            Reference::Template => self.run_template_reference(&workspace, &plan, &inputs)?,
            Reference::Subject => self.run_subject_reference(&workspace, &plan, &inputs)?,
        };
        let results = self.finish(&workspace, &inputs, outcome)?;

        self.stage(PipelineStage::Materialize);
        let outputs = materialize(&results, &config.output_dir, &config.anatomical_extension(), self.toolbox)?;
        workspace.close()?;
        Ok(outputs)
    }

    /// Copy inputs into the workspace, derive the template labels and
    /// binarize the segmentation.
    fn prepare_inputs(&self, workspace: &Workspace, template: &TemplateFiles, subject_labels: &LabelSet) -> Result<Inputs> {
        let config = self.config;

        self.stage(PipelineStage::Convert);
        let data = Artifact::new(Role::Anatomical, workspace.join("data.nii"));
        let segmentation = Artifact::new(Role::Segmentation, workspace.join("seg.nii.gz"));
        let labels = Artifact::new(Role::Labels, workspace.join("label.nii.gz"));
        let template_image = Artifact::new(Role::Template, workspace.join("template.nii"));
        let template_segmentation = Artifact::new(Role::TemplateSegmentation, workspace.join("template_seg.nii.gz"));
        for (source, copy) in [
            (&config.anatomical, &data),
            (&config.segmentation, &segmentation),
            (&config.labels, &labels),
            (&template.intensity, &template_image),
            (&template.segmentation, &template_segmentation),
        ] {
            self.toolbox.convert(source, copy.path())?;
        }

        self.stage(PipelineStage::TemplateLabels);
        let template_labels = Artifact::new(Role::TemplateLabels, workspace.join("template_label.nii.gz"));
        self.toolbox
            .vertebral_body_labels(&template.vertebral_labeling, template_labels.path())?;
        let (template_set, _) = read_labels(template_labels.path()).for_artifact(template_labels.path())?;
        check_correspondence(subject_labels, &template_set)?;

        self.stage(PipelineStage::Binarize);
        let segmentation_bin = segmentation.advance(Stage::Binarized);
        self.toolbox
            .binarize(segmentation.path(), segmentation_bin.path(), SEGMENTATION_THRESHOLD)?;

        Ok(Inputs {
            data,
            segmentation: segmentation_bin,
            labels,
            template: template_image,
            template_segmentation,
            template_labels,
        })
    }

    /// Reorient a volume to RPI.
    fn reorient(&self, input: &Artifact) -> Result<Artifact> {
        let output = input.advance(Stage::Reoriented);
        self.toolbox.set_orientation(input.path(), output.path(), Orientation::RPI)?;
        Ok(output)
    }

    /// Keep only the template labels whose value the subject also has.
    fn match_template_labels(&self, template_labels: &Artifact, subject_labels: &Artifact) -> Result<Artifact> {
        let (template, geometry) = read_labels(template_labels.path()).for_artifact(template_labels.path())?;
        let (subject, _) = read_labels(subject_labels.path()).for_artifact(subject_labels.path())?;
        let matched = template.retain_matching(&subject);
        debug!("{} of {} template labels kept", matched.len(), template.len());

        let output = template_labels.advance(Stage::Matched);
        write_labels(output.path(), &matched, &geometry).for_artifact(output.path())?;
        Ok(output)
    }

    /// Run steps 1..N, recording each estimated transform.
    ///
    /// Once a prefix is available for `scope`, the step source is first
    /// warped onto its destination through it.
    fn run_refinement_steps(
        &self,
        workspace: &Workspace,
        plan: &RegistrationPlan,
        pairs: &StepPairs,
        builder: &mut ChainBuilder,
        scope: ChainScope,
    ) -> Result<()> {
        for step in plan.refinement_steps() {
            let k = step.index;
            self.stage(PipelineStage::RegisterStep(k));
            let ((source, destination), interpolation) = match step.step_type {
                StepType::Image => (&pairs.images, InterpolationKind::Linear),
                StepType::Segmentation => (&pairs.segmentations, InterpolationKind::NearestNeighbor),
                StepType::Label => {
                    return Err(RegistrationError::invalid_step_type(format!(
                        "step {k} has type label; refinement steps use im or seg"
                    )))
                }
            };

            let prefix = builder.cumulative_forward(scope);
            let moving = if prefix.is_empty() {
                source.clone()
            } else {
                let warped = source.advance(Stage::RegStep(k - 1));
                self.toolbox
                    .apply(source.path(), warped.path(), destination.path(), &prefix, interpolation)?;
                warped
            };

            debug!("Step {}: registering {} onto {}", k, moving, destination);
            let transform = self.toolbox.register(moving.path(), destination.path(), step, workspace.path())?;
            debug!("Step {} produced {}", k, transform.forward.path().display());
            builder.record_step(k, transform)?;
        }
        Ok(())
    }

    /// Concatenate the final chains and warp the anatomical image and the
    /// template through them.
    fn finish(&self, workspace: &Workspace, inputs: &Inputs, outcome: ModeOutcome) -> Result<RunResults> {
        let results = RunResults::in_workspace(workspace.path(), outcome.straightening);
        let (to_template, to_anat) = match self.config.reference {
            Reference::Template => (&outcome.chains.forward, &outcome.chains.inverse),
            Reference::Subject => (&outcome.chains.inverse, &outcome.chains.forward),
        };

        self.stage(PipelineStage::Concatenate);
        info!("Concatenating: {}", to_template);
        self.toolbox
            .concatenate(to_template, inputs.template.path(), &results.warp_anat2template)?;
        info!("Concatenating: {}", to_anat);
        self.toolbox
            .concatenate(to_anat, inputs.data.path(), &results.warp_template2anat)?;

        self.stage(PipelineStage::ApplyFinal);
        let warp_template2anat = single_warp(&results.warp_template2anat)?;
        self.toolbox.apply(
            inputs.template.path(),
            &results.template2anat,
            inputs.data.path(),
            &warp_template2anat,
            InterpolationKind::Linear,
        )?;
        let warp_anat2template = single_warp(&results.warp_anat2template)?;
        self.toolbox.apply(
            inputs.data.path(),
            &results.anat2template,
            inputs.template.path(),
            &warp_anat2template,
            InterpolationKind::Linear,
        )?;

        Ok(results)
    }
}

/// Degrees of freedom of the step-0 landmark alignment.
fn landmark_dof(plan: &RegistrationPlan) -> Result<DegreesOfFreedom> {
    plan.landmark_step()
        .ok_or_else(|| RegistrationError::invalid_step_type("plan has no landmark step"))?
        .dof()
}

fn single_warp(path: &std::path::Path) -> Result<TransformChain> {
    Ok(TransformChain::new().then(WarpRef::forward(Warp::new(path)?)))
}
