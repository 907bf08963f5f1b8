//! Subject-reference stages: the template is brought onto the subject,
//! which keeps its own grid and is never straightened.

use cordreg_core::label::{choose_sentinel, synthesize_offset_label};
use cordreg_io::{read_labels, write_labels};
use tracing::info;

use super::{landmark_dof, Inputs, ModeOutcome, Pipeline, StepPairs};
use crate::artifact::{Artifact, Stage};
use crate::chain::{ChainBuilder, ChainScope, Warp};
use crate::config::Reference;
use crate::error::{ArtifactContext, Result};
use crate::landmarks::register_landmarks;
use crate::plan::RegistrationPlan;
use crate::progress::PipelineStage;
use crate::workspace::Workspace;

const TEMPLATE2SUBJECT_AFFINE: &str = "template2subjectAffine.txt";

impl Pipeline<'_> {
    pub(super) fn run_subject_reference(
        &self,
        workspace: &Workspace,
        plan: &RegistrationPlan,
        inputs: &Inputs,
    ) -> Result<ModeOutcome> {
        let mut builder = ChainBuilder::new(Reference::Subject, plan.refinement_steps().len());

        self.stage(PipelineStage::Reorient);
        let data = self.reorient(&inputs.data)?;
        let segmentation = self.reorient(&inputs.segmentation)?;
        let labels = self.reorient(&inputs.labels)?;

        self.stage(PipelineStage::PrepareLabels);
        let template_labels = self.match_template_labels(&inputs.template_labels, &labels)?;

        self.stage(PipelineStage::SynthesizeLabels);
        let (subject_labels, template_labels) = self.synthesize_labels(&labels, &template_labels)?;

        self.stage(PipelineStage::EstimateAffine);
        let affine = workspace.join(TEMPLATE2SUBJECT_AFFINE);
        register_landmarks(template_labels.path(), subject_labels.path(), &landmark_dof(plan)?, &affine)?
            .into_result()?;
        builder.record_landmark_affine(Warp::new(&affine)?)?;

        let pairs = StepPairs {
            images: (inputs.template.clone(), data),
            segmentations: (inputs.template_segmentation.clone(), segmentation),
        };
        self.run_refinement_steps(workspace, plan, &pairs, &mut builder, ChainScope::Full)?;

        Ok(ModeOutcome {
            chains: builder.build()?,
            straightening: None,
        })
    }

    /// Add the same off-axis landmark to both label sets so that rotation
    /// about the cord becomes determined.
    fn synthesize_labels(&self, subject: &Artifact, template: &Artifact) -> Result<(Artifact, Artifact)> {
        let (subject_set, subject_geometry) = read_labels(subject.path()).for_artifact(subject.path())?;
        let (template_set, template_geometry) = read_labels(template.path()).for_artifact(template.path())?;
        let sentinel = choose_sentinel(&[&subject_set, &template_set], self.config.sentinel_value);
        info!("Synthetic landmark value: {}", sentinel);

        let offset = self.config.synthetic_offset_mm;
        let subject_synth = subject.advance(Stage::Synthesized);
        let labels = synthesize_offset_label(&subject_set, &subject_geometry, offset, sentinel)?;
        write_labels(subject_synth.path(), &labels, &subject_geometry).for_artifact(subject_synth.path())?;

        let template_synth = template.advance(Stage::Synthesized);
        let labels = synthesize_offset_label(&template_set, &template_geometry, offset, sentinel)?;
        write_labels(template_synth.path(), &labels, &template_geometry).for_artifact(template_synth.path())?;

        Ok((subject_synth, template_synth))
    }
}
