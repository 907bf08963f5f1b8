//! Template-reference stages: the subject cord is straightened and brought
//! onto the template.

use std::path::Path;

use cordreg_core::interpolation::InterpolationKind;
use cordreg_core::label::resample_landmarks;
use cordreg_io::{mask_extent, read_geometry, read_labels, write_labels};
use tracing::{info, warn};

use super::{landmark_dof, single_warp, Inputs, ModeOutcome, Pipeline, StepPairs, SEGMENTATION_THRESHOLD};
use crate::artifact::{Artifact, Stage};
use crate::cache::{self, CacheKey, StraighteningArtifacts};
use crate::chain::{ChainBuilder, ChainScope, Warp};
use crate::config::Reference;
use crate::error::{ArtifactContext, RegistrationError, Result};
use crate::landmarks::register_landmarks;
use crate::plan::RegistrationPlan;
use crate::progress::PipelineStage;
use crate::workspace::Workspace;

const AXIAL: usize = 2;
const STRAIGHT2TEMPLATE_AFFINE: &str = "straight2templateAffine.txt";
const CURVE2TEMPLATE_AFFINE: &str = "warp_curve2straightAffine.nii.gz";

/// First and last axial slice holding a non-zero voxel of `mask`.
fn axial_extent(mask: &Path) -> Result<(usize, usize)> {
    mask_extent(mask, AXIAL)
        .for_artifact(mask)?
        .ok_or_else(|| RegistrationError::artifact_io(mask, "segmentation is empty"))
}

impl Pipeline<'_> {
    pub(super) fn run_template_reference(
        &self,
        workspace: &Workspace,
        plan: &RegistrationPlan,
        inputs: &Inputs,
    ) -> Result<ModeOutcome> {
        let config = self.config;
        let toolbox = self.toolbox;
        let mut builder = ChainBuilder::new(Reference::Template, plan.refinement_steps().len());

        self.stage(PipelineStage::Resample);
        let isotropic = [config.isotropic_mm; 3];
        let data = inputs.data.advance(Stage::Resampled);
        toolbox.resample_mm(inputs.data.path(), data.path(), isotropic, InterpolationKind::Linear)?;
        let segmentation = inputs.segmentation.advance(Stage::Resampled);
        toolbox.resample_mm(
            inputs.segmentation.path(),
            segmentation.path(),
            isotropic,
            InterpolationKind::Linear,
        )?;
        let labels = self.resample_labels(&inputs.labels, &data)?;

        self.stage(PipelineStage::Reorient);
        let data = self.reorient(&data)?;
        let segmentation = self.reorient(&segmentation)?;
        let labels = self.reorient(&labels)?;

        self.stage(PipelineStage::CropSegmentation);
        let segmentation = self.crop_axial(&segmentation, axial_extent(segmentation.path())?)?;

        self.stage(PipelineStage::Straighten);
        let segmentation_straight = segmentation.advance(Stage::Straightened);
        let straightening = self.straighten(workspace, &segmentation, &segmentation_straight)?;
        let curve2straight = single_warp(&straightening.curve2straight)?;
        // The straight-to-curve field is redefined on the grid of the data.
        toolbox.concatenate(
            &single_warp(&straightening.straight2curve)?,
            data.path(),
            &straightening.straight2curve,
        )?;
        builder.record_straightening(
            Warp::new(&straightening.curve2straight)?,
            Warp::new(&straightening.straight2curve)?,
        )?;

        self.stage(PipelineStage::PrepareLabels);
        let template_labels = self.match_template_labels(&inputs.template_labels, &labels)?;
        let labels_dilated = labels.advance(Stage::Dilated);
        toolbox.dilate(labels.path(), labels_dilated.path(), config.label_dilation)?;

        self.stage(PipelineStage::StraightenLabels);
        let labels_straight = labels_dilated.advance(Stage::Straightened);
        toolbox.apply(
            labels_dilated.path(),
            labels_straight.path(),
            segmentation_straight.path(),
            &curve2straight,
            InterpolationKind::NearestNeighbor,
        )?;

        self.stage(PipelineStage::EstimateAffine);
        let affine = workspace.join(STRAIGHT2TEMPLATE_AFFINE);
        register_landmarks(labels_straight.path(), template_labels.path(), &landmark_dof(plan)?, &affine)?
            .into_result()?;
        builder.record_landmark_affine(Warp::new(&affine)?)?;

        self.stage(PipelineStage::ApplyAffine);
        let curve2template = workspace.join(CURVE2TEMPLATE_AFFINE);
        toolbox.concatenate(&builder.straight_affine_prefix()?, inputs.template.path(), &curve2template)?;
        let curve2template = single_warp(&curve2template)?;
        let data_affine = data.advance(Stage::StraightAffine);
        toolbox.apply(
            data.path(),
            data_affine.path(),
            inputs.template.path(),
            &curve2template,
            InterpolationKind::Linear,
        )?;
        let segmentation_affine = segmentation.advance(Stage::StraightAffine);
        toolbox.apply(
            segmentation.path(),
            segmentation_affine.path(),
            inputs.template.path(),
            &curve2template,
            InterpolationKind::Linear,
        )?;
        let segmentation_affine_bin = segmentation_affine.advance(Stage::Binarized);
        toolbox.binarize(
            segmentation_affine.path(),
            segmentation_affine_bin.path(),
            SEGMENTATION_THRESHOLD,
        )?;

        self.stage(PipelineStage::CropToCord);
        let extent = axial_extent(segmentation_affine_bin.path())?;
        info!("Cord spans template slices {} to {}", extent.0, extent.1);
        let template = self.crop_axial(&inputs.template, extent)?;
        let template_segmentation = self.crop_axial(&inputs.template_segmentation, extent)?;
        let data = self.crop_axial(&data_affine, extent)?;
        let segmentation = self.crop_axial(&segmentation_affine_bin, extent)?;

        self.stage(PipelineStage::Subsample);
        let template = self.subsample(&template)?;
        let template_segmentation = self.subsample(&template_segmentation)?;
        let data = self.subsample(&data)?;
        let segmentation = self.subsample(&segmentation)?;

        let pairs = StepPairs {
            images: (data, template),
            segmentations: (segmentation, template_segmentation),
        };
        self.run_refinement_steps(workspace, plan, &pairs, &mut builder, ChainScope::StepsOnly)?;

        Ok(ModeOutcome {
            chains: builder.build()?,
            straightening: Some(straightening),
        })
    }

    /// Move single-voxel labels onto the grid of `reference` by rescaling
    /// their indices.
    fn resample_labels(&self, labels: &Artifact, reference: &Artifact) -> Result<Artifact> {
        let (set, geometry) = read_labels(labels.path()).for_artifact(labels.path())?;
        let target = read_geometry(reference.path()).for_artifact(reference.path())?;
        let resampled = resample_landmarks(&set, geometry.shape(), target.shape());
        let output = labels.advance(Stage::Resampled);
        write_labels(output.path(), &resampled, &target).for_artifact(output.path())?;
        Ok(output)
    }

    fn crop_axial(&self, input: &Artifact, (start, end): (usize, usize)) -> Result<Artifact> {
        let output = input.advance(Stage::Cropped);
        self.toolbox.crop(input.path(), output.path(), AXIAL, start, end)?;
        Ok(output)
    }

    fn subsample(&self, input: &Artifact) -> Result<Artifact> {
        let output = input.advance(Stage::Subsampled);
        self.toolbox
            .resample_factor(input.path(), output.path(), [1.0, 1.0, self.config.z_subsample])?;
        Ok(output)
    }

    /// Straighten `segmentation` into `output`, reusing cached results when
    /// the cache has them.
    fn straighten(
        &self,
        workspace: &Workspace,
        segmentation: &Artifact,
        output: &Artifact,
    ) -> Result<StraighteningArtifacts> {
        let params = self.config.straighten_params.as_deref();
        let key = CacheKey::compute(segmentation.path(), params)?;

        if let Some(artifacts) = cache::restore(self.cache.as_ref(), &key, workspace.path()) {
            warn!("Straightening results from a previous run are reused");
            self.toolbox.apply(
                segmentation.path(),
                output.path(),
                &artifacts.straight_ref,
                &single_warp(&artifacts.curve2straight)?,
                InterpolationKind::Linear,
            )?;
            return Ok(artifacts);
        }

        let artifacts = self.toolbox.straighten(
            segmentation.path(),
            output.path(),
            workspace.path(),
            params,
            self.config.verbosity,
        )?;
        if let Err(e) = self.cache.store(&key, &artifacts) {
            warn!("Could not store straightening results: {}", e);
        }
        Ok(artifacts)
    }
}
