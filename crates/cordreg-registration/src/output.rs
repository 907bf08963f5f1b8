//! Publication of the final results.
//!
//! Results are produced inside the workspace and only copied to the output
//! directory once every stage has succeeded, so a failed run leaves the
//! output directory untouched.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::cache::StraighteningArtifacts;
use crate::error::{ArtifactContext, Result};
use crate::toolbox::ImageOps;

pub const WARP_TEMPLATE2ANAT: &str = "warp_template2anat.nii.gz";
pub const WARP_ANAT2TEMPLATE: &str = "warp_anat2template.nii.gz";
pub const TEMPLATE2ANAT: &str = "template2anat";
pub const ANAT2TEMPLATE: &str = "anat2template";

const WORKSPACE_EXTENSION: &str = ".nii.gz";

/// Final files of a run inside the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResults {
    pub warp_template2anat: PathBuf,
    pub warp_anat2template: PathBuf,
    pub template2anat: PathBuf,
    pub anat2template: PathBuf,
    /// Only present for template-reference runs.
    pub straightening: Option<StraighteningArtifacts>,
}

impl RunResults {
    /// Conventional result names inside `workspace`.
    pub fn in_workspace(workspace: &Path, straightening: Option<StraighteningArtifacts>) -> Self {
        Self {
            warp_template2anat: workspace.join(WARP_TEMPLATE2ANAT),
            warp_anat2template: workspace.join(WARP_ANAT2TEMPLATE),
            template2anat: workspace.join(format!("{TEMPLATE2ANAT}{WORKSPACE_EXTENSION}")),
            anat2template: workspace.join(format!("{ANAT2TEMPLATE}{WORKSPACE_EXTENSION}")),
            straightening,
        }
    }
}

/// Files published to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutputs {
    pub warp_template2anat: PathBuf,
    pub warp_anat2template: PathBuf,
    pub template2anat: PathBuf,
    pub anat2template: PathBuf,
    pub straightening: Option<StraighteningArtifacts>,
}

impl PipelineOutputs {
    /// Every published file.
    pub fn files(&self) -> Vec<&Path> {
        let mut files: Vec<&Path> = vec![
            &self.warp_template2anat,
            &self.warp_anat2template,
            &self.template2anat,
            &self.anat2template,
        ];
        if let Some(straightening) = &self.straightening {
            files.extend(straightening.files());
        }
        files
    }
}

/// Files copied into the output directory so far.
///
/// Unless committed, every published file is removed again on drop so that
/// a failure part-way through publication leaves no partial result behind.
struct Publication {
    published: Vec<PathBuf>,
    committed: bool,
}

impl Publication {
    fn new() -> Self {
        Self {
            published: Vec::new(),
            committed: false,
        }
    }

    fn copy(&mut self, from: &Path, to: &Path) -> Result<()> {
        fs::copy(from, to).for_artifact(to)?;
        self.created(to);
        Ok(())
    }

    fn convert<T: ImageOps + ?Sized>(&mut self, toolbox: &T, from: &Path, to: &Path) -> Result<()> {
        let converted = toolbox.convert(from, to);
        if to.exists() {
            self.published.push(to.to_path_buf());
        }
        converted?;
        info!("File created: {}", to.display());
        Ok(())
    }

    fn created(&mut self, path: &Path) {
        info!("File created: {}", path.display());
        self.published.push(path.to_path_buf());
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Publication {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for path in self.published.drain(..) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Could not remove partial output {}: {}", path.display(), e);
            }
        }
    }
}

/// Copy `results` into `output_dir`.
///
/// The two resampled volumes take the extension of the input anatomical
/// image (`extension`), going through `toolbox` when the format differs.
/// Either every file is published or none is.
pub fn materialize<T: ImageOps + ?Sized>(
    results: &RunResults,
    output_dir: &Path,
    extension: &str,
    toolbox: &T,
) -> Result<PipelineOutputs> {
    fs::create_dir_all(output_dir).for_artifact(output_dir)?;
    let mut publication = Publication::new();

    let warp_template2anat = output_dir.join(WARP_TEMPLATE2ANAT);
    let warp_anat2template = output_dir.join(WARP_ANAT2TEMPLATE);
    publication.copy(&results.warp_template2anat, &warp_template2anat)?;
    publication.copy(&results.warp_anat2template, &warp_anat2template)?;

    let template2anat = output_dir.join(format!("{TEMPLATE2ANAT}{extension}"));
    let anat2template = output_dir.join(format!("{ANAT2TEMPLATE}{extension}"));
    for (from, to) in [
        (&results.template2anat, &template2anat),
        (&results.anat2template, &anat2template),
    ] {
        if extension == WORKSPACE_EXTENSION {
            publication.copy(from, to)?;
        } else {
            publication.convert(toolbox, from, to)?;
        }
    }

    let straightening = match &results.straightening {
        Some(artifacts) => {
            let target = StraighteningArtifacts::in_dir(output_dir);
            for (from, to) in artifacts.files().into_iter().zip(target.files()) {
                if from != to {
                    publication.copy(from, to)?;
                }
            }
            Some(target)
        }
        None => None,
    };

    publication.commit();
    Ok(PipelineOutputs {
        warp_template2anat,
        warp_anat2template,
        template2anat,
        anat2template,
        straightening,
    })
}
