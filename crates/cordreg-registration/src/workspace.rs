//! Temporary working directory of a run.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::info;

use crate::error::Result;

/// Directory holding every intermediate file of a run.
///
/// The directory is removed when the workspace is dropped unless it was
/// created with `keep` set, in which case it is left for inspection.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// Create a fresh directory under the system temporary location.
    pub fn create(keep: bool) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("cordreg_").tempdir()?;
        Ok(Self::from_tempdir(dir, keep))
    }

    /// Create a fresh directory under `parent`.
    pub fn create_in(parent: &Path, keep: bool) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("cordreg_").tempdir_in(parent)?;
        Ok(Self::from_tempdir(dir, keep))
    }

    fn from_tempdir(dir: TempDir, keep: bool) -> Self {
        if keep {
            let path = dir.keep();
            info!("Temporary files are kept in {}", path.display());
            Self { dir: None, path }
        } else {
            let path = dir.path().to_path_buf();
            Self { dir: Some(dir), path }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside the workspace.
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path.join(name)
    }

    /// Remove the directory now (no-op when kept).
    pub fn close(self) -> Result<()> {
        if let Some(dir) = self.dir {
            info!("Deleting temporary files");
            dir.close()?;
        }
        Ok(())
    }
}
