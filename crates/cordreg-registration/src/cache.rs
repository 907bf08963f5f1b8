//! Reuse of straightening results across runs.
//!
//! Straightening is the most expensive stage of a template-reference run and
//! depends only on the cropped segmentation and the straightening
//! parameters. A [`StraighteningCache`] is asked for previous results before
//! straightening and told about new ones afterwards. Every failure to reuse
//! simply falls back to straightening again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::CachePolicy;
use crate::error::{ArtifactContext, Result};

pub const CURVE2STRAIGHT: &str = "warp_curve2straight.nii.gz";
pub const STRAIGHT2CURVE: &str = "warp_straight2curve.nii.gz";
pub const STRAIGHT_REF: &str = "straight_ref.nii.gz";

/// The files produced by straightening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StraighteningArtifacts {
    pub curve2straight: PathBuf,
    pub straight2curve: PathBuf,
    /// Reference volume on the straight grid.
    pub straight_ref: PathBuf,
}

impl StraighteningArtifacts {
    /// The conventional file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            curve2straight: dir.join(CURVE2STRAIGHT),
            straight2curve: dir.join(STRAIGHT2CURVE),
            straight_ref: dir.join(STRAIGHT_REF),
        }
    }

    pub fn files(&self) -> [&Path; 3] {
        [&self.curve2straight, &self.straight2curve, &self.straight_ref]
    }

    pub fn all_exist(&self) -> bool {
        self.files().iter().all(|p| p.is_file())
    }

    /// Copy the three files into `dir` under their conventional names.
    pub fn copy_to(&self, dir: &Path) -> io::Result<StraighteningArtifacts> {
        let target = Self::in_dir(dir);
        for (from, to) in self.files().iter().zip(target.files()) {
            if *from != to {
                fs::copy(from, to)?;
            }
        }
        Ok(target)
    }
}

/// Fingerprint of a straightening input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// SHA-256 over the segmentation file and the straightening parameters.
    pub fn compute(segmentation: &Path, params: Option<&str>) -> Result<Self> {
        let bytes = fs::read(segmentation).for_artifact(segmentation)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hasher.update([0u8]);
        hasher.update(params.unwrap_or("").as_bytes());
        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Store of straightening results.
pub trait StraighteningCache {
    /// Previously stored results for `key`, if any are usable.
    fn lookup(&self, key: &CacheKey) -> Option<StraighteningArtifacts>;

    /// Remember `artifacts` under `key`.
    fn store(&self, key: &CacheKey, artifacts: &StraighteningArtifacts) -> Result<()>;
}

/// Never reuses anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl StraighteningCache for NoCache {
    fn lookup(&self, _key: &CacheKey) -> Option<StraighteningArtifacts> {
        None
    }

    fn store(&self, _key: &CacheKey, _artifacts: &StraighteningArtifacts) -> Result<()> {
        Ok(())
    }
}

/// Reuses whatever straightening files sit in a directory.
///
/// The key is ignored: files from an earlier run on different data or
/// parameters are reused as well. The directory is populated by publishing
/// the outputs of a successful run, so `store` does nothing.
#[derive(Debug, Clone)]
pub struct SiblingCache {
    dir: PathBuf,
}

impl SiblingCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl StraighteningCache for SiblingCache {
    fn lookup(&self, _key: &CacheKey) -> Option<StraighteningArtifacts> {
        let artifacts = StraighteningArtifacts::in_dir(&self.dir);
        artifacts.all_exist().then_some(artifacts)
    }

    fn store(&self, _key: &CacheKey, _artifacts: &StraighteningArtifacts) -> Result<()> {
        Ok(())
    }
}

/// Keeps results in one sub-directory per fingerprint.
#[derive(Debug, Clone)]
pub struct FingerprintCache {
    root: PathBuf,
}

impl FingerprintCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }
}

impl StraighteningCache for FingerprintCache {
    fn lookup(&self, key: &CacheKey) -> Option<StraighteningArtifacts> {
        let artifacts = StraighteningArtifacts::in_dir(&self.entry(key));
        if artifacts.all_exist() {
            debug!("Straightening cache hit for {}", key.as_str());
            Some(artifacts)
        } else {
            None
        }
    }

    fn store(&self, key: &CacheKey, artifacts: &StraighteningArtifacts) -> Result<()> {
        let entry = self.entry(key);
        fs::create_dir_all(&entry)?;
        artifacts.copy_to(&entry)?;
        Ok(())
    }
}

/// Build the cache selected by a policy.
pub fn cache_for(policy: &CachePolicy) -> Box<dyn StraighteningCache> {
    match policy {
        CachePolicy::Disabled => Box::new(NoCache),
        CachePolicy::Sibling(dir) => Box::new(SiblingCache::new(dir)),
        CachePolicy::Fingerprint(root) => Box::new(FingerprintCache::new(root)),
    }
}

/// Copy cached results into `workspace`, if the cache has usable ones.
pub fn restore(cache: &dyn StraighteningCache, key: &CacheKey, workspace: &Path) -> Option<StraighteningArtifacts> {
    let cached = cache.lookup(key)?;
    match cached.copy_to(workspace) {
        Ok(restored) => Some(restored),
        Err(e) => {
            warn!("Could not reuse cached straightening ({}); straightening again", e);
            None
        }
    }
}
