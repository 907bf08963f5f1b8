//! Template file discovery.
//!
//! A template directory holds a `template/` folder with an `info_label.txt`
//! index of `id, description, file` lines. Descriptions select the intensity
//! volume for a contrast, the vertebral labeling and the cord segmentation.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Contrast;
use crate::error::{RegistrationError, Result};

const INDEX_FILE: &str = "info_label.txt";
const VERTEBRAL_DESCRIPTION: &str = "vertebral";
const CORD_DESCRIPTION: &str = "spinal cord";

/// One line of the label index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub id: String,
    pub description: String,
    pub file: String,
}

/// Parse a label index, skipping blank lines and `#` comments.
pub fn parse_index(text: &str) -> Vec<IndexEntry> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut parts = line.splitn(3, ',').map(str::trim);
            let id = parts.next()?;
            let description = parts.next()?;
            let file = parts.next()?;
            Some(IndexEntry {
                id: id.to_string(),
                description: description.to_string(),
                file: file.to_string(),
            })
        })
        .collect()
}

/// File of the first entry whose description matches one of `needles`.
///
/// An exact (case-insensitive) description match wins over a substring one.
fn find_entry<'a>(entries: &'a [IndexEntry], needles: &[&str]) -> Option<&'a str> {
    let lowered: Vec<String> = needles.iter().map(|n| n.to_lowercase()).collect();
    let description = |e: &IndexEntry| e.description.to_lowercase();
    entries
        .iter()
        .find(|e| lowered.iter().any(|n| description(e) == *n))
        .or_else(|| entries.iter().find(|e| lowered.iter().any(|n| description(e).contains(n.as_str()))))
        .map(|e| e.file.as_str())
}

/// The three template volumes a run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFiles {
    pub intensity: PathBuf,
    pub vertebral_labeling: PathBuf,
    pub segmentation: PathBuf,
}

impl TemplateFiles {
    /// Locate the template volumes for `contrast` under `dir`.
    ///
    /// Falls back to the conventional PAM50 file names when the index is
    /// missing or has no matching entry. Every file must exist.
    pub fn discover(dir: &Path, contrast: Contrast) -> Result<Self> {
        let folder = dir.join("template");
        let entries = fs::read_to_string(folder.join(INDEX_FILE))
            .map(|text| parse_index(&text))
            .unwrap_or_default();
        if entries.is_empty() {
            debug!("No usable {} in {}; using default names", INDEX_FILE, folder.display());
        }

        let resolve = |needles: &[&str], fallback: String| {
            let file = find_entry(&entries, needles).map(str::to_string).unwrap_or(fallback);
            folder.join(file)
        };

        let files = Self {
            intensity: resolve(contrast.template_descriptions(), format!("PAM50_{}.nii.gz", contrast.as_str())),
            vertebral_labeling: resolve(&[VERTEBRAL_DESCRIPTION], "PAM50_levels.nii.gz".to_string()),
            segmentation: resolve(&[CORD_DESCRIPTION], "PAM50_cord.nii.gz".to_string()),
        };

        for path in [&files.intensity, &files.vertebral_labeling, &files.segmentation] {
            if !path.is_file() {
                return Err(RegistrationError::MissingTemplateFile(path.clone()));
            }
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = "# Template files\n\
        0, T1-weighted template, PAM50_t1.nii.gz\n\
        1, T2-weighted template, PAM50_t2.nii.gz\n\
        2, T2*-weighted template, PAM50_t2s.nii.gz\n\
        3, spinal cord, PAM50_cord.nii.gz\n\
        4, spinal cord gray matter, PAM50_gm.nii.gz\n\
        5, vertebral labeling, PAM50_levels.nii.gz\n";

    fn touch(dir: &Path, names: &[&str]) {
        fs::create_dir_all(dir.join("template")).unwrap();
        for name in names {
            fs::write(dir.join("template").join(name), b"").unwrap();
        }
    }

    #[test]
    fn test_parse_index() {
        let entries = parse_index(INDEX);
        assert_eq!(entries.len(), 6);
        assert_eq!(entries[2].description, "T2*-weighted template");
        assert_eq!(entries[5].file, "PAM50_levels.nii.gz");
    }

    #[test]
    fn test_discover_from_index() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["PAM50_t2s.nii.gz", "PAM50_cord.nii.gz", "PAM50_levels.nii.gz"]);
        fs::write(dir.path().join("template").join(INDEX_FILE), INDEX).unwrap();

        let files = TemplateFiles::discover(dir.path(), Contrast::T2s).unwrap();
        assert!(files.intensity.ends_with("PAM50_t2s.nii.gz"));
        assert!(files.segmentation.ends_with("PAM50_cord.nii.gz"));
        assert!(files.vertebral_labeling.ends_with("PAM50_levels.nii.gz"));
    }

    #[test]
    fn test_discover_without_index_uses_default_names() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["PAM50_t1.nii.gz", "PAM50_cord.nii.gz", "PAM50_levels.nii.gz"]);
        let files = TemplateFiles::discover(dir.path(), Contrast::T1).unwrap();
        assert!(files.intensity.ends_with("PAM50_t1.nii.gz"));
    }

    #[test]
    fn test_missing_template_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["PAM50_t2.nii.gz", "PAM50_levels.nii.gz"]);
        let err = TemplateFiles::discover(dir.path(), Contrast::T2).unwrap_err();
        match err {
            RegistrationError::MissingTemplateFile(path) => assert!(path.ends_with("PAM50_cord.nii.gz")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
