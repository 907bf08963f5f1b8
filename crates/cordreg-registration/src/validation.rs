//! Input checks run before any processing.

use std::path::Path;

use cordreg_core::image::DEFAULT_SPACE_TOLERANCE;
use cordreg_io::read_geometry;

use crate::config::PipelineConfig;
use crate::error::{ArtifactContext, RegistrationError, Result};

/// Fail unless `path` is an existing file.
pub fn check_file_exists(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(RegistrationError::artifact_io(path, "file does not exist"))
    }
}

/// Fail unless both volumes share the same voxel grid.
pub fn check_same_space(first: &Path, second: &Path) -> Result<()> {
    let a = read_geometry(first).for_artifact(first)?;
    let b = read_geometry(second).for_artifact(second)?;
    if a.same_space(&b, DEFAULT_SPACE_TOLERANCE) {
        Ok(())
    } else {
        Err(RegistrationError::space_mismatch(first, second))
    }
}

/// Existence and co-registration of the subject inputs.
pub fn validate_inputs(config: &PipelineConfig) -> Result<()> {
    for path in [&config.anatomical, &config.segmentation, &config.labels] {
        check_file_exists(path)?;
    }
    check_same_space(&config.anatomical, &config.segmentation)?;
    check_same_space(&config.anatomical, &config.labels)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cordreg_core::geometry::{Point3, Spacing3};
    use cordreg_core::image::ImageGeometry;
    use cordreg_io::write_volume;

    fn write(path: &Path, geometry: &ImageGeometry) {
        write_volume(path, &vec![0.0; geometry.voxel_count()], geometry).unwrap();
    }

    #[test]
    fn test_same_space() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.nii");
        let b = dir.path().join("b.nii.gz");
        let c = dir.path().join("c.nii");
        let geometry = ImageGeometry::with_shape([4, 4, 4]);
        write(&a, &geometry);
        write(&b, &geometry);
        write(
            &c,
            &ImageGeometry::new(
                [4, 4, 4],
                Point3::new(1.0, 0.0, 0.0),
                Spacing3::new(1.0, 1.0, 1.0),
                *geometry.direction(),
            ),
        );

        assert!(check_same_space(&a, &b).is_ok());
        assert!(matches!(
            check_same_space(&a, &c),
            Err(RegistrationError::SpaceMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_file_exists(&dir.path().join("absent.nii")).unwrap_err();
        assert!(matches!(err, RegistrationError::ArtifactIo { .. }));
    }
}
