//! Landmark label volumes.
//!
//! A label file is an ordinary NIfTI volume where each non-zero voxel is a
//! landmark whose value is its label.

use anyhow::Result;
use cordreg_core::image::statistics::nonzero_extent;
use cordreg_core::image::ImageGeometry;
use cordreg_core::label::LabelSet;
use std::path::Path;

use crate::nifti_io::{read_volume, write_volume};

/// Read the landmarks of a label volume together with its grid.
pub fn read_labels<P: AsRef<Path>>(path: P) -> Result<(LabelSet, ImageGeometry)> {
    let (values, geometry) = read_volume(path)?;
    let labels = LabelSet::from_volume(&values, &geometry);
    Ok((labels, geometry))
}

/// Paint `labels` into an otherwise empty volume on `geometry`.
pub fn write_labels<P: AsRef<Path>>(path: P, labels: &LabelSet, geometry: &ImageGeometry) -> Result<()> {
    write_volume(path, &labels.paint(geometry), geometry)
}

/// First and last index along `axis` covered by non-zero voxels of a mask.
///
/// Returns `None` for an empty mask.
pub fn mask_extent<P: AsRef<Path>>(path: P, axis: usize) -> Result<Option<(usize, usize)>> {
    let (values, geometry) = read_volume(path)?;
    Ok(nonzero_extent(&values, &geometry, axis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cordreg_core::label::Landmark;
    use tempfile::tempdir;

    #[test]
    fn test_labels_survive_write_and_read() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("labels.nii.gz");
        let geometry = ImageGeometry::with_shape([6, 5, 9]);
        let labels = LabelSet::new(vec![Landmark::new([2, 1, 7], 3.0), Landmark::new([4, 4, 0], 5.0)]);

        write_labels(&path, &labels, &geometry)?;
        let (read_back, read_geometry) = read_labels(&path)?;

        assert!(read_geometry.same_space(&geometry, 1e-6));
        assert_eq!(read_back.sorted_by_value(), labels.sorted_by_value());
        Ok(())
    }

    #[test]
    fn test_mask_extent_along_z() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("mask.nii");
        let geometry = ImageGeometry::with_shape([3, 3, 10]);
        let mut values = vec![0.0f32; geometry.voxel_count()];
        for z in 2..=6 {
            values[geometry.linear_index([1, 1, z])] = 1.0;
        }
        write_volume(&path, &values, &geometry)?;

        assert_eq!(mask_extent(&path, 2)?, Some((2, 6)));
        assert_eq!(mask_extent(&path, 0)?, Some((1, 1)));
        Ok(())
    }

    #[test]
    fn test_mask_extent_of_empty_mask() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.nii");
        let geometry = ImageGeometry::with_shape([2, 2, 2]);
        write_volume(&path, &[0.0; 8], &geometry)?;
        assert_eq!(mask_extent(&path, 2)?, None);
        Ok(())
    }
}
