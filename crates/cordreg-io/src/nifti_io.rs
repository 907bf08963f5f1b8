use anyhow::{anyhow, Context, Result};
use burn::tensor::backend::Backend;
use cordreg_core::geometry::Affine4;
use cordreg_core::image::{Image, ImageGeometry};
use nalgebra::Matrix4;
use ndarray::{Array3, ArrayD, IxDyn};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;

/// NIfTI `xyzt_units` value for millimetres.
const UNITS_MM: u8 = 2;

/// Voxel-to-world matrix stored in a NIfTI header.
///
/// Prefers the sform, then the qform, and finally falls back to a plain
/// `pixdim` scaling.
pub fn header_affine(header: &NiftiHeader) -> Affine4 {
    let affine: [[f32; 4]; 4] = if header.sform_code > 0 {
        [
            header.srow_x,
            header.srow_y,
            header.srow_z,
            [0.0, 0.0, 0.0, 1.0],
        ]
    } else if header.qform_code > 0 {
        let b = header.quatern_b;
        let c = header.quatern_c;
        let d = header.quatern_d;
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();

        let qfac = if header.pixdim[0] == 0.0 { 1.0 } else { header.pixdim[0] };

        let r11 = a * a + b * b - c * c - d * d;
        let r12 = 2.0 * b * c - 2.0 * a * d;
        let r13 = 2.0 * b * d + 2.0 * a * c;

        let r21 = 2.0 * b * c + 2.0 * a * d;
        let r22 = a * a + c * c - b * b - d * d;
        let r23 = 2.0 * c * d - 2.0 * a * b;

        let r31 = 2.0 * b * d - 2.0 * a * c;
        let r32 = 2.0 * c * d + 2.0 * a * b;
        let r33 = a * a + d * d - c * c - b * b;

        let dx = header.pixdim[1];
        let dy = header.pixdim[2];
        let dz = header.pixdim[3] * qfac;

        [
            [r11 * dx, r12 * dy, r13 * dz, header.quatern_x],
            [r21 * dx, r22 * dy, r23 * dz, header.quatern_y],
            [r31 * dx, r32 * dy, r33 * dz, header.quatern_z],
            [0.0, 0.0, 0.0, 1.0],
        ]
    } else {
        let spacing = [1, 2, 3].map(|i| if header.pixdim[i] > 0.0 { header.pixdim[i] } else { 1.0 });
        [
            [spacing[0], 0.0, 0.0, 0.0],
            [0.0, spacing[1], 0.0, 0.0],
            [0.0, 0.0, spacing[2], 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    };

    Matrix4::from_fn(|r, c| affine[r][c] as f64)
}

/// Header describing `geometry` through its sform.
///
/// Dimensions and datatype are filled in by the writer from the array.
pub fn header_from_geometry(geometry: &ImageGeometry) -> NiftiHeader {
    let affine = geometry.affine();
    let row = |r: usize| [0, 1, 2, 3].map(|c| affine[(r, c)] as f32);
    let spacing = geometry.spacing();

    let mut header = NiftiHeader::default();
    header.sform_code = 1;
    header.qform_code = 0;
    header.srow_x = row(0);
    header.srow_y = row(1);
    header.srow_z = row(2);
    header.pixdim = [
        1.0,
        spacing[0] as f32,
        spacing[1] as f32,
        spacing[2] as f32,
        1.0,
        1.0,
        1.0,
        1.0,
    ];
    header.xyzt_units = UNITS_MM;
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;
    header
}

/// Read a volume as values in `[Z, Y, X]` order plus its grid.
///
/// Volumes with trailing singleton dimensions are accepted; anything with
/// more than one 3D frame is rejected.
pub fn read_volume<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, ImageGeometry)> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let affine = header_affine(obj.header());

    let array: ArrayD<f32> = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;

    let dims = array.shape().to_vec();
    if dims.len() < 3 || dims[3..].iter().any(|&d| d != 1) {
        anyhow::bail!(
            "Expected a 3D NIfTI volume in {}, found dimensions {:?}",
            path.display(),
            dims
        );
    }
    let shape = [dims[0], dims[1], dims[2]];
    let geometry = ImageGeometry::from_affine(shape, &affine);

    let mut index = vec![0usize; dims.len()];
    let mut values = Vec::with_capacity(geometry.voxel_count());
    for z in 0..shape[2] {
        for y in 0..shape[1] {
            for x in 0..shape[0] {
                index[0] = x;
                index[1] = y;
                index[2] = z;
                values.push(array[IxDyn(&index)]);
            }
        }
    }

    Ok((values, geometry))
}

/// Read only the grid of a volume.
pub fn read_geometry<P: AsRef<Path>>(path: P) -> Result<ImageGeometry> {
    read_volume(path).map(|(_, geometry)| geometry)
}

/// Write `[Z, Y, X]` ordered values on `geometry`.
///
/// The output is gzip-compressed when the path ends in `.gz`.
pub fn write_volume<P: AsRef<Path>>(path: P, values: &[f32], geometry: &ImageGeometry) -> Result<()> {
    let path = path.as_ref();
    if values.len() != geometry.voxel_count() {
        anyhow::bail!(
            "Volume has {} values but grid {:?} needs {}",
            values.len(),
            geometry.shape(),
            geometry.voxel_count()
        );
    }

    let [nx, ny, nz] = geometry.shape();
    let array = Array3::from_shape_fn((nx, ny, nz), |(x, y, z)| values[geometry.linear_index([x, y, z])]);

    let header = header_from_geometry(geometry);
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .map_err(|e| anyhow!("Failed to write NIfTI file {}: {}", path.display(), e))?;

    Ok(())
}

pub fn read_nifti<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Image<B>> {
    let (values, geometry) = read_volume(path)?;
    Ok(Image::from_vec(values, geometry, device))
}

/// Write an image to a NIfTI file.
///
/// # Arguments
/// * `path` - Path to write the NIfTI file
/// * `image` - The image to write
pub fn write_nifti<B: Backend, P: AsRef<Path>>(path: P, image: &Image<B>) -> Result<()> {
    write_volume(path, &image.to_vec(), image.geometry())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use cordreg_core::geometry::{Point3, Spacing3};
    use cordreg_core::spatial::Orientation;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_read_nifti_basic() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.nii");

        // X=3, Y=4, Z=5, value = linear index in x-fastest order.
        let array = Array3::from_shape_fn((3, 4, 5), |(x, y, z)| (x + 3 * (y + 4 * z)) as f32);
        WriterOptions::new(&file_path).write_nifti(&array)?;

        let device = Default::default();
        let image = read_nifti::<TestBackend, _>(&file_path, &device)?;

        assert_eq!(image.shape(), [3, 4, 5]);
        assert_eq!(image.data().dims(), [5, 4, 3]);

        let values = image.to_vec();
        assert_eq!(values.len(), 60);
        for (i, v) in values.iter().enumerate() {
            assert_eq!(*v, i as f32);
        }
        Ok(())
    }

    #[test]
    fn test_write_then_read_keeps_geometry() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("oriented.nii.gz");

        let geometry = ImageGeometry::new(
            [4, 3, 6],
            Point3::new(12.5, -30.0, 7.0),
            Spacing3::new(0.5, 0.8, 2.0),
            "RPI".parse::<Orientation>()?.direction(),
        );
        let values: Vec<f32> = (0..geometry.voxel_count()).map(|v| (v % 7) as f32).collect();
        write_volume(&file_path, &values, &geometry)?;

        let (read_back, read_geometry) = read_volume(&file_path)?;
        assert_eq!(read_back, values);
        assert!(read_geometry.same_space(&geometry, 1e-4));
        assert_eq!(Orientation::of(&read_geometry), Orientation::RPI);
        Ok(())
    }

    #[test]
    fn test_write_rejects_mismatched_length() {
        let dir = tempdir().unwrap();
        let geometry = ImageGeometry::with_shape([2, 2, 2]);
        let err = write_volume(dir.path().join("bad.nii"), &[0.0; 3], &geometry).unwrap_err();
        assert!(err.to_string().contains("needs 8"));
    }
}
