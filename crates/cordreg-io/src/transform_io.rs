//! Transform files in the formats ITK and ANTs exchange.
//!
//! Two kinds of transform are stored on disk:
//!
//! * linear transforms as ITK text files (`.txt`);
//! * dense warps as NIfTI displacement fields (`.nii`, `.nii.gz`).
//!
//! Both are stored in ITK's LPS world frame, while images in memory use the
//! NIfTI RAS frame. Conversion happens here and nowhere else.

use anyhow::{anyhow, Context, Result};
use burn::tensor::backend::Backend;
use cordreg_core::geometry::{Matrix3d, Point3, Vector3};
use cordreg_core::image::ImageGeometry;
use cordreg_core::transform::{AffineTransform, DisplacementFieldTransform};
use ndarray::{Array, ArrayD, IxDyn};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use std::fs;
use std::path::Path;

use crate::nifti_io::{header_affine, header_from_geometry};

/// NIfTI intent code for vector-valued voxels.
pub const NIFTI_INTENT_VECTOR: i16 = 1007;

const ITK_HEADER: &str = "#Insight Transform File V1.0";
const ITK_AFFINE_TYPE: &str = "AffineTransform_double_3_3";
const ITK_ACCEPTED_TYPES: [&str; 3] = [
    "AffineTransform_double_3_3",
    "MatrixOffsetTransformBase_double_3_3",
    "AffineTransform_float_3_3",
];

/// RAS <-> LPS flip (its own inverse).
fn flip() -> Matrix3d {
    Matrix3d::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0))
}

fn flip_affine(transform: &AffineTransform) -> AffineTransform {
    let f = flip();
    AffineTransform::new(
        f * transform.matrix() * f,
        f * transform.translation(),
        Point3::from(f * transform.center().coords),
    )
}

fn format_values(values: impl IntoIterator<Item = f64>) -> String {
    values
        .into_iter()
        .map(|v| if v == 0.0 { 0.0 } else { v })
        .map(|v| format!("{v}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_values(line: &str, expected: usize, path: &Path) -> Result<Vec<f64>> {
    let values = line
        .split_whitespace()
        .map(|token| token.parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Malformed number in transform file {}", path.display()))?;
    if values.len() != expected {
        anyhow::bail!(
            "Expected {} values in transform file {}, found {}",
            expected,
            path.display(),
            values.len()
        );
    }
    Ok(values)
}

/// Write a linear transform as an ITK text file.
pub fn write_itk_affine<P: AsRef<Path>>(path: P, transform: &AffineTransform) -> Result<()> {
    let path = path.as_ref();
    let lps = flip_affine(transform);
    let matrix = lps.matrix();
    let parameters = (0..3)
        .flat_map(|r| (0..3).map(move |c| (r, c)))
        .map(|(r, c)| matrix[(r, c)])
        .chain(lps.translation().iter().copied());

    let text = format!(
        "{ITK_HEADER}\n#Transform 0\nTransform: {ITK_AFFINE_TYPE}\nParameters: {}\nFixedParameters: {}\n",
        format_values(parameters),
        format_values(lps.center().coords.iter().copied()),
    );
    fs::write(path, text).with_context(|| format!("Failed to write transform file {}", path.display()))
}

/// Read a linear transform from an ITK text file.
pub fn read_itk_affine<P: AsRef<Path>>(path: P) -> Result<AffineTransform> {
    let path = path.as_ref();
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read transform file {}", path.display()))?;

    let mut kind = None;
    let mut parameters = None;
    let mut fixed = None;
    for line in text.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("Transform:") {
            kind = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("Parameters:") {
            parameters = Some(parse_values(rest, 12, path)?);
        } else if let Some(rest) = line.strip_prefix("FixedParameters:") {
            fixed = Some(parse_values(rest, 3, path)?);
        }
    }

    let kind = kind.ok_or_else(|| anyhow!("No transform type in {}", path.display()))?;
    if !ITK_ACCEPTED_TYPES.contains(&kind.as_str()) {
        anyhow::bail!("Unsupported transform type {} in {}", kind, path.display());
    }
    let parameters = parameters.ok_or_else(|| anyhow!("No parameters in {}", path.display()))?;
    let fixed = fixed.unwrap_or_else(|| vec![0.0; 3]);

    let lps = AffineTransform::new(
        Matrix3d::from_row_slice(&parameters[..9]),
        Vector3::new(parameters[9], parameters[10], parameters[11]),
        Point3::new(fixed[0], fixed[1], fixed[2]),
    );
    Ok(flip_affine(&lps))
}

/// Write per-component RAS displacements as an ITK displacement field.
///
/// The file is a 5D `[x, y, z, 1, 3]` NIfTI volume with the vector intent.
pub fn write_displacement_components<P: AsRef<Path>>(
    path: P,
    components: &[Vec<f32>; 3],
    geometry: &ImageGeometry,
) -> Result<()> {
    let path = path.as_ref();
    if components.iter().any(|c| c.len() != geometry.voxel_count()) {
        anyhow::bail!("Displacement components do not match grid {:?}", geometry.shape());
    }

    let [nx, ny, nz] = geometry.shape();
    let array = Array::from_shape_fn((nx, ny, nz, 1, 3), |(x, y, z, _, c)| {
        let v = components[c][geometry.linear_index([x, y, z])];
        if c < 2 { -v } else { v }
    });

    let mut header = header_from_geometry(geometry);
    header.intent_code = NIFTI_INTENT_VECTOR;
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .map_err(|e| anyhow!("Failed to write displacement field {}: {}", path.display(), e))?;
    Ok(())
}

/// Read an ITK displacement field as per-component RAS displacements.
///
/// Both the 5D `[x, y, z, 1, 3]` layout and a plain 4D `[x, y, z, 3]`
/// layout are accepted.
pub fn read_displacement_components<P: AsRef<Path>>(path: P) -> Result<([Vec<f32>; 3], ImageGeometry)> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read displacement field {}", path.display()))?;
    let affine = header_affine(obj.header());
    let array: ArrayD<f32> = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert displacement field to ndarray")?;

    let dims = array.shape().to_vec();
    let vector_axis = match dims.as_slice() {
        [_, _, _, 1, 3] => 4,
        [_, _, _, 3] => 3,
        _ => anyhow::bail!(
            "Expected a [x, y, z, 1, 3] displacement field in {}, found {:?}",
            path.display(),
            dims
        ),
    };
    let geometry = ImageGeometry::from_affine([dims[0], dims[1], dims[2]], &affine);

    let mut components = [
        Vec::with_capacity(geometry.voxel_count()),
        Vec::with_capacity(geometry.voxel_count()),
        Vec::with_capacity(geometry.voxel_count()),
    ];
    let mut index = vec![0usize; dims.len()];
    for (c, component) in components.iter_mut().enumerate() {
        let sign = if c < 2 { -1.0 } else { 1.0 };
        index[vector_axis] = c;
        for offset in 0..geometry.voxel_count() {
            let [x, y, z] = geometry.voxel_index(offset);
            index[0] = x;
            index[1] = y;
            index[2] = z;
            component.push(sign * array[IxDyn(&index)]);
        }
    }

    Ok((components, geometry))
}

pub fn read_displacement_field<B: Backend, P: AsRef<Path>>(
    path: P,
    device: &B::Device,
) -> Result<DisplacementFieldTransform<B>> {
    let (components, geometry) = read_displacement_components(path)?;
    Ok(DisplacementFieldTransform::from_components(components, geometry, device))
}

pub fn write_displacement_field<B: Backend, P: AsRef<Path>>(
    path: P,
    field: &DisplacementFieldTransform<B>,
) -> Result<()> {
    write_displacement_components(path, &field.to_components(), field.geometry())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use cordreg_core::geometry::Spacing3;
    use cordreg_core::spatial::Orientation;
    use nalgebra::Rotation3;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_itk_affine_keeps_ras_semantics() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("affine.txt");
        let transform = AffineTransform::new(
            *Rotation3::from_euler_angles(0.1, -0.2, 0.3).matrix(),
            Vector3::new(1.5, -2.0, 4.0),
            Point3::new(10.0, 20.0, -5.0),
        );

        write_itk_affine(&path, &transform)?;
        let read_back = read_itk_affine(&path)?;

        for p in [Point3::origin(), Point3::new(3.0, -7.0, 12.0)] {
            assert!((transform.apply(&p) - read_back.apply(&p)).norm() < 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_itk_affine_file_is_lps() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("shift.txt");
        write_itk_affine(&path, &AffineTransform::from_translation(Vector3::new(1.0, 2.0, 3.0)))?;

        let text = fs::read_to_string(&path)?;
        assert!(text.starts_with(ITK_HEADER));
        assert!(text.contains("Transform: AffineTransform_double_3_3"));
        assert!(text.contains("Parameters: 1 0 0 0 1 0 0 0 1 -1 -2 3"), "{text}");
        Ok(())
    }

    #[test]
    fn test_reads_matrix_offset_transform() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("ants.txt");
        fs::write(
            &path,
            "#Insight Transform File V1.0\n#Transform 0\nTransform: MatrixOffsetTransformBase_double_3_3\n\
             Parameters: 1 0 0 0 1 0 0 0 1 -4 0 2\nFixedParameters: 0 0 0\n",
        )?;
        let transform = read_itk_affine(&path)?;
        assert!((transform.translation() - Vector3::new(4.0, 0.0, 2.0)).norm() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_rejects_unknown_transform_type() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("bspline.txt");
        fs::write(&path, "#Insight Transform File V1.0\nTransform: BSplineTransform_double_3_3\nParameters: 0\n")?;
        let err = read_itk_affine(&path).unwrap_err();
        assert!(err.to_string().contains("Unsupported transform type"));
        Ok(())
    }

    #[test]
    fn test_displacement_field_write_and_read() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("warp.nii.gz");
        let geometry = ImageGeometry::new(
            [4, 3, 5],
            Point3::new(1.0, 2.0, 3.0),
            Spacing3::new(1.0, 0.5, 2.0),
            "RPI".parse::<Orientation>()?.direction(),
        );
        let n = geometry.voxel_count();
        let components = [
            (0..n).map(|i| i as f32 * 0.1).collect::<Vec<_>>(),
            (0..n).map(|i| -(i as f32) * 0.2).collect::<Vec<_>>(),
            vec![0.75; n],
        ];
        let device = Default::default();
        let field = DisplacementFieldTransform::<TestBackend>::from_components(components.clone(), geometry.clone(), &device);

        write_displacement_field(&path, &field)?;
        let (read_back, read_geometry) = read_displacement_components(&path)?;

        assert!(read_geometry.same_space(&geometry, 1e-4));
        for c in 0..3 {
            for (a, b) in components[c].iter().zip(&read_back[c]) {
                assert!((a - b).abs() < 1e-5);
            }
        }

        let reloaded = read_displacement_field::<TestBackend, _>(&path, &device)?;
        assert_eq!(reloaded.geometry().shape(), [4, 3, 5]);
        Ok(())
    }

    #[test]
    fn test_displacement_field_is_stored_in_lps() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("shift.nii");
        let geometry = ImageGeometry::with_shape([2, 2, 2]);
        write_displacement_components(&path, &[vec![1.0; 8], vec![2.0; 8], vec![3.0; 8]], &geometry)?;

        let obj = ReaderOptions::new().read_file(&path)?;
        assert_eq!(obj.header().intent_code, NIFTI_INTENT_VECTOR);
        let raw: ArrayD<f32> = obj.into_volume().into_ndarray::<f32>()?;
        assert_eq!(raw.shape(), &[2, 2, 2, 1, 3]);
        assert_eq!(raw[IxDyn(&[0, 0, 0, 0, 0])], -1.0);
        assert_eq!(raw[IxDyn(&[1, 1, 1, 0, 1])], -2.0);
        assert_eq!(raw[IxDyn(&[1, 0, 1, 0, 2])], 3.0);
        Ok(())
    }
}
