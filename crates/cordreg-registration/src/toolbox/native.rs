//! In-process collaborators built on the workspace's own image code.
//!
//! Volumes are loaded into burn tensors on the configured backend, filtered
//! or resampled, and written back. The step solver covers the
//! center-of-mass family of algorithms; anything else is reported as
//! unsupported.

use std::collections::BTreeMap;
use std::path::Path;

use burn::tensor::backend::Backend;
use cordreg_core::geometry::{Matrix3d, Vector3};
use cordreg_core::image::statistics::{center_of_mass, in_plane_moments, normalized_cross_correlation};
use cordreg_core::image::ImageGeometry;
use cordreg_core::interpolation::InterpolationKind;
use cordreg_core::label::{LabelSet, Landmark};
use cordreg_core::transform::{AffineTransform, CompositeTransform, DisplacementFieldTransform, Transform};
use cordreg_core::{filter, Image, Orientation};
use cordreg_io::{
    read_displacement_field, read_geometry, read_itk_affine, read_nifti, read_volume, write_displacement_field,
    write_itk_affine, write_labels, write_nifti,
};
use nalgebra::Rotation3;
use tracing::{debug, warn};

use super::{ImageOps, Registrar, Straightener, TransformOps};
use crate::artifact::file_stem;
use crate::cache::StraighteningArtifacts;
use crate::chain::{StepTransform, TransformChain, Warp, WarpKind, WarpRef};
use crate::error::{ArtifactContext, RegistrationError, Result};
use crate::plan::RegistrationStep;

const TOOLBOX_NAME: &str = "native";

/// Collaborators running in this process on backend `B`.
#[derive(Debug, Clone)]
pub struct NativeToolbox<B: Backend> {
    device: B::Device,
}

impl<B: Backend> Default for NativeToolbox<B> {
    fn default() -> Self {
        Self::new(B::Device::default())
    }
}

impl<B: Backend> NativeToolbox<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    fn load(&self, path: &Path) -> Result<Image<B>> {
        read_nifti::<B, _>(path, &self.device).for_artifact(path)
    }

    fn save(&self, path: &Path, image: &Image<B>) -> Result<()> {
        write_nifti(path, image).for_artifact(path)
    }

    fn load_transform(&self, warp: &WarpRef) -> Result<Box<dyn Transform<B>>> {
        let path = warp.path();
        match warp.warp().kind() {
            WarpKind::Linear => {
                let affine = read_itk_affine(path).for_artifact(path)?;
                if !warp.is_inverted() {
                    return Ok(Box::new(affine));
                }
                let inverse = affine.inverted().ok_or_else(|| {
                    RegistrationError::transform_chain(format!("{} is not invertible", path.display()))
                })?;
                Ok(Box::new(inverse))
            }
            WarpKind::Dense => {
                let field = read_displacement_field::<B, _>(path, &self.device).for_artifact(path)?;
                Ok(Box::new(field))
            }
        }
    }

    /// Pull-back transform of a chain: destination points to source points.
    ///
    /// The last warp of the chain touches the destination, so it is
    /// evaluated first.
    pub fn composite(&self, chain: &TransformChain) -> Result<CompositeTransform<B>> {
        let mut composite = CompositeTransform::new();
        for warp in chain.warps().iter().rev() {
            composite.push(self.load_transform(warp)?);
        }
        Ok(composite)
    }
}

/// Per-slice in-plane offsets of the cord centreline from its mean position.
///
/// Offsets are physical vectors spanned by the first two index axes. Slices
/// without segmentation take the offset of the nearest non-empty slice.
/// Returns `None` for an empty segmentation.
pub fn centerline_offsets(values: &[f32], geometry: &ImageGeometry) -> Option<Vec<Vector3>> {
    let nz = geometry.shape()[2];
    let mut sums = vec![(Vector3::zeros(), 0.0f64); nz];
    for (offset, &v) in values.iter().enumerate() {
        if v <= 0.0 {
            continue;
        }
        let index = geometry.voxel_index(offset);
        let entry = &mut sums[index[2]];
        entry.0 += geometry.voxel_to_physical(index).coords * v as f64;
        entry.1 += v as f64;
    }

    let centroids: Vec<Option<Vector3>> = sums
        .iter()
        .map(|(sum, weight)| (*weight > 0.0).then(|| sum / *weight))
        .collect();
    let present: Vec<(usize, Vector3)> = centroids
        .iter()
        .enumerate()
        .filter_map(|(k, c)| c.map(|c| (k, c)))
        .collect();
    if present.is_empty() {
        return None;
    }
    let mean = present.iter().fold(Vector3::zeros(), |acc, (_, c)| acc + c) / present.len() as f64;

    let direction = geometry.direction();
    let (u, v) = (direction.column(0).into_owned(), direction.column(1).into_owned());
    let offsets = (0..nz)
        .map(|k| {
            let centroid = centroids[k].unwrap_or_else(|| {
                present
                    .iter()
                    .min_by_key(|(j, _)| j.abs_diff(k))
                    .map(|(_, c)| *c)
                    .unwrap_or(mean)
            });
            let delta = centroid - mean;
            u * u.dot(&delta) + v * v.dot(&delta)
        })
        .collect();
    Some(offsets)
}

/// One landmark per vertebral level, at the rounded voxel centroid of the
/// level's region.
pub fn level_centers(values: &[f32], geometry: &ImageGeometry) -> LabelSet {
    let mut levels: BTreeMap<i64, ([f64; 3], usize)> = BTreeMap::new();
    for (offset, &v) in values.iter().enumerate() {
        let level = v.round() as i64;
        if level <= 0 {
            continue;
        }
        let index = geometry.voxel_index(offset);
        let entry = levels.entry(level).or_insert(([0.0; 3], 0));
        for axis in 0..3 {
            entry.0[axis] += index[axis] as f64;
        }
        entry.1 += 1;
    }
    levels
        .into_iter()
        .map(|(level, (sum, count))| {
            let index = sum.map(|s| (s / count as f64).round() as usize);
            Landmark::new(index, level as f64)
        })
        .collect()
}

impl<B: Backend> ImageOps for NativeToolbox<B> {
    fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        let (values, geometry) = read_volume(input).for_artifact(input)?;
        cordreg_io::write_volume(output, &values, &geometry).for_artifact(output)
    }

    fn binarize(&self, input: &Path, output: &Path, threshold: f64) -> Result<()> {
        let image = self.load(input)?;
        self.save(output, &filter::binarize(&image, threshold))
    }

    fn resample_mm(
        &self,
        input: &Path,
        output: &Path,
        spacing: [f64; 3],
        interpolation: InterpolationKind,
    ) -> Result<()> {
        let image = self.load(input)?;
        let target = image.geometry().resampled_to_spacing(spacing);
        let resampled = filter::resample(&image, &target, Box::new(AffineTransform::identity()), interpolation);
        self.save(output, &resampled)
    }

    fn resample_factor(&self, input: &Path, output: &Path, factor: [f64; 3]) -> Result<()> {
        let image = self.load(input)?;
        let target = image.geometry().resampled_by_factor(factor);
        let resampled = filter::resample(
            &image,
            &target,
            Box::new(AffineTransform::identity()),
            InterpolationKind::Linear,
        );
        self.save(output, &resampled)
    }

    fn set_orientation(&self, input: &Path, output: &Path, orientation: Orientation) -> Result<()> {
        let image = self.load(input)?;
        self.save(output, &filter::reorient(&image, orientation))
    }

    fn crop(&self, input: &Path, output: &Path, axis: usize, start: usize, end: usize) -> Result<()> {
        let image = self.load(input)?;
        self.save(output, &filter::crop_axis(&image, axis, start, end))
    }

    fn dilate(&self, input: &Path, output: &Path, radius: usize) -> Result<()> {
        let image = self.load(input)?;
        self.save(output, &filter::dilate(&image, radius))
    }

    fn vertebral_body_labels(&self, levels: &Path, output: &Path) -> Result<()> {
        let (values, geometry) = read_volume(levels).for_artifact(levels)?;
        let labels = level_centers(&values, &geometry);
        debug!("{} vertebral levels found in {}", labels.len(), levels.display());
        write_labels(output, &labels, &geometry).for_artifact(output)
    }
}

impl<B: Backend> TransformOps for NativeToolbox<B> {
    fn apply(
        &self,
        input: &Path,
        output: &Path,
        reference: &Path,
        chain: &TransformChain,
        interpolation: InterpolationKind,
    ) -> Result<()> {
        let image = self.load(input)?;
        let target = read_geometry(reference).for_artifact(reference)?;
        let transform = self.composite(chain)?;
        let warped = filter::resample(&image, &target, Box::new(transform), interpolation);
        self.save(output, &warped)
    }

    fn concatenate(&self, chain: &TransformChain, reference: &Path, output: &Path) -> Result<()> {
        let target = read_geometry(reference).for_artifact(reference)?;
        let transform = self.composite(chain)?;
        let field = DisplacementFieldTransform::from_transform(&transform, target, &self.device);
        write_displacement_field(output, &field).for_artifact(output)
    }
}

impl<B: Backend> Straightener for NativeToolbox<B> {
    fn straighten(
        &self,
        segmentation: &Path,
        output: &Path,
        workdir: &Path,
        params: Option<&str>,
        _verbosity: u8,
    ) -> Result<StraighteningArtifacts> {
        if let Some(params) = params {
            warn!("Straightening parameters '{}' are ignored by the native toolbox", params);
        }
        let (values, geometry) = read_volume(segmentation).for_artifact(segmentation)?;
        let offsets = centerline_offsets(&values, &geometry)
            .ok_or_else(|| RegistrationError::artifact_io(segmentation, "segmentation is empty"))?;

        let mut components: [Vec<f32>; 3] = Default::default();
        for component in components.iter_mut() {
            component.reserve(geometry.voxel_count());
        }
        for offset in 0..geometry.voxel_count() {
            let z = geometry.voxel_index(offset)[2];
            for (axis, component) in components.iter_mut().enumerate() {
                component.push(offsets[z][axis] as f32);
            }
        }

        let curve2straight = DisplacementFieldTransform::<B>::from_components(components, geometry.clone(), &self.device);
        let straight2curve = curve2straight.negated();
        let artifacts = StraighteningArtifacts::in_dir(workdir);
        write_displacement_field(&artifacts.curve2straight, &curve2straight).for_artifact(&artifacts.curve2straight)?;
        write_displacement_field(&artifacts.straight2curve, &straight2curve).for_artifact(&artifacts.straight2curve)?;

        let image = Image::<B>::from_vec(values, geometry.clone(), &self.device);
        let straight = filter::resample(&image, &geometry, Box::new(curve2straight), InterpolationKind::Linear);
        self.save(output, &straight)?;
        self.save(&artifacts.straight_ref, &straight)?;
        Ok(artifacts)
    }
}

impl<B: Backend> Registrar for NativeToolbox<B> {
    fn register(
        &self,
        source: &Path,
        destination: &Path,
        step: &RegistrationStep,
        workdir: &Path,
    ) -> Result<StepTransform> {
        let (src_values, src_geometry) = read_volume(source).for_artifact(source)?;
        let (dest_values, dest_geometry) = read_volume(destination).for_artifact(destination)?;

        let transform = match step.algorithm.as_str() {
            "translation" | "centermass" => {
                let src = center_of_mass(&src_values, &src_geometry)
                    .ok_or_else(|| RegistrationError::artifact_io(source, "image is empty"))?;
                let dest = center_of_mass(&dest_values, &dest_geometry)
                    .ok_or_else(|| RegistrationError::artifact_io(destination, "image is empty"))?;
                AffineTransform::from_translation(src - dest)
            }
            "centermassrot" => {
                let src = in_plane_moments(&src_values, &src_geometry)
                    .ok_or_else(|| RegistrationError::artifact_io(source, "image is empty"))?;
                let dest = in_plane_moments(&dest_values, &dest_geometry)
                    .ok_or_else(|| RegistrationError::artifact_io(destination, "image is empty"))?;
                let threshold = step.pca_eigenratio_threshold;
                let angle = if src.eigen_ratio > threshold && dest.eigen_ratio > threshold {
                    src.angle - dest.angle
                } else {
                    debug!("In-plane shape too round for a reliable angle; estimating translation only");
                    0.0
                };
                let rotation: Matrix3d = Rotation3::from_axis_angle(&Vector3::z_axis(), angle).into_inner();
                AffineTransform::new(rotation, src.center - dest.center, dest.center)
            }
            other => return Err(RegistrationError::unsupported_algorithm(other, TOOLBOX_NAME)),
        };

        let path = workdir.join(format!(
            "step{}_{}2{}.txt",
            step.index,
            file_stem(source),
            file_stem(destination)
        ));
        write_itk_affine(&path, &transform).for_artifact(&path)?;

        let moving = Image::<B>::from_vec(src_values, src_geometry, &self.device);
        let warped = filter::resample(&moving, &dest_geometry, Box::new(transform), InterpolationKind::Linear);
        if let Some(ncc) = normalized_cross_correlation(&warped.to_vec(), &dest_values) {
            debug!("Step {} ({}): NCC after alignment {:.4}", step.index, step.algorithm, ncc);
        }

        StepTransform::linear(Warp::new(path)?)
    }
}
