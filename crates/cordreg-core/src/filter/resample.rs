//! Resample image filter.
//!
//! This module provides ResampleImageFilter which resamples an image
//! into a new coordinate system using a transform and an interpolator.

use std::marker::PhantomData;

use burn::tensor::backend::Backend;

use crate::image::{generate_grid, Image, ImageGeometry};
use crate::interpolation::{InterpolationKind, Interpolator, LinearInterpolator, NearestNeighborInterpolator};
use crate::transform::Transform;

/// Resample image filter.
///
/// Resamples an image by applying a transform to map points from the
/// output image space to the input image space, and then interpolating values.
///
/// The transform maps from Output Physical Space -> Input Physical Space.
///
/// # Type Parameters
/// * `B` - The Burn backend
/// * `T` - The transform type
/// * `I` - The interpolator type
pub struct ResampleImageFilter<B, T, I>
where
    B: Backend,
    T: Transform<B> + ?Sized,
    I: Interpolator<B>,
{
    geometry: ImageGeometry,
    interpolator: I,
    _phantom: PhantomData<B>,
    transform: Box<T>,
}

impl<B, T, I> ResampleImageFilter<B, T, I>
where
    B: Backend,
    T: Transform<B> + ?Sized,
    I: Interpolator<B>,
{
    /// Create a new resample filter.
    ///
    /// # Arguments
    /// * `geometry` - Output grid
    /// * `transform` - Transform from output space to input space
    /// * `interpolator` - Interpolator for input image sampling
    pub fn new(geometry: ImageGeometry, transform: Box<T>, interpolator: I) -> Self {
        Self {
            geometry,
            interpolator,
            _phantom: PhantomData,
            transform,
        }
    }

    /// Apply filter to an input image.
    pub fn apply(&self, input: &Image<B>) -> Image<B> {
        let device = input.data().device();

        // 1. Output voxel indices, then their physical positions
        let output_indices = generate_grid::<B>(self.geometry.shape(), &device);
        let output_points = self.geometry.index_to_world_tensor(output_indices);

        // 2. Transform maps Output Space -> Input Space
        let input_points = self.transform.transform_points(output_points);

        // 3. Input continuous indices, then interpolate
        let input_indices = input.world_to_index_tensor(input_points);
        let output_flat = self.interpolator.interpolate(input.data(), input_indices);

        Image::new(output_flat.reshape(self.geometry.tensor_shape()), self.geometry.clone())
    }
}

/// Resample `input` onto `geometry` through `transform` with the requested
/// interpolation scheme.
pub fn resample<B: Backend, T: Transform<B> + ?Sized>(
    input: &Image<B>,
    geometry: &ImageGeometry,
    transform: Box<T>,
    interpolation: InterpolationKind,
) -> Image<B> {
    match interpolation {
        InterpolationKind::NearestNeighbor => {
            ResampleImageFilter::new(geometry.clone(), transform, NearestNeighborInterpolator::new()).apply(input)
        }
        InterpolationKind::Linear | InterpolationKind::Spline => {
            ResampleImageFilter::new(geometry.clone(), transform, LinearInterpolator::new()).apply(input)
        }
    }
}
