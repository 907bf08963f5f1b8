//! Image type with physical metadata and coordinate transformations.
//!
//! This module provides the Image struct which represents a 3D medical volume
//! as tensor data plus the physical layout of its voxel grid.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use super::geometry::ImageGeometry;
use crate::geometry::{Direction3, Point3, Spacing3};

/// Medical image with physical metadata.
///
/// The voxel tensor uses the `[Z, Y, X]` layout; all spatial metadata
/// (shape, origin, spacing, direction) is expressed in `(x, y, z)` order.
///
/// # Type Parameters
/// * `B` - The backend (CPU or GPU) for tensor operations
///
/// # Coordinate Systems
/// * **Index Space**: Discrete voxel indices (integer coordinates)
/// * **Physical Space**: Continuous coordinates in mm
///
/// # Examples
/// ```rust
/// use cordreg_core::image::{Image, ImageGeometry};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let geometry = ImageGeometry::with_shape([4, 5, 6]);
/// let data = Tensor::<Backend, 3>::zeros(geometry.tensor_shape(), &device);
/// let image = Image::new(data, geometry);
/// assert_eq!(image.shape(), [4, 5, 6]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend> {
    /// The voxel data, `[Z, Y, X]`.
    data: Tensor<B, 3>,
    /// Physical layout of the grid.
    geometry: ImageGeometry,
}

impl<B: Backend> Image<B> {
    /// Create a new image with the given data and geometry.
    ///
    /// # Arguments
    /// * `data` - Voxel tensor of shape `geometry.tensor_shape()`
    /// * `geometry` - Physical layout of the grid
    pub fn new(data: Tensor<B, 3>, geometry: ImageGeometry) -> Self {
        debug_assert_eq!(data.dims(), geometry.tensor_shape(), "tensor does not match grid");
        Self { data, geometry }
    }

    /// Create an image from a flat buffer in `[Z, Y, X]` order (x fastest).
    pub fn from_vec(values: Vec<f32>, geometry: ImageGeometry, device: &B::Device) -> Self {
        let data = Tensor::<B, 3>::from_data(
            TensorData::new(values, Shape::new(geometry.tensor_shape())),
            device,
        );
        Self::new(data, geometry)
    }

    /// An image of zeros on the given grid.
    pub fn zeros(geometry: ImageGeometry, device: &B::Device) -> Self {
        let data = Tensor::<B, 3>::zeros(geometry.tensor_shape(), device);
        Self::new(data, geometry)
    }

    /// Get the image data tensor.
    pub fn data(&self) -> &Tensor<B, 3> {
        &self.data
    }

    /// Consume the image and return its tensor.
    pub fn into_data(self) -> Tensor<B, 3> {
        self.data
    }

    /// Get the grid geometry.
    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    /// Number of voxels along `(x, y, z)`.
    pub fn shape(&self) -> [usize; 3] {
        self.geometry.shape()
    }

    /// Get the origin (physical coordinate of the first voxel).
    pub fn origin(&self) -> &Point3 {
        self.geometry.origin()
    }

    /// Get the spacing (physical distance between voxels).
    pub fn spacing(&self) -> &Spacing3 {
        self.geometry.spacing()
    }

    /// Get the direction (orientation matrix).
    pub fn direction(&self) -> &Direction3 {
        self.geometry.direction()
    }

    /// Voxel values flattened in `[Z, Y, X]` order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .unwrap_or_default()
    }

    /// Replace the voxel data, keeping the geometry.
    pub fn with_data(&self, data: Tensor<B, 3>) -> Self {
        Self::new(data, self.geometry.clone())
    }

    /// Batch transform physical points `[N, 3]` to continuous indices.
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        self.geometry.world_to_index_tensor(points)
    }

    /// Batch transform continuous indices `[N, 3]` to physical points.
    pub fn index_to_world_tensor(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        self.geometry.index_to_world_tensor(indices)
    }
}
