//! Voxel grid geometry.
//!
//! `ImageGeometry` describes how voxel indices map to physical coordinates,
//! independently of any voxel data. It is what the NIfTI header carries and
//! what "same space" comparisons operate on.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};
use nalgebra::Matrix4;

use crate::geometry::{Affine4, Direction3, Point3, Spacing3, Vector3};

/// Tolerance used when comparing two grids for equality.
pub const DEFAULT_SPACE_TOLERANCE: f64 = 1e-3;

/// Physical layout of a 3D voxel grid.
///
/// Index order is `(x, y, z)` everywhere in this type; voxel tensors use the
/// reversed `[Z, Y, X]` layout (see [`ImageGeometry::tensor_shape`]).
///
/// * `point = origin + Direction * (index * spacing)`
/// * `index = (Direction^-1 * (point - origin)) / spacing`
#[derive(Debug, Clone, PartialEq)]
pub struct ImageGeometry {
    shape: [usize; 3],
    origin: Point3,
    spacing: Spacing3,
    direction: Direction3,
}

impl ImageGeometry {
    /// Create a new grid description.
    ///
    /// # Arguments
    /// * `shape` - Number of voxels along `(x, y, z)`
    /// * `origin` - Physical coordinate of voxel `(0, 0, 0)`
    /// * `spacing` - Physical distance between voxels along each axis
    /// * `direction` - Columns are the physical directions of the index axes
    pub fn new(shape: [usize; 3], origin: Point3, spacing: Spacing3, direction: Direction3) -> Self {
        Self {
            shape,
            origin,
            spacing,
            direction,
        }
    }

    /// Grid with unit spacing, identity direction and origin at zero.
    pub fn with_shape(shape: [usize; 3]) -> Self {
        Self::new(
            shape,
            Point3::origin(),
            Spacing3::new(1.0, 1.0, 1.0),
            Direction3::identity(),
        )
    }

    /// Build a grid from a 4x4 voxel-to-world matrix.
    ///
    /// The upper 3x3 block is split into per-column spacing and unit
    /// direction columns; degenerate columns fall back to the matching
    /// canonical axis.
    pub fn from_affine(shape: [usize; 3], affine: &Affine4) -> Self {
        let origin = Point3::new(affine[(0, 3)], affine[(1, 3)], affine[(2, 3)]);
        let mut spacing = Spacing3::zeros();
        let mut direction = Direction3::identity();
        for c in 0..3 {
            let column = Vector3::new(affine[(0, c)], affine[(1, c)], affine[(2, c)]);
            let norm = column.norm();
            if norm > 1e-9 {
                spacing[c] = norm;
                direction.set_column(c, &(column / norm));
            } else {
                spacing[c] = 1.0;
            }
        }
        Self::new(shape, origin, spacing, direction)
    }

    /// The voxel-to-world matrix (`Direction * diag(spacing)` plus origin).
    pub fn affine(&self) -> Affine4 {
        let mut m = Matrix4::identity();
        for r in 0..3 {
            for c in 0..3 {
                m[(r, c)] = self.direction[(r, c)] * self.spacing[c];
            }
            m[(r, 3)] = self.origin[r];
        }
        m
    }

    /// Number of voxels along `(x, y, z)`.
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Tensor dimensions in `[Z, Y, X]` order.
    pub fn tensor_shape(&self) -> [usize; 3] {
        [self.shape[2], self.shape[1], self.shape[0]]
    }

    pub fn origin(&self) -> &Point3 {
        &self.origin
    }

    pub fn spacing(&self) -> &Spacing3 {
        &self.spacing
    }

    pub fn direction(&self) -> &Direction3 {
        &self.direction
    }

    /// Total number of voxels.
    pub fn voxel_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Offset of voxel `(x, y, z)` in a flattened `[Z, Y, X]` buffer.
    pub fn linear_index(&self, index: [usize; 3]) -> usize {
        (index[2] * self.shape[1] + index[1]) * self.shape[0] + index[0]
    }

    /// Inverse of [`ImageGeometry::linear_index`].
    pub fn voxel_index(&self, offset: usize) -> [usize; 3] {
        let nx = self.shape[0];
        let ny = self.shape[1];
        [offset % nx, (offset / nx) % ny, offset / (nx * ny)]
    }

    /// Whether a (possibly negative) voxel index lies inside the grid.
    pub fn contains(&self, index: [i64; 3]) -> bool {
        index
            .iter()
            .zip(self.shape.iter())
            .all(|(&i, &n)| i >= 0 && (i as usize) < n)
    }

    fn inverse_direction(&self) -> Direction3 {
        // Direction columns are unit vectors; the transpose is the inverse
        // whenever the matrix is orthonormal.
        self.direction
            .try_inverse()
            .unwrap_or_else(|| self.direction.transpose())
    }

    /// Convert a continuous index to a physical point.
    pub fn index_to_physical(&self, index: &Point3) -> Point3 {
        let scaled = Vector3::new(
            index[0] * self.spacing[0],
            index[1] * self.spacing[1],
            index[2] * self.spacing[2],
        );
        self.origin + self.direction * scaled
    }

    /// Convert a physical point to a continuous index.
    pub fn physical_to_index(&self, point: &Point3) -> Point3 {
        let rotated = self.inverse_direction() * (point - self.origin);
        Point3::new(
            rotated[0] / self.spacing[0],
            rotated[1] / self.spacing[1],
            rotated[2] / self.spacing[2],
        )
    }

    /// Physical point of an integer voxel index.
    pub fn voxel_to_physical(&self, index: [usize; 3]) -> Point3 {
        self.index_to_physical(&Point3::new(index[0] as f64, index[1] as f64, index[2] as f64))
    }

    /// Check whether two grids describe the same physical sampling.
    ///
    /// Shapes must match exactly; origin, spacing and direction are compared
    /// component-wise within `tolerance`.
    pub fn same_space(&self, other: &ImageGeometry, tolerance: f64) -> bool {
        self.shape == other.shape
            && (self.origin - other.origin).amax() <= tolerance
            && (self.spacing - other.spacing).amax() <= tolerance
            && (self.direction - other.direction).amax() <= tolerance
    }

    /// Grid covering the same field of view with the requested spacing.
    ///
    /// The number of voxels along each axis is `round(n * spacing / new_spacing)`
    /// (at least one); origin and direction are kept.
    pub fn resampled_to_spacing(&self, new_spacing: [f64; 3]) -> Self {
        let mut shape = [0usize; 3];
        for axis in 0..3 {
            let extent = self.shape[axis] as f64 * self.spacing[axis];
            shape[axis] = ((extent / new_spacing[axis]).round() as usize).max(1);
        }
        Self::new(
            shape,
            self.origin,
            Spacing3::new(new_spacing[0], new_spacing[1], new_spacing[2]),
            self.direction,
        )
    }

    /// Grid with `round(n * factor)` voxels per axis over the same extent.
    ///
    /// Voxel `0` is moved by half the spacing change so that the outer
    /// voxel boundaries of both grids coincide.
    pub fn resampled_by_factor(&self, factor: [f64; 3]) -> Self {
        let mut shape = [0usize; 3];
        let mut spacing = Spacing3::zeros();
        for axis in 0..3 {
            shape[axis] = ((self.shape[axis] as f64 * factor[axis]).round() as usize).max(1);
            spacing[axis] = self.spacing[axis] * self.shape[axis] as f64 / shape[axis] as f64;
        }
        let shift: Vector3 = (spacing - self.spacing) / 2.0;
        let origin = self.origin + self.direction * shift;
        Self::new(shape, origin, spacing, self.direction)
    }

    /// Sub-grid spanning indices `start..=end` along `axis`.
    pub fn cropped(&self, axis: usize, start: usize, end: usize) -> Self {
        let mut shape = self.shape;
        shape[axis] = end + 1 - start;
        let mut first = [0usize; 3];
        first[axis] = start;
        Self::new(shape, self.voxel_to_physical(first), self.spacing, self.direction)
    }

    /// Batch transform continuous indices `[N, 3]` to physical points.
    pub fn index_to_world_tensor<B: Backend>(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = indices.device();
        let origin_tensor = self.origin_tensor::<B>(&device);

        // P = O + I @ M with M_rc = S_r * D_cr
        let mut m_data = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                m_data.push((self.spacing[r] * self.direction[(c, r)]) as f32);
            }
        }
        let m_tensor = Tensor::<B, 2>::from_data(TensorData::new(m_data, Shape::new([3, 3])), &device);

        indices.matmul(m_tensor) + origin_tensor
    }

    /// Batch transform physical points `[N, 3]` to continuous indices.
    pub fn world_to_index_tensor<B: Backend>(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();
        let origin_tensor = self.origin_tensor::<B>(&device);

        // I = (P - O) @ T with T_rc = (D^-1)_cr / S_c
        let inv_dir = self.inverse_direction();
        let mut t_data = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                t_data.push((inv_dir[(c, r)] / self.spacing[c]) as f32);
            }
        }
        let t_tensor = Tensor::<B, 2>::from_data(TensorData::new(t_data, Shape::new([3, 3])), &device);

        (points - origin_tensor).matmul(t_tensor)
    }

    fn origin_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let origin: Vec<f32> = (0..3).map(|i| self.origin[i] as f32).collect();
        Tensor::<B, 1>::from_data(TensorData::new(origin, Shape::new([3])), device).reshape([1, 3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpi_geometry() -> ImageGeometry {
        let direction = Direction3::from_diagonal(&Vector3::new(-1.0, 1.0, 1.0));
        ImageGeometry::new(
            [10, 12, 14],
            Point3::new(20.0, -5.0, 3.0),
            Spacing3::new(0.5, 1.0, 2.0),
            direction,
        )
    }

    #[test]
    fn test_index_physical_roundtrip() {
        let geometry = rpi_geometry();
        let index = Point3::new(3.5, 4.0, 7.25);
        let point = geometry.index_to_physical(&index);
        assert!((point[0] - (20.0 - 1.75)).abs() < 1e-9);
        assert!((point[2] - (3.0 + 14.5)).abs() < 1e-9);

        let back = geometry.physical_to_index(&point);
        assert!((back - index).norm() < 1e-9);
    }

    #[test]
    fn test_affine_roundtrip() {
        let geometry = rpi_geometry();
        let rebuilt = ImageGeometry::from_affine(geometry.shape(), &geometry.affine());
        assert!(geometry.same_space(&rebuilt, 1e-9));
    }

    #[test]
    fn test_linear_index_is_x_fastest() {
        let geometry = ImageGeometry::with_shape([4, 3, 2]);
        assert_eq!(geometry.linear_index([1, 0, 0]), 1);
        assert_eq!(geometry.linear_index([0, 1, 0]), 4);
        assert_eq!(geometry.linear_index([0, 0, 1]), 12);
        assert_eq!(geometry.voxel_index(17), [1, 1, 1]);
        assert_eq!(geometry.tensor_shape(), [2, 3, 4]);
    }

    #[test]
    fn test_same_space_detects_shift() {
        let a = rpi_geometry();
        let b = ImageGeometry::new(
            a.shape(),
            Point3::new(20.5, -5.0, 3.0),
            *a.spacing(),
            *a.direction(),
        );
        assert!(a.same_space(&a.clone(), DEFAULT_SPACE_TOLERANCE));
        assert!(!a.same_space(&b, DEFAULT_SPACE_TOLERANCE));
    }

    #[test]
    fn test_resampled_to_spacing_keeps_extent() {
        let geometry = rpi_geometry();
        let iso = geometry.resampled_to_spacing([1.0, 1.0, 1.0]);
        assert_eq!(iso.shape(), [5, 12, 28]);
        assert_eq!(iso.origin(), geometry.origin());
    }

    #[test]
    fn test_resampled_by_factor_subsamples_z() {
        let geometry = ImageGeometry::with_shape([8, 8, 40]);
        let sub = geometry.resampled_by_factor([1.0, 1.0, 0.25]);
        assert_eq!(sub.shape(), [8, 8, 10]);
        assert!((sub.spacing()[2] - 4.0).abs() < 1e-12);
        // First voxel centre moves from z = 0 to the middle of the first four.
        assert!((sub.origin()[2] - 1.5).abs() < 1e-12);
        assert_eq!(sub.origin()[0], 0.0);
    }

    #[test]
    fn test_resampled_by_factor_keeps_volume_centred() {
        let geometry = rpi_geometry();
        let sub = geometry.resampled_by_factor([1.0, 0.5, 0.25]);
        let centre = |g: &ImageGeometry| {
            let [nx, ny, nz] = g.shape();
            let first = g.voxel_to_physical([0, 0, 0]);
            let last = g.voxel_to_physical([nx - 1, ny - 1, nz - 1]);
            (first.coords + last.coords) / 2.0
        };
        assert!((centre(&geometry) - centre(&sub)).norm() < 1e-9);
    }

    #[test]
    fn test_cropped_moves_origin() {
        let geometry = rpi_geometry();
        let cropped = geometry.cropped(2, 3, 6);
        assert_eq!(cropped.shape(), [10, 12, 4]);
        assert!((cropped.origin()[2] - 9.0).abs() < 1e-12);
        let p = cropped.voxel_to_physical([2, 2, 0]);
        let q = geometry.voxel_to_physical([2, 2, 3]);
        assert!((p - q).norm() < 1e-12);
    }
}
