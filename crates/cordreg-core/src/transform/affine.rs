//! Affine transform implementation.
//!
//! This module provides an affine transform (linear transformation + translation).

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use super::trait_::Transform;
use crate::geometry::{Matrix3d, Point3, Vector3};

/// Affine Transform (Linear transformation + Translation).
///
/// Represents a general affine transformation with a fixed center:
/// T(x) = A(x - c) + c + t
///
/// where:
/// * A is a 3×3 matrix (linear transformation: rotation, scale, shear)
/// * t is a translation vector
/// * c is a fixed center of rotation/scaling
///
/// This is the parameterisation used by ITK `AffineTransform` files, so a
/// transform read from disk maps back to the same three quantities.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineTransform {
    matrix: Matrix3d,
    translation: Vector3,
    center: Point3,
}

impl AffineTransform {
    /// Create a new affine transform.
    ///
    /// # Arguments
    /// * `matrix` - The linear transformation matrix
    /// * `translation` - The translation vector
    /// * `center` - The fixed center
    pub fn new(matrix: Matrix3d, translation: Vector3, center: Point3) -> Self {
        Self {
            matrix,
            translation,
            center,
        }
    }

    /// Create an identity affine transform.
    pub fn identity() -> Self {
        Self::new(Matrix3d::identity(), Vector3::zeros(), Point3::origin())
    }

    /// Pure translation.
    pub fn from_translation(translation: Vector3) -> Self {
        Self::new(Matrix3d::identity(), translation, Point3::origin())
    }

    /// Get the transformation matrix.
    pub fn matrix(&self) -> &Matrix3d {
        &self.matrix
    }

    /// Get the translation vector.
    pub fn translation(&self) -> &Vector3 {
        &self.translation
    }

    /// Get the center of rotation.
    pub fn center(&self) -> &Point3 {
        &self.center
    }

    /// Map a single point.
    pub fn apply(&self, point: &Point3) -> Point3 {
        self.center + self.matrix * (point - self.center) + self.translation
    }

    /// The algebraic inverse, keeping the same center.
    ///
    /// With `y = A(x - c) + c + t`, the inverse is `x = A⁻¹(y - c) + c - A⁻¹t`.
    /// Returns `None` for a singular matrix.
    pub fn inverted(&self) -> Option<AffineTransform> {
        let inv = self.matrix.try_inverse()?;
        Some(Self::new(inv, -(inv * self.translation), self.center))
    }

    /// Offset form `y = A x + o` used by some file formats.
    pub fn offset(&self) -> Vector3 {
        self.center.coords + self.translation - self.matrix * self.center.coords
    }
}

impl<B: Backend> Transform<B> for AffineTransform {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        // In row vector notation (inputs are [N, 3]):
        // y = x @ A^T + (c + t - A c)
        let device = points.device();

        let mut a_t = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                a_t.push(self.matrix[(c, r)] as f32);
            }
        }
        let a_t = Tensor::<B, 2>::from_data(TensorData::new(a_t, Shape::new([3, 3])), &device);

        let offset = self.offset();
        let offset = Tensor::<B, 1>::from_data(
            TensorData::new(vec![offset[0] as f32, offset[1] as f32, offset[2] as f32], Shape::new([3])),
            &device,
        )
        .reshape([1, 3]);

        points.matmul(a_t) + offset
    }

    fn inverse(&self) -> Option<Box<dyn Transform<B>>> {
        self.inverted().map(|inv| Box::new(inv) as Box<dyn Transform<B>>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_affine_transform_identity() {
        let device = Default::default();
        let transform = AffineTransform::identity();

        let points = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]], &device);
        let transformed = Transform::<TestBackend>::transform_points(&transform, points);
        let slice = transformed.into_data().to_vec::<f32>().unwrap();

        assert_eq!(slice, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_affine_transform_scale_with_center() {
        // Scale z by 2 about (1, 1, 1), then translate by (0, 0, 1).
        let matrix = Matrix3d::from_diagonal(&Vector3::new(1.0, 1.0, 2.0));
        let transform = AffineTransform::new(matrix, Vector3::new(0.0, 0.0, 1.0), Point3::new(1.0, 1.0, 1.0));

        let mapped = transform.apply(&Point3::new(2.0, 1.0, 3.0));
        assert!((mapped - Point3::new(2.0, 1.0, 6.0)).norm() < 1e-12);

        let device = Default::default();
        let points = Tensor::<TestBackend, 2>::from_floats([[2.0, 1.0, 3.0]], &device);
        let slice = Transform::<TestBackend>::transform_points(&transform, points)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert!((slice[2] - 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_inverse_undoes_transform() {
        let rotation = nalgebra::Rotation3::from_euler_angles(0.1, -0.2, 0.3);
        let matrix = rotation.matrix() * Matrix3d::from_diagonal(&Vector3::new(1.0, 1.0, 1.3));
        let transform = AffineTransform::new(matrix, Vector3::new(2.0, -1.0, 4.0), Point3::new(5.0, 6.0, 7.0));
        let inverse = transform.inverted().unwrap();

        let p = Point3::new(-3.0, 8.0, 1.5);
        let back = inverse.apply(&transform.apply(&p));
        assert!((back - p).norm() < 1e-9);
    }

    #[test]
    fn test_singular_has_no_inverse() {
        let transform = AffineTransform::new(Matrix3d::zeros(), Vector3::zeros(), Point3::origin());
        assert!(transform.inverted().is_none());
        assert!(Transform::<TestBackend>::inverse(&transform).is_none());
    }
}
