//! nalgebra aliases for the physical-space quantities used throughout cordreg.
//!
//! Physical coordinates follow the NIfTI world convention (RAS+): `+x` points
//! to the subject's right, `+y` anterior and `+z` superior.

use nalgebra::{Matrix3, Matrix4, Point as NaPoint, SMatrix, SVector};

pub type Point<const D: usize> = NaPoint<f64, D>;
pub type Vector<const D: usize> = SVector<f64, D>;
pub type Spacing<const D: usize> = SVector<f64, D>;
pub type Direction<const D: usize> = SMatrix<f64, D, D>;

// Common aliases
pub type Point3 = Point<3>;
pub type Vector3 = Vector<3>;
pub type Spacing3 = Spacing<3>;
pub type Direction3 = Direction<3>;
pub type Matrix3d = Matrix3<f64>;
pub type Affine4 = Matrix4<f64>;
