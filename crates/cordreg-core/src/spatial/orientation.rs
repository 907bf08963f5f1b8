//! Three-letter orientation codes.
//!
//! Each letter names the side of the subject an index axis *starts* from:
//! `RPI` has its first axis running right to left, its second posterior to
//! anterior and its third inferior to superior. In the RAS+ world frame an
//! identity direction matrix is therefore `LPI`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Direction3, Vector3};
use crate::image::ImageGeometry;

/// Anatomical side an index axis starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisCode {
    R,
    L,
    A,
    P,
    I,
    S,
}

impl AxisCode {
    /// World axis (0 = x, 1 = y, 2 = z) the code runs along.
    pub fn world_axis(self) -> usize {
        match self {
            AxisCode::R | AxisCode::L => 0,
            AxisCode::A | AxisCode::P => 1,
            AxisCode::I | AxisCode::S => 2,
        }
    }

    /// Sign of the world axis travelled as the index increases.
    pub fn world_sign(self) -> f64 {
        match self {
            AxisCode::L | AxisCode::P | AxisCode::I => 1.0,
            AxisCode::R | AxisCode::A | AxisCode::S => -1.0,
        }
    }

    /// Unit world vector of increasing index.
    pub fn direction(self) -> Vector3 {
        let mut v = Vector3::zeros();
        v[self.world_axis()] = self.world_sign();
        v
    }

    fn from_world(axis: usize, sign: f64) -> Self {
        match (axis, sign >= 0.0) {
            (0, true) => AxisCode::L,
            (0, false) => AxisCode::R,
            (1, true) => AxisCode::P,
            (1, false) => AxisCode::A,
            (_, true) => AxisCode::I,
            (_, false) => AxisCode::S,
        }
    }

    fn letter(self) -> char {
        match self {
            AxisCode::R => 'R',
            AxisCode::L => 'L',
            AxisCode::A => 'A',
            AxisCode::P => 'P',
            AxisCode::I => 'I',
            AxisCode::S => 'S',
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid orientation code {0:?}: expected three letters covering R/L, A/P and I/S")]
pub struct OrientationParseError(pub String);

/// Orientation of the three index axes of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Orientation(pub [AxisCode; 3]);

impl Orientation {
    /// Right-to-left, posterior-to-anterior, inferior-to-superior.
    pub const RPI: Orientation = Orientation([AxisCode::R, AxisCode::P, AxisCode::I]);

    /// Closest orientation code for a direction matrix.
    pub fn from_direction(direction: &Direction3) -> Self {
        let mut codes = [AxisCode::L, AxisCode::P, AxisCode::I];
        let mut used = [false; 3];
        for (c, code) in codes.iter_mut().enumerate() {
            let column = direction.column(c);
            let mut best = None;
            for axis in 0..3 {
                if used[axis] {
                    continue;
                }
                let magnitude = column[axis].abs();
                if best.map_or(true, |(_, m)| magnitude > m) {
                    best = Some((axis, magnitude));
                }
            }
            if let Some((axis, _)) = best {
                used[axis] = true;
                *code = AxisCode::from_world(axis, column[axis]);
            }
        }
        Orientation(codes)
    }

    /// Orientation of a grid.
    pub fn of(geometry: &ImageGeometry) -> Self {
        Self::from_direction(geometry.direction())
    }

    /// Direction matrix whose columns are exactly the axis codes.
    pub fn direction(&self) -> Direction3 {
        Direction3::from_columns(&[self.0[0].direction(), self.0[1].direction(), self.0[2].direction()])
    }

    /// Axis permutation and flips taking a grid in `self` to `target`.
    pub fn plan_to(&self, target: Orientation) -> ReorientPlan {
        let mut permutation = [0usize; 3];
        let mut flip = [false; 3];
        for (i, code) in target.0.iter().enumerate() {
            if let Some(j) = self.0.iter().position(|c| c.world_axis() == code.world_axis()) {
                permutation[i] = j;
                flip[i] = self.0[j] != *code;
            }
        }
        ReorientPlan { permutation, flip }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for code in &self.0 {
            write!(f, "{}", code.letter())?;
        }
        Ok(())
    }
}

impl FromStr for Orientation {
    type Err = OrientationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || OrientationParseError(s.to_string());
        let letters: Vec<char> = s.trim().to_ascii_uppercase().chars().collect();
        if letters.len() != 3 {
            return Err(err());
        }
        let mut codes = [AxisCode::R; 3];
        for (slot, letter) in codes.iter_mut().zip(letters) {
            *slot = match letter {
                'R' => AxisCode::R,
                'L' => AxisCode::L,
                'A' => AxisCode::A,
                'P' => AxisCode::P,
                'I' => AxisCode::I,
                'S' => AxisCode::S,
                _ => return Err(err()),
            };
        }
        let mut seen = [false; 3];
        for code in &codes {
            if std::mem::replace(&mut seen[code.world_axis()], true) {
                return Err(err());
            }
        }
        Ok(Orientation(codes))
    }
}

/// Index remapping between two orientations of the same grid.
///
/// Output axis `i` reads input axis `permutation[i]`, reversed when `flip[i]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReorientPlan {
    pub permutation: [usize; 3],
    pub flip: [bool; 3],
}

impl ReorientPlan {
    pub fn is_identity(&self) -> bool {
        self.permutation == [0, 1, 2] && self.flip == [false; 3]
    }

    /// Shape of the reoriented grid.
    pub fn output_shape(&self, input_shape: [usize; 3]) -> [usize; 3] {
        [
            input_shape[self.permutation[0]],
            input_shape[self.permutation[1]],
            input_shape[self.permutation[2]],
        ]
    }

    /// Input index of the output voxel `index`.
    pub fn source_index(&self, index: [usize; 3], output_shape: [usize; 3]) -> [usize; 3] {
        let mut source = [0usize; 3];
        for i in 0..3 {
            source[self.permutation[i]] = if self.flip[i] {
                output_shape[i] - 1 - index[i]
            } else {
                index[i]
            };
        }
        source
    }

    /// Geometry of the reoriented grid; every voxel keeps its physical position.
    pub fn apply_to_geometry(&self, input: &ImageGeometry) -> ImageGeometry {
        let shape = self.output_shape(input.shape());
        let mut spacing = *input.spacing();
        let mut direction = *input.direction();
        for i in 0..3 {
            let j = self.permutation[i];
            spacing[i] = input.spacing()[j];
            let sign = if self.flip[i] { -1.0 } else { 1.0 };
            direction.set_column(i, &(input.direction().column(j) * sign));
        }
        let origin = input.voxel_to_physical(self.source_index([0, 0, 0], shape));
        ImageGeometry::new(shape, origin, spacing, direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point3, Spacing3};

    #[test]
    fn test_identity_direction_is_lpi() {
        let orientation = Orientation::from_direction(&Direction3::identity());
        assert_eq!(orientation.to_string(), "LPI");
    }

    #[test]
    fn test_rpi_direction() {
        let direction = Orientation::RPI.direction();
        assert_eq!(direction.column(0)[0], -1.0);
        assert_eq!(direction.column(1)[1], 1.0);
        assert_eq!(direction.column(2)[2], 1.0);
        assert_eq!(Orientation::from_direction(&direction), Orientation::RPI);
    }

    #[test]
    fn test_parse_rejects_duplicate_axes() {
        assert!("RPI".parse::<Orientation>().is_ok());
        assert!("asr".parse::<Orientation>().is_ok());
        assert!("RLI".parse::<Orientation>().is_err());
        assert!("RP".parse::<Orientation>().is_err());
        assert!("RPX".parse::<Orientation>().is_err());
    }

    #[test]
    fn test_plan_preserves_physical_positions() {
        let input = ImageGeometry::new(
            [4, 5, 6],
            Point3::new(1.0, 2.0, 3.0),
            Spacing3::new(0.5, 1.0, 2.0),
            "ASL".parse::<Orientation>().unwrap().direction(),
        );
        let plan = Orientation::of(&input).plan_to(Orientation::RPI);
        let output = plan.apply_to_geometry(&input);

        assert_eq!(Orientation::of(&output), Orientation::RPI);
        assert_eq!(output.shape(), [6, 4, 5]);
        for index in [[0, 0, 0], [5, 3, 4], [2, 1, 3]] {
            let source = plan.source_index(index, output.shape());
            let a = output.voxel_to_physical(index);
            let b = input.voxel_to_physical(source);
            assert!((a - b).norm() < 1e-9, "{index:?} -> {source:?}");
        }
    }
}
