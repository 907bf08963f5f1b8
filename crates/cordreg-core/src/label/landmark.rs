//! Landmark labels and label sets.

use std::collections::BTreeMap;

use crate::geometry::{Point3, Vector3};
use crate::image::ImageGeometry;

/// A labelled voxel.
///
/// Values are kept as floating point so that non-integral labels read from
/// disk can be detected and reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    /// Voxel index `(x, y, z)`.
    pub index: [usize; 3],
    /// Label value (vertebral level).
    pub value: f64,
}

impl Landmark {
    pub fn new(index: [usize; 3], value: f64) -> Self {
        Self { index, value }
    }
}

/// The non-zero voxels of a label volume.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LabelSet {
    landmarks: Vec<Landmark>,
}

impl LabelSet {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    /// Collect the non-zero voxels of a `[Z, Y, X]` buffer.
    pub fn from_volume(values: &[f32], geometry: &ImageGeometry) -> Self {
        let landmarks = values
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0.0)
            .map(|(offset, &v)| Landmark::new(geometry.voxel_index(offset), v as f64))
            .collect();
        Self { landmarks }
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Landmark> {
        self.landmarks.iter()
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    /// Landmarks ordered by ascending value.
    pub fn sorted_by_value(&self) -> Vec<Landmark> {
        let mut sorted = self.landmarks.clone();
        sorted.sort_by(|a, b| a.value.total_cmp(&b.value));
        sorted
    }

    /// Distinct values in ascending order.
    pub fn values(&self) -> Vec<f64> {
        let mut values: Vec<f64> = self.landmarks.iter().map(|l| l.value).collect();
        values.sort_by(f64::total_cmp);
        values.dedup();
        values
    }

    pub fn max_value(&self) -> Option<f64> {
        self.landmarks.iter().map(|l| l.value).max_by(f64::total_cmp)
    }

    pub fn contains_value(&self, value: f64) -> bool {
        self.landmarks.iter().any(|l| l.value == value)
    }

    /// Keep only landmarks whose value also occurs in `reference`.
    pub fn retain_matching(&self, reference: &LabelSet) -> LabelSet {
        let landmarks = self
            .landmarks
            .iter()
            .filter(|l| reference.contains_value(l.value))
            .copied()
            .collect();
        LabelSet { landmarks }
    }

    /// A new set with one more landmark.
    pub fn with_landmark(&self, landmark: Landmark) -> LabelSet {
        let mut landmarks = self.landmarks.clone();
        landmarks.push(landmark);
        LabelSet { landmarks }
    }

    /// Physical centroid of the voxels of each value, ordered by value.
    ///
    /// Dilated or resampled labels cover several voxels; the centroid is the
    /// landmark position used for point-based alignment.
    pub fn centroids(&self, geometry: &ImageGeometry) -> Vec<(f64, Point3)> {
        let mut groups: BTreeMap<i64, (f64, Vector3, usize)> = BTreeMap::new();
        for landmark in &self.landmarks {
            let p = geometry.voxel_to_physical(landmark.index);
            let entry = groups
                .entry((landmark.value * 1000.0).round() as i64)
                .or_insert((landmark.value, Vector3::zeros(), 0));
            entry.1 += p.coords;
            entry.2 += 1;
        }
        groups
            .into_values()
            .map(|(value, sum, count)| (value, Point3::from(sum / count as f64)))
            .collect()
    }

    /// Paint the landmarks into a zero `[Z, Y, X]` buffer of `geometry`.
    ///
    /// Landmarks outside the grid are skipped.
    pub fn paint(&self, geometry: &ImageGeometry) -> Vec<f32> {
        let mut values = vec![0.0f32; geometry.voxel_count()];
        let shape = geometry.shape();
        for landmark in &self.landmarks {
            if landmark.index.iter().zip(shape.iter()).all(|(&i, &n)| i < n) {
                values[geometry.linear_index(landmark.index)] = landmark.value as f32;
            }
        }
        values
    }
}

impl FromIterator<Landmark> for LabelSet {
    fn from_iter<I: IntoIterator<Item = Landmark>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_volume_and_paint_roundtrip() {
        let geometry = ImageGeometry::with_shape([5, 4, 3]);
        let labels = LabelSet::new(vec![Landmark::new([1, 2, 0], 3.0), Landmark::new([4, 0, 2], 5.0)]);
        let painted = labels.paint(&geometry);
        let back = LabelSet::from_volume(&painted, &geometry);
        assert_eq!(back.sorted_by_value(), labels.sorted_by_value());
    }

    #[test]
    fn test_retain_matching() {
        let template = LabelSet::new((1..=6).map(|v| Landmark::new([0, 0, v], v as f64)).collect());
        let subject = LabelSet::new(vec![Landmark::new([1, 1, 1], 2.0), Landmark::new([1, 1, 5], 5.0)]);
        assert_eq!(template.retain_matching(&subject).values(), vec![2.0, 5.0]);
    }

    #[test]
    fn test_centroids_average_by_value() {
        let geometry = ImageGeometry::with_shape([10, 10, 10]);
        let labels = LabelSet::new(vec![
            Landmark::new([2, 2, 2], 1.0),
            Landmark::new([4, 2, 2], 1.0),
            Landmark::new([5, 5, 8], 2.0),
        ]);
        let centroids = labels.centroids(&geometry);
        assert_eq!(centroids.len(), 2);
        assert_eq!(centroids[0].0, 1.0);
        assert!((centroids[0].1 - Point3::new(3.0, 2.0, 2.0)).norm() < 1e-12);
        assert!((centroids[1].1 - Point3::new(5.0, 5.0, 8.0)).norm() < 1e-12);
    }
}
