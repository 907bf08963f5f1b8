//! Composite transform implementation.
//!
//! Generalizes a two-stage chain to any number of stages:
//! T(x) = Tn(...T2(T1(x)))

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::trait_::Transform;

/// Sequence of transforms evaluated in order.
///
/// `stages[0]` is applied first. Resampling through a chain of pull-back
/// warps listed source-to-destination therefore pushes them in reverse.
pub struct CompositeTransform<B: Backend> {
    stages: Vec<Box<dyn Transform<B>>>,
}

impl<B: Backend> CompositeTransform<B> {
    /// An empty composite (identity).
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage evaluated after all existing ones.
    pub fn push(&mut self, stage: Box<dyn Transform<B>>) {
        self.stages.push(stage);
    }

    /// Builder form of [`CompositeTransform::push`].
    pub fn then(mut self, stage: Box<dyn Transform<B>>) -> Self {
        self.push(stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl<B: Backend> Default for CompositeTransform<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Transform<B> for CompositeTransform<B> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        self.stages
            .iter()
            .fold(points, |acc, stage| stage.transform_points(acc))
    }

    /// Inverse of every stage, in reverse order; `None` if any stage is not
    /// invertible.
    fn inverse(&self) -> Option<Box<dyn Transform<B>>> {
        let mut inverse = CompositeTransform::new();
        for stage in self.stages.iter().rev() {
            inverse.push(stage.inverse()?);
        }
        Some(Box::new(inverse))
    }
}
