use thiserror::Error;

/// Errors raised while checking landmark labels.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LabelError {
    /// The label volume does not hold exactly the expected number of labels.
    #[error("Label count error: expected exactly {expected} labels, found {found}")]
    Count { expected: usize, found: usize },

    /// A label value is not an integer.
    #[error("Label type error: label value {value} is not an integer")]
    Type { value: f64 },

    /// Two labels share the same value.
    #[error("Label uniqueness error: label value {value} appears more than once")]
    Uniqueness { value: f64 },

    /// The subject references a vertebral level the template does not provide.
    #[error(
        "Label correspondence error: subject label {subject_max} exceeds the highest template label {template_max}"
    )]
    Correspondence { subject_max: f64, template_max: f64 },

    /// A synthesized label would fall outside the grid.
    #[error("Label placement error: synthetic label at {index:?} lies outside a grid of shape {shape:?}")]
    Placement { index: [i64; 3], shape: [usize; 3] },
}
