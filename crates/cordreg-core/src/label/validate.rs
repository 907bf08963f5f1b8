//! Landmark label validation.

use super::error::LabelError;
use super::landmark::{LabelSet, Landmark};

/// Number of landmark labels a subject must provide.
pub const EXPECTED_LANDMARKS: usize = 2;

/// Check a subject label set before any registration work starts.
///
/// Landmarks are ordered by ascending value, then checked for count,
/// integrality and distinctness, in that order. The first violation is
/// reported.
pub fn validate_landmark_pair(labels: &LabelSet) -> Result<[Landmark; 2], LabelError> {
    let sorted = labels.sorted_by_value();
    if sorted.len() != EXPECTED_LANDMARKS {
        return Err(LabelError::Count {
            expected: EXPECTED_LANDMARKS,
            found: sorted.len(),
        });
    }

    if let Some(bad) = sorted.iter().find(|l| l.value.fract() != 0.0 || !l.value.is_finite()) {
        return Err(LabelError::Type { value: bad.value });
    }

    if sorted[0].value == sorted[1].value {
        return Err(LabelError::Uniqueness { value: sorted[0].value });
    }

    Ok([sorted[0], sorted[1]])
}

/// The subject may only reference levels the template provides.
pub fn check_correspondence(subject: &LabelSet, template: &LabelSet) -> Result<(), LabelError> {
    let subject_max = subject.max_value().unwrap_or(0.0);
    let template_max = template.max_value().unwrap_or(0.0);
    if subject_max > template_max {
        return Err(LabelError::Correspondence {
            subject_max,
            template_max,
        });
    }
    Ok(())
}
