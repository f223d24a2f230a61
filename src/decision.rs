//! Label Decision Policy
//!
//! Picks the highest score and reports its label only when it clears the
//! confidence threshold. Ties go to the lowest index. NaN scores never win.

use crate::error::DecisionError;
use crate::labels::LabelSet;

/// Scores must be strictly greater than this to be reported as a label
pub const CONFIDENCE_THRESHOLD: f32 = 0.7;

/// Label reported when no score clears the threshold
pub const NO_MATCH_LABEL: &str = "None";

/// Outcome of the decision policy
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Winning label, or `NO_MATCH_LABEL`
    pub label: String,
    /// Highest score in the vector, reported either way
    pub probability: f32,
    /// Index of the highest score
    pub index: usize,
    pub confident: bool,
}

/// Index and value of the first maximum, skipping NaN
pub fn argmax(scores: &[f32]) -> Result<(usize, f32), DecisionError> {
    if scores.is_empty() {
        return Err(DecisionError::EmptyVector);
    }

    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            // strict > keeps the first occurrence on ties
            Some((_, max)) if score <= max => {}
            _ => best = Some((idx, score)),
        }
    }

    best.ok_or(DecisionError::NonFiniteScores)
}

/// Apply the threshold policy to a probability vector
pub fn decide(scores: &[f32], labels: &LabelSet) -> Result<Decision, DecisionError> {
    if scores.is_empty() {
        return Err(DecisionError::EmptyVector);
    }
    if scores.len() != labels.len() {
        return Err(DecisionError::LengthMismatch {
            scores: scores.len(),
            labels: labels.len(),
        });
    }

    let (index, max) = argmax(scores)?;

    if max > CONFIDENCE_THRESHOLD {
        let label = labels.get(index).map_err(|_| DecisionError::LengthMismatch {
            scores: scores.len(),
            labels: labels.len(),
        })?;
        Ok(Decision {
            label: label.to_string(),
            probability: max,
            index,
            confident: true,
        })
    } else {
        Ok(Decision {
            label: NO_MATCH_LABEL.to_string(),
            probability: max,
            index,
            confident: false,
        })
    }
}
