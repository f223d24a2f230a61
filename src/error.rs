//! Error Types for the Classification Pipeline
//!
//! Each stage of the pipeline owns its error enum; `ClassifyError` is the
//! request-level union that the HTTP layer maps onto a status code.

use std::path::PathBuf;
use thiserror::Error;

/// Label file loading and lookup errors
#[derive(Error, Debug)]
pub enum LabelError {
    #[error("Configuration error: cannot read label file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: label file {path} contains no labels")]
    Empty { path: PathBuf },

    #[error("Configuration error: label file {path} has a blank label at line {line}")]
    BlankLabel { path: PathBuf, line: usize },

    #[error("Label index {index} out of range for {len} labels")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Upload staging errors
#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("Unsupported image extension: {0}")]
    UnsupportedExtension(String),

    #[error("Staging I/O failed: {operation} {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Engine pool errors
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Inference failed on slot {slot}: {source}")]
    Inference {
        slot: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Engine pool exhausted: no slot freed within {timeout_ms}ms")]
    Exhausted { timeout_ms: u64 },

    #[error("Engine pool closed")]
    Closed,

    #[error("Engine construction failed for slot {slot}: {source}")]
    Construction {
        slot: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Engine pool size must be at least 1")]
    EmptyPool,
}

/// Label decision errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecisionError {
    #[error("Probability vector is empty")]
    EmptyVector,

    #[error("Model contract violation: {scores} scores for {labels} labels")]
    LengthMismatch { scores: usize, labels: usize },

    #[error("Probability vector contains no finite score")]
    NonFiniteScores,
}

/// Outcome class used for status mapping and metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Client-correctable input problem
    BadInput,
    /// Service cannot take the request right now
    Unavailable,
    /// Server-side failure
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadInput => "bad_input",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Request-level error surfaced by the classifier
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Decision error: {0}")]
    Decision(#[from] DecisionError),

    #[error("Classifier refusing traffic after model contract violation")]
    ContractLockout,

    #[error("Classification task aborted: {0}")]
    TaskAborted(String),
}

impl ClassifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClassifyError::Staging(StagingError::BadInput(_))
            | ClassifyError::Staging(StagingError::UnsupportedExtension(_)) => ErrorKind::BadInput,
            ClassifyError::Pool(PoolError::Exhausted { .. }) | ClassifyError::ContractLockout => {
                ErrorKind::Unavailable
            }
            _ => ErrorKind::Internal,
        }
    }

    /// True when the model's output no longer matches the label table
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            ClassifyError::Decision(DecisionError::LengthMismatch { .. })
        )
    }

    /// Message safe to return to the caller. Never includes paths or model detail.
    pub fn public_message(&self) -> &'static str {
        match self {
            ClassifyError::Staging(StagingError::BadInput(_)) => "image upload is empty or missing",
            ClassifyError::Staging(StagingError::UnsupportedExtension(_)) => {
                "unsupported image file extension"
            }
            ClassifyError::Pool(PoolError::Exhausted { .. }) => {
                "classification capacity exhausted, retry later"
            }
            ClassifyError::ContractLockout => "classification is unavailable",
            _ => "the image could not be processed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let bad = ClassifyError::from(StagingError::BadInput("empty".into()));
        assert_eq!(bad.kind(), ErrorKind::BadInput);

        let ext = ClassifyError::from(StagingError::UnsupportedExtension("exe".into()));
        assert_eq!(ext.kind(), ErrorKind::BadInput);

        let exhausted = ClassifyError::from(PoolError::Exhausted { timeout_ms: 10 });
        assert_eq!(exhausted.kind(), ErrorKind::Unavailable);

        let inference = ClassifyError::from(PoolError::Inference {
            slot: 0,
            source: anyhow::anyhow!("corrupt image"),
        });
        assert_eq!(inference.kind(), ErrorKind::Internal);

        let empty = ClassifyError::from(DecisionError::EmptyVector);
        assert_eq!(empty.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_public_message_hides_internals() {
        let err = ClassifyError::from(StagingError::Io {
            operation: "write",
            path: PathBuf::from("/srv/secret/tmp/abc.png"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        });
        let msg = err.public_message();
        assert!(!msg.contains("/srv"));
        assert!(!msg.contains("disk full"));
        // The internal Display still carries the detail for logs
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_contract_violation_detection() {
        let err = ClassifyError::from(DecisionError::LengthMismatch { scores: 3, labels: 4 });
        assert!(err.is_contract_violation());
        assert!(!ClassifyError::from(DecisionError::EmptyVector).is_contract_violation());
    }
}
