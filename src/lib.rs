pub mod api;
pub mod classifier;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod labels;
pub mod metrics;
pub mod pool;
pub mod staging;

// Re-export commonly used types for easier testing
pub use crate::classifier::{ClassificationResult, ImageClassifier, ImageUpload, RequestState};
pub use crate::decision::{decide, Decision, CONFIDENCE_THRESHOLD, NO_MATCH_LABEL};
pub use crate::engine::{ImageSettings, InferenceEngine, OnnxEngine};
pub use crate::error::{ClassifyError, DecisionError, ErrorKind, LabelError, PoolError, StagingError};
pub use crate::labels::LabelSet;
pub use crate::pool::{EnginePool, PoolStats};
pub use crate::staging::{StagedImage, TempArtifactStore};
