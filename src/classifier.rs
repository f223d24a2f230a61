//! Classification Request Handler
//!
//! Orchestrates one request: stage the upload, predict on a pooled engine,
//! apply the decision policy, release the staged file, answer. The staged
//! file is owned by a drop guard, so every failure after staging still
//! removes it before the error reaches the caller.

use crate::decision::decide;
use crate::engine::InferenceEngine;
use crate::error::{ClassifyError, DecisionError, ErrorKind, StagingError};
use crate::labels::LabelSet;
use crate::metrics::{Timer, CLASSIFY_REQUESTS};
use crate::pool::EnginePool;
use crate::staging::TempArtifactStore;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Raw upload as received from the transport
#[derive(Debug, Clone, Default)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    /// Client supplied filename. Untrusted; only its extension is ever used.
    pub file_name: Option<String>,
}

impl ImageUpload {
    pub fn new(bytes: impl Into<Vec<u8>>, file_name: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            file_name,
        }
    }
}

/// Response record for a classified image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    /// Generated name of the staged artifact
    pub image_path: String,
    pub predicted_label: String,
    pub probability: f32,
}

/// Request lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Staged,
    Predicting,
    Deciding,
    Completed,
    Failed(ErrorKind),
}

/// Tracks and logs the state of a single request
#[derive(Debug)]
pub struct RequestTracker {
    request_id: Uuid,
    state: RequestState,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            state: RequestState::Received,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    fn advance(&mut self, next: RequestState) {
        debug!(request_id = %self.request_id, "Request state transition: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

struct ClassifierInner<E> {
    store: TempArtifactStore,
    pool: EnginePool<E>,
    labels: Arc<LabelSet>,
    contract_broken: AtomicBool,
}

/// Stage → infer → decide → release pipeline shared by all requests
pub struct ImageClassifier<E> {
    inner: Arc<ClassifierInner<E>>,
}

impl<E> Clone for ImageClassifier<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: InferenceEngine> ImageClassifier<E> {
    pub fn new(store: TempArtifactStore, pool: EnginePool<E>, labels: Arc<LabelSet>) -> Self {
        Self {
            inner: Arc::new(ClassifierInner {
                store,
                pool,
                labels,
                contract_broken: AtomicBool::new(false),
            }),
        }
    }

    pub fn pool(&self) -> &EnginePool<E> {
        &self.inner.pool
    }

    pub fn labels(&self) -> &LabelSet {
        &self.inner.labels
    }

    /// True once the model produced output that does not match the label table
    pub fn is_locked_out(&self) -> bool {
        self.inner.contract_broken.load(Ordering::SeqCst)
    }

    /// Run the full pipeline for one upload.
    ///
    /// The work happens on a dedicated task, so dropping the returned future
    /// never cancels a prediction that is already underway or removes its
    /// staged file early.
    pub async fn classify(&self, upload: ImageUpload) -> Result<ClassificationResult, ClassifyError> {
        let classifier = self.clone();
        tokio::spawn(async move { classifier.process(upload).await })
            .await
            .map_err(|e| ClassifyError::TaskAborted(e.to_string()))?
    }

    async fn process(&self, upload: ImageUpload) -> Result<ClassificationResult, ClassifyError> {
        let mut tracker = RequestTracker::new();
        let span = tracing::info_span!("classify", request_id = %tracker.request_id());

        let result = self.run(&mut tracker, upload).instrument(span).await;

        match result {
            Ok((res, confident)) => {
                let outcome = if confident { "confident" } else { "no_match" };
                CLASSIFY_REQUESTS.with_label_values(&[outcome]).inc();
                Ok(res)
            }
            Err(e) => {
                tracker.advance(RequestState::Failed(e.kind()));
                CLASSIFY_REQUESTS.with_label_values(&[e.kind().as_str()]).inc();
                match e.kind() {
                    ErrorKind::BadInput => debug!(request_id = %tracker.request_id(), error = %e, "Rejected upload"),
                    _ => warn!(request_id = %tracker.request_id(), error = %e, "Classification failed"),
                }
                Err(e)
            }
        }
    }

    /// Returns the response record and whether the policy found a confident label
    async fn run(
        &self,
        tracker: &mut RequestTracker,
        upload: ImageUpload,
    ) -> Result<(ClassificationResult, bool), ClassifyError> {
        if self.is_locked_out() {
            return Err(ClassifyError::ContractLockout);
        }
        if upload.bytes.is_empty() {
            return Err(StagingError::BadInput("empty image payload".to_string()).into());
        }

        let staged = self
            .inner
            .store
            .stage(&upload.bytes, upload.file_name.as_deref())
            .await?;
        tracker.advance(RequestState::Staged);

        tracker.advance(RequestState::Predicting);
        info!(image_id = %staged.id(), "Start processing image...");
        let timer = Timer::new();
        let scores = self.inner.pool.predict(&staged).await?;
        info!(image_id = %staged.id(), "Image processed in {} milliseconds", timer.elapsed_ms());

        tracker.advance(RequestState::Deciding);
        let decision = decide(&scores, &self.inner.labels).map_err(|e| {
            if let DecisionError::LengthMismatch { scores, labels } = e {
                self.inner.contract_broken.store(true, Ordering::SeqCst);
                error!(
                    scores,
                    labels,
                    "Model output does not match label table, refusing further classification"
                );
            }
            e
        })?;

        let result = ClassificationResult {
            image_path: staged.file_name().to_string(),
            predicted_label: decision.label,
            probability: decision.probability,
        };

        self.inner.store.release(staged);
        tracker.advance(RequestState::Completed);
        Ok((result, decision.confident))
    }
}
