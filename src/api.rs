//! HTTP surface
//!
//! `POST /api/imageclassification/classifyimage` takes a multipart upload in
//! the `imageFile` field. Liveness and metrics endpoints never touch the
//! classification pipeline.

use crate::classifier::{ClassificationResult, ImageClassifier, ImageUpload};
use crate::engine::InferenceEngine;
use crate::error::{ClassifyError, ErrorKind, StagingError};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Multipart field carrying the image
pub const IMAGE_FIELD: &str = "imageFile";

pub fn create_router<E: InferenceEngine>(classifier: ImageClassifier<E>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/imageclassification", get(heartbeat_handler))
        .route("/api/imageclassification/classifyimage", post(classify_image_handler::<E>))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(classifier)
}

/// Errors rendered as a status code and a generic JSON message
#[derive(Debug)]
pub enum ApiError {
    /// The pipeline rejected or failed the request
    Classify(ClassifyError),
    /// The multipart body itself could not be read
    Upload { status: StatusCode, message: &'static str },
}

impl From<ClassifyError> for ApiError {
    fn from(err: ClassifyError) -> Self {
        ApiError::Classify(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        let status = err.status();
        debug!(status = %status, error = %err.body_text(), "Unreadable multipart body");
        let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "image upload exceeds the size limit"
        } else {
            "malformed multipart body"
        };
        ApiError::Upload { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Classify(err) => {
                let status = match err.kind() {
                    ErrorKind::BadInput => StatusCode::BAD_REQUEST,
                    ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.public_message())
            }
            ApiError::Upload { status, message } => (*status, *message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn bad_input(reason: impl Into<String>) -> ApiError {
    ApiError::Classify(ClassifyError::Staging(StagingError::BadInput(reason.into())))
}

/// Pull the image out of the multipart body. Falls back to the first file
/// field when none is named `imageFile`.
async fn read_upload(mut multipart: Multipart) -> Result<ImageUpload, ApiError> {
    let mut fallback: Option<ImageUpload> = None;

    while let Some(field) = multipart.next_field().await? {
        let is_image_field = field.name() == Some(IMAGE_FIELD);
        let file_name = field.file_name().map(str::to_string);
        if !is_image_field && (file_name.is_none() || fallback.is_some()) {
            continue;
        }

        let bytes = field.bytes().await?;
        let upload = ImageUpload::new(bytes.to_vec(), file_name);

        if is_image_field {
            return Ok(upload);
        }
        fallback = Some(upload);
    }

    fallback.ok_or_else(|| bad_input("no image file in request"))
}

async fn classify_image_handler<E: InferenceEngine>(
    State(classifier): State<ImageClassifier<E>>,
    multipart: Multipart,
) -> Result<Json<ClassificationResult>, ApiError> {
    let upload = read_upload(multipart).await?;
    debug!(bytes = upload.bytes.len(), "Received image upload");

    let result = classifier.classify(upload).await?;
    Ok(Json(result))
}

/// Heart beat acknowledgement
async fn heartbeat_handler() -> Json<[&'static str; 2]> {
    Json(["ACK Heart beat 1", "ACK Heart beat 2"])
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Prometheus metrics endpoint
async fn metrics_handler() -> String {
    crate::metrics::export_metrics()
}
