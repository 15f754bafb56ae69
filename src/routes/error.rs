use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::db::StoreError;
use crate::services::delivery::DeliveryError;
use crate::services::submission::SubmitError;

/// Every failure a route can report, mapped to one HTTP response shape:
/// `{"error": "<code>", "message": "<text>"}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidAppUrl(String),

    #[error("{0}")]
    QuotaDenied(String),

    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    JobNotReady(String),

    #[error("archive is missing")]
    ArtifactMissing,

    #[error("{0}")]
    ServiceBusy(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ApiError::InvalidAppUrl(_) => (StatusCode::BAD_REQUEST, "invalid_app_url"),
            ApiError::QuotaDenied(_) => (StatusCode::FORBIDDEN, "quota_denied"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::JobNotReady(_) => (StatusCode::BAD_REQUEST, "job_not_ready"),
            ApiError::ArtifactMissing => (StatusCode::INTERNAL_SERVER_ERROR, "artifact_missing"),
            ApiError::ServiceBusy(_) => (StatusCode::SERVICE_UNAVAILABLE, "service_busy"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Validation(msg) => ApiError::Validation(msg),
            SubmitError::InvalidAppUrl(e) => ApiError::InvalidAppUrl(e.to_string()),
            SubmitError::QuotaDenied(reason) => ApiError::QuotaDenied(reason),
            SubmitError::Busy => ApiError::ServiceBusy(SubmitError::Busy.to_string()),
            SubmitError::Store(e) => e.into(),
        }
    }
}

impl From<DeliveryError> for ApiError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::NotFound => ApiError::NotFound,
            DeliveryError::NotReady(_) => ApiError::JobNotReady(err.to_string()),
            DeliveryError::ArtifactMissing(_) => ApiError::ArtifactMissing,
            DeliveryError::Store(e) => e.into(),
            DeliveryError::Storage(e) => ApiError::Internal(e.to_string()),
        }
    }
}
