use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::classify::{self, FailureKind};
use crate::store::StoreError;
use crate::upload::Rejection;
use crate::worker_pool::PoolError;

pub type Result<T> = core::result::Result<T, ApiError>;

/// Every way an API request can fail. Rendered as `{"detail": "..."}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("upload rejected: {0}")]
    Rejected(#[from] Rejection),
    /// Failure text from the comparison engine or the worker running it.
    #[error("verification failed: {0}")]
    Engine(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PoolError> for ApiError {
    fn from(err: PoolError) -> Self {
        Self::Engine(err.to_string())
    }
}

impl ApiError {
    pub fn client_status_and_detail(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Rejected(rejection) => {
                (StatusCode::BAD_REQUEST, classify::rejection_detail(*rejection))
            }
            Self::Engine(message) => {
                let kind = classify::classify_engine_failure(message);
                let status = match kind {
                    FailureKind::NoFaceDetected => StatusCode::BAD_REQUEST,
                    FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, kind.detail())
            }
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, classify::INTERNAL_DETAIL),
            Self::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Status store unavailable"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = self.client_status_and_detail();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::info!(error = %self, %status, "request rejected");
        }
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
