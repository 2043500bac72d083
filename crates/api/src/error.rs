use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use sketchflow_core::error::CoreError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `sketchflow_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The upload exceeded the configured size limit.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::AdmissionRejected { .. } => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "ADMISSION_REJECTED",
                    core.to_string(),
                ),
                CoreError::SessionNotFound(_) => {
                    (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND", core.to_string())
                }
                CoreError::ResultMissing(_) => {
                    (StatusCode::NOT_FOUND, "RESULT_NOT_FOUND", core.to_string())
                }
                CoreError::Validation(msg) | CoreError::InvalidFrame(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::EngineSubmitFailed(_) | CoreError::EngineReportedError(_) => {
                    tracing::warn!(error = %core, "Engine error reached an HTTP handler");
                    (StatusCode::BAD_GATEWAY, "ENGINE_ERROR", core.to_string())
                }
                CoreError::ChannelClosed
                | CoreError::IllegalTransition { .. }
                | CoreError::Internal(_) => {
                    tracing::error!(error = %core, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg.clone())
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
