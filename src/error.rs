//! Boundary error type: every handler returns `Result<_, AppError>`, and
//! `AppError` maps to the HTTP statuses in spec §7.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub enum AppError {
    /// 400 — address format, unknown metric, out-of-range limit, malformed
    /// boolean/number query params.
    Validation(String),
    /// 502 — transport failure, non-JSON body, or non-2xx upstream response.
    Upstream(String),
    /// 404 — only for DELETE /v1/users/:user on an unknown address.
    NotFound(String),
    /// 500 — unanticipated failure; the real cause is logged, not leaked.
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Upstream(msg) => {
                error!(detail = %msg, "upstream call failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "upstream exchange request failed".to_string(),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(err) => {
                error!(error = ?err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": status.as_u16(), "message": message }))).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}
