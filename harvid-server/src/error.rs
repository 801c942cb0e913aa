//! Maps `harvid_core::Error` (and any other failure reaching a handler) onto
//! an HTTP status + small body, wrapping `anyhow::Error` the way domain
//! errors are usually threaded through an `axum` boundary. Each §7 error
//! kind gets its own status instead of a blanket `500`.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use harvid_core::Error as CoreError;
use serde_json::json;

pub struct AppError(pub anyhow::Error);

pub type AppResult<T> = Result<T, AppError>;

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<CoreError>() {
            Some(CoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(CoreError::Forbidden(_)) => StatusCode::FORBIDDEN,
            Some(CoreError::BadRequest(_)) => StatusCode::BAD_REQUEST,
            Some(CoreError::Unsupported(_)) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Some(CoreError::DecodeFailed(_)) => StatusCode::BAD_GATEWAY,
            Some(CoreError::Internal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let kind = self
            .0
            .downcast_ref::<CoreError>()
            .map(CoreError::kind_name)
            .unwrap_or("internal");

        (
            status,
            Json(json!({ "error": kind, "message": self.0.to_string() })),
        )
            .into_response()
    }
}
