//! Maps `rd_core::Error` onto HTTP responses (spec §7). Every handler
//! returns `Result<_, ApiError>`; library-crate errors convert into
//! `rd_core::Error` at their own boundary and arrive here already typed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

pub struct ApiError(pub rd_core::Error);

impl From<rd_core::Error> for ApiError {
    fn from(err: rd_core::Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if matches!(status, StatusCode::INTERNAL_SERVER_ERROR) {
            tracing::error!(error = %self.0, "internal error");
        }
        (status, Json(self.0.to_api_error())).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
