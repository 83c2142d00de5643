//! Structured JSON error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use bikeshare_common::BikeshareError;

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// JSON body returned for every failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code, e.g. `invalid_filter`.
    pub code: String,
    /// HTTP reason phrase.
    pub title: String,
    pub status: u16,
    pub detail: String,
}

impl ErrorBody {
    pub fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            title: status.canonical_reason().unwrap_or("Error").to_string(),
            status: status.as_u16(),
            detail: detail.into(),
        }
    }
}

/// Handler error wrapper mapping domain errors onto HTTP responses.
#[derive(Debug)]
pub struct ApiError(pub BikeshareError);

impl From<BikeshareError> for ApiError {
    fn from(err: BikeshareError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error_response(&self.0)
    }
}

/// Build the response for `err`.
///
/// Client errors carry the full message. Server errors are logged in full
/// and answered with a generic detail so internals do not leak.
pub fn error_response(err: &BikeshareError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let code = err.error_code();

    counter!("usage_api_errors_total", "code" => code).increment(1);

    let detail = if err.is_client_error() {
        debug!(code, error = %err, "Rejected request");
        err.to_string()
    } else {
        error!(code, error = %err, "Request failed");
        match err {
            BikeshareError::Retrieval(_) => "Usage data is temporarily unavailable".to_string(),
            BikeshareError::Export(_) => "Failed to build the export".to_string(),
            _ => "Failed to query usage data".to_string(),
        }
    };

    (status, Json(ErrorBody::new(status, code, detail))).into_response()
}
