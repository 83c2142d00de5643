//! Error types for the bike-share usage services.

use thiserror::Error;

/// Result type alias using BikeshareError.
pub type BikeResult<T> = Result<T, BikeshareError>;

/// Primary error type for snapshot, query and export operations.
#[derive(Debug, Error)]
pub enum BikeshareError {
    // === Client Errors ===
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Unknown station: {0}")]
    UnknownStation(String),

    #[error("Missing or invalid API key")]
    Unauthorized,

    // === Data Errors ===
    #[error("Snapshot retrieval failed: {0}")]
    Retrieval(String),

    #[error("Data store unavailable: {0}")]
    Connection(String),

    // === Export Errors ===
    #[error("Export failed: {0}")]
    Export(String),

    #[error("Export too large: {rows} rows exceeds the limit of {limit}")]
    ExportTooLarge { rows: u64, limit: u64 },

    // === Infrastructure Errors ===
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BikeshareError {
    /// Shorthand for an invalid parameter error.
    pub fn invalid(param: impl Into<String>, message: impl Into<String>) -> Self {
        BikeshareError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code carried in error bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            BikeshareError::MissingParameter(_) => "missing_parameter",
            BikeshareError::InvalidParameter { .. } => "invalid_parameter",
            BikeshareError::InvalidFilter(_) => "invalid_filter",
            BikeshareError::UnknownStation(_) => "unknown_station",
            BikeshareError::Unauthorized => "unauthorized",
            BikeshareError::Retrieval(_) => "retrieval_error",
            BikeshareError::Connection(_) => "connection_error",
            BikeshareError::Export(_) => "export_error",
            BikeshareError::ExportTooLarge { .. } => "export_too_large",
            BikeshareError::Config(_) => "config_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            BikeshareError::MissingParameter(_)
            | BikeshareError::InvalidParameter { .. }
            | BikeshareError::InvalidFilter(_) => 400,

            BikeshareError::Unauthorized => 401,
            BikeshareError::UnknownStation(_) => 404,
            BikeshareError::ExportTooLarge { .. } => 413,
            BikeshareError::Retrieval(_) => 503,

            _ => 500,
        }
    }

    /// Whether the error was caused by the request rather than the service.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status_code())
    }
}
