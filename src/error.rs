//! # Error Handling
//!
//! Two families of errors live here:
//!
//! - **DecodeError**: everything that can go wrong while turning one raw response
//!   chunk into samples. These are always *local and recoverable*: the chunk is
//!   dropped, a warning is logged and the stream keeps going.
//! - **AppError**: errors surfaced through the HTTP API, converted into JSON
//!   responses by implementing actix's `ResponseError`.
//!
//! ## Rust Concepts:
//! - **thiserror**: derives `std::error::Error` and `Display` from the
//!   `#[error(...)]` attributes, so each variant documents its own message
//! - **From trait**: lets `?` convert library errors into `AppError` automatically

use crate::audio::session::SessionError;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Reasons a response chunk could not be decoded into audio.
///
/// None of these are fatal. The reassembler logs them, counts the chunk as
/// rejected and continues with the next one, leaving previously buffered audio
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes than the canonical 44-byte header.
    #[error("chunk too short for an audio header: {len} bytes (need at least {min})")]
    TooShort { len: usize, min: usize },

    /// The outer "RIFF" or inner "WAVE" tag did not match.
    #[error("invalid container: expected {expected:?} at offset {offset}, found {found:?}")]
    InvalidContainer {
        expected: &'static str,
        found: String,
        offset: usize,
    },

    /// No "data" sub-chunk could be located within the input.
    #[error("no 'data' sub-chunk found after offset {searched_from}")]
    MissingDataChunk { searched_from: usize },

    /// Format code other than linear PCM (1).
    #[error("unsupported audio format code {format_code} (only PCM = 1 is supported)")]
    UnsupportedFormat { format_code: u16 },

    /// Bit depth other than 8 or 16.
    #[error("unsupported sample width: {bits_per_sample} bits per sample")]
    UnsupportedSampleWidth { bits_per_sample: u16 },

    /// Declared payload size disagrees with the bytes received. Only produced
    /// under the strict size policy; the lenient policy corrects it instead.
    #[error("declared payload size {declared} does not fit the {available} bytes available")]
    InconsistentSize { declared: i64, available: usize },
}

/// Custom error types for the HTTP API.
///
/// ## Error Categories:
/// - **Internal**: Server-side problems (500 errors)
/// - **BadRequest**: Client sent invalid data (400 errors)
/// - **NotFound**: Requested session or resource doesn't exist (404 errors)
/// - **ConfigError**: Configuration problems (500 errors)
/// - **ValidationError**: Data validation failed (400 errors)
/// - **Conflict**: Resource limit or duplicate id (409 errors)
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl AppError {
    fn parts(&self) -> (actix_web::http::StatusCode, &'static str, String) {
        use actix_web::http::StatusCode;

        match self {
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::ConfigError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg.clone())
            }
            AppError::ValidationError(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
        }
    }
}

/// Converts our errors into HTTP responses.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "not_found",
///     "message": "Session 'npc-7' not found",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        self.parts().0
    }

    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = self.parts();

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors are almost always the client's fault, so they become
/// a 400 rather than a 500.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(_) => AppError::NotFound(err.to_string()),
            SessionError::LimitReached { .. } | SessionError::DuplicateId(_) => {
                AppError::Conflict(err.to_string())
            }
        }
    }
}
