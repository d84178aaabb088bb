//! # Error Handling
//!
//! This module defines the error kinds of the upload pipeline and how they're
//! converted to HTTP responses.
//!
//! ## Pipeline order:
//! Errors are listed in the order the pipeline can detect them:
//! `PayloadTooLarge` → `BadRequest` → `SniffFailure` → `UnsupportedMediaType`
//! → `StorageError` → `UpstreamUnreachable` → `UpstreamError` → `ResponseParseError`.
//!
//! ## Response format:
//! Pipeline failures are answered with a plain-text body. Clients of `/upload-audio`
//! read `response.text()` on any non-2xx status, so a JSON envelope would only get
//! in their way.
//!
//! ## Key Rust Concepts:
//! - **Display trait**: Defines the exact message the HTTP caller sees
//! - **ResponseError trait**: Converts errors to HTTP responses automatically
//! - **From trait**: Lets `?` convert library errors into `AppError`

use actix_web::http::{header::ContentType, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use std::fmt;

/// Every way a request can fail.
///
/// ## Status code classes:
/// - Caller-caused validation failures → 4xx
/// - Storage, sniffing and configuration failures → 500
/// - Anything that went wrong talking to the engine → 502
///
/// ## Usage Example:
/// ```rust
/// return Err(AppError::UnsupportedMediaType("image/png".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Request body exceeds the configured size cap (in bytes)
    PayloadTooLarge(u64),

    /// Malformed multipart form, missing `audio` field or empty file
    BadRequest(String),

    /// The leading bytes could not be read, or the stream could not be rewound
    SniffFailure(String),

    /// The sniffed MIME type is not on the allow-list (carries the detected type)
    UnsupportedMediaType(String),

    /// Directory creation, file creation or copy failed
    StorageError(String),

    /// The engine could not be reached (connection refused, timeout, DNS failure)
    UpstreamUnreachable(String),

    /// The engine answered with a non-success status
    UpstreamError { status: u16, body: String },

    /// The engine's success body is not a valid processing result
    ResponseParseError(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// Anything else that went wrong on our side
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::PayloadTooLarge(limit) => {
                write!(f, "Request body exceeds the {} byte limit", limit)
            }
            AppError::BadRequest(msg) => write!(f, "{}", msg),
            AppError::SniffFailure(msg) => write!(f, "{}", msg),
            AppError::UnsupportedMediaType(mime) => write!(f, "Unsupported file type: {}", mime),
            AppError::StorageError(msg) => write!(f, "{}", msg),
            AppError::UpstreamUnreachable(msg) => {
                write!(f, "Processing failed: engine unreachable: {}", msg)
            }
            AppError::UpstreamError { status, body } => {
                write!(f, "Processing failed: processing API error ({}): {}", status, body)
            }
            AppError::ResponseParseError(msg) => {
                write!(f, "Processing failed: failed to parse processing API response: {}", msg)
            }
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// Short machine-readable name, used as a structured field in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::BadRequest(_) => "bad_request",
            AppError::SniffFailure(_) => "sniff_failure",
            AppError::UnsupportedMediaType(_) => "unsupported_media_type",
            AppError::StorageError(_) => "storage_error",
            AppError::UpstreamUnreachable(_) => "upstream_unreachable",
            AppError::UpstreamError { .. } => "upstream_error",
            AppError::ResponseParseError(_) => "response_parse_error",
            AppError::ConfigError(_) => "config_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

/// Converts pipeline errors into plain-text HTTP responses.
///
/// ## HTTP Status Code Mapping:
/// - PayloadTooLarge → 413
/// - BadRequest/UnsupportedMediaType → 400
/// - SniffFailure/StorageError/ConfigError/Internal → 500
/// - UpstreamUnreachable/UpstreamError/ResponseParseError → 502
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::BadRequest(_) | AppError::UnsupportedMediaType(_) => StatusCode::BAD_REQUEST,
            AppError::SniffFailure(_)
            | AppError::StorageError(_)
            | AppError::ConfigError(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::UpstreamUnreachable(_)
            | AppError::UpstreamError { .. }
            | AppError::ResponseParseError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::plaintext())
            .body(self.to_string())
    }
}

/// Automatic conversion from configuration errors to AppError.
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// A blocking task that panicked or was cancelled on the thread pool.
impl From<actix_web::error::BlockingError> for AppError {
    fn from(err: actix_web::error::BlockingError) -> Self {
        AppError::Internal(format!("blocking task failed: {}", err))
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;
