//! Error types module
//!
//! Every failure that can reach an HTTP caller is an [`AppError`]. Each variant
//! self-describes its response through [`ErrorMetadata`]: status code, machine
//! readable code, whether a retry makes sense and what the caller should do.
//!
//! The taxonomy separates caller mistakes (invalid type or size) from storage
//! failures and from the external translation service. Remote failures come
//! in two kinds. `BreakerOpen` means "try again soon". `RemoteOperation`
//! means the remote actually answered with an error.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected errors like validation failures
    Debug,
    /// Recoverable issues like an open breaker
    Warn,
    /// Unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "INVALID_FILE_TYPE")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid file type: {0}")]
    InvalidType(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Remote authentication failed: {0}")]
    RemoteAuth(String),

    #[error("Remote operation failed: {message}")]
    RemoteOperation {
        status: Option<u16>,
        message: String,
    },

    #[error("Circuit breaker open for {operation}")]
    BreakerOpen { operation: String },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Storage(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("UUID parsing error: {}", err))
    }
}

impl AppError {
    /// Variant name, used in logs and non-production error bodies.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Database(_) => "Database",
            AppError::Storage(_) => "Storage",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::InvalidType(_) => "InvalidType",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::NotFound(_) => "NotFound",
            AppError::RemoteAuth(_) => "RemoteAuth",
            AppError::RemoteOperation { .. } => "RemoteOperation",
            AppError::BreakerOpen { .. } => "BreakerOpen",
            AppError::Internal(_) | AppError::InternalWithSource { .. } => "Internal",
        }
    }
}

/// Static metadata per variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Database(_) => (
            500,
            "DATABASE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Storage(_) => (
            500,
            "STORAGE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidType(_) => (
            400,
            "INVALID_FILE_TYPE",
            false,
            Some("Upload a supported design file (ifc, dwg, rvt, step, obj, gltf, glb)"),
            false,
            LogLevel::Debug,
        ),
        AppError::PayloadTooLarge(_) => (
            400,
            "PAYLOAD_TOO_LARGE",
            false,
            Some("Reduce file size below the configured upload limit"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the resource ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::RemoteAuth(_) => (
            502,
            "REMOTE_AUTH_FAILED",
            true,
            Some("Check translation service credentials"),
            true,
            LogLevel::Error,
        ),
        AppError::RemoteOperation { .. } => (
            502,
            "REMOTE_OPERATION_FAILED",
            true,
            Some("Retry after a short delay"),
            false,
            LogLevel::Warn,
        ),
        AppError::BreakerOpen { .. } => (
            503,
            "SERVICE_UNAVAILABLE",
            true,
            Some("Translation service is unavailable, back off and retry later"),
            false,
            LogLevel::Warn,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::Storage(_) => "Failed to access content store".to_string(),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::InvalidType(ref msg) => msg.clone(),
            AppError::PayloadTooLarge(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::RemoteAuth(_) => {
                "Translation service rejected our credentials".to_string()
            }
            AppError::RemoteOperation { status, message } => match status {
                Some(code) => format!("Translation service returned {}: {}", code, message),
                None => format!("Translation service call failed: {}", message),
            },
            AppError::BreakerOpen { operation } => format!(
                "Translation service temporarily unavailable ({} circuit open)",
                operation
            ),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "An internal error occurred".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_database() {
        #[cfg(feature = "sqlx")]
        let err = AppError::from(sqlx::Error::PoolClosed);
        #[cfg(not(feature = "sqlx"))]
        let err = AppError::Database("pool closed".to_string());
        assert_eq!(err.http_status_code(), 500);
        assert_eq!(err.error_code(), "DATABASE_ERROR");
        assert!(err.is_recoverable());
        assert_eq!(err.client_message(), "Failed to access database");
        assert!(err.is_sensitive());
        assert_eq!(err.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_validation_errors_are_bad_requests() {
        let err = AppError::InvalidType("extension 'exe' is not allowed".to_string());
        assert_eq!(err.http_status_code(), 400);
        assert_eq!(err.error_code(), "INVALID_FILE_TYPE");
        assert!(!err.is_recoverable());
        assert_eq!(err.client_message(), "extension 'exe' is not allowed");

        let err = AppError::PayloadTooLarge("exceeds 100 bytes".to_string());
        assert_eq!(err.http_status_code(), 400);
        assert_eq!(err.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_breaker_open_is_distinct_from_remote_failure() {
        let open = AppError::BreakerOpen {
            operation: "fetch-manifest".to_string(),
        };
        let remote = AppError::RemoteOperation {
            status: Some(500),
            message: "boom".to_string(),
        };
        assert_eq!(open.http_status_code(), 503);
        assert_eq!(remote.http_status_code(), 502);
        assert_ne!(open.error_code(), remote.error_code());
        assert!(open.client_message().contains("fetch-manifest"));
        assert!(remote.client_message().contains("500"));
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let err = AppError::from(io::Error::new(io::ErrorKind::Other, "disk full"));
        assert_eq!(err.error_code(), "STORAGE_ERROR");
        assert_eq!(err.http_status_code(), 500);
    }
}
