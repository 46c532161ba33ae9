//! HTTP error response conversion
//!
//! Handlers return `Result<impl IntoResponse, HttpAppError>`. Anything that
//! converts into `AppError` (storage, translation, anyhow) renders the same
//! way: status from [`ErrorMetadata`], an [`ErrorResponse`] JSON body and one
//! log line at the error's level.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bimflow_core::{AppError, ErrorMetadata, LogLevel};
use bimflow_storage::StorageError;
use bimflow_translation::TranslationError;

pub use bimflow_infra::ErrorResponse;

/// Wrapper type for AppError to implement IntoResponse.
/// The orphan rule forbids implementing axum's trait on the core type.
#[derive(Debug)]
pub struct HttpAppError(pub AppError);

impl From<AppError> for HttpAppError {
    fn from(err: AppError) -> Self {
        HttpAppError(err)
    }
}

impl From<anyhow::Error> for HttpAppError {
    fn from(err: anyhow::Error) -> Self {
        HttpAppError(AppError::from(err))
    }
}

impl From<StorageError> for HttpAppError {
    fn from(err: StorageError) -> Self {
        HttpAppError(err.into())
    }
}

impl From<TranslationError> for HttpAppError {
    fn from(err: TranslationError) -> Self {
        HttpAppError(err.into())
    }
}

fn log_error(error: &AppError) {
    let error_type = error.error_type();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, error_type, "Request failed");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, error_type, "Request failed");
        }
        LogLevel::Error => {
            tracing::error!(error = %error, error_type, "Request failed");
        }
    }
}

fn is_production_env() -> bool {
    std::env::var("ENVIRONMENT")
        .or_else(|_| std::env::var("APP_ENV"))
        .map(|env| env.eq_ignore_ascii_case("production") || env.eq_ignore_ascii_case("prod"))
        .unwrap_or(false)
}

/// Build the JSON body for `error`. Details are only exposed outside
/// production and never for sensitive errors.
pub fn error_body(error: &AppError, expose_details: bool) -> ErrorResponse {
    let show = expose_details && !error.is_sensitive();
    ErrorResponse {
        error: error.client_message(),
        details: show.then(|| error.to_string()),
        error_type: show.then(|| error.error_type().to_string()),
        code: error.error_code().to_string(),
        recoverable: error.is_recoverable(),
        suggested_action: error.suggested_action().map(String::from),
    }
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let app_error = &self.0;
        let status = StatusCode::from_u16(app_error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        log_error(app_error);

        let body = error_body(app_error, !is_production_env());
        (status, Json(body)).into_response()
    }
}
