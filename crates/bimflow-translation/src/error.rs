use bimflow_core::AppError;
use bimflow_infra::BreakerError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum TranslationError {
    /// The token endpoint rejected us, or a call answered 401/403.
    #[error("Authentication with the translation service failed: {0}")]
    Auth(String),

    #[error("Translation service error ({}): {message}", describe_status(.status))]
    Remote {
        status: Option<u16>,
        message: String,
    },

    #[error("Circuit breaker '{name}' is open")]
    BreakerOpen { name: String },

    #[error("Translation call '{name}' timed out")]
    Timeout { name: String },
}

fn describe_status(status: &Option<u16>) -> String {
    status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "no response".to_string())
}

impl TranslationError {
    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        TranslationError::Remote {
            status,
            message: message.into(),
        }
    }

    /// Whether a later attempt may succeed. Client errors other than 429
    /// will be answered the same way next time.
    pub fn is_transient(&self) -> bool {
        match self {
            TranslationError::Auth(_)
            | TranslationError::BreakerOpen { .. }
            | TranslationError::Timeout { .. } => true,
            TranslationError::Remote { status, .. } => match status {
                None => true,
                Some(code) => *code == 429 || *code >= 500,
            },
        }
    }
}

impl From<BreakerError<TranslationError>> for TranslationError {
    fn from(err: BreakerError<TranslationError>) -> Self {
        match err {
            BreakerError::Open { name } => TranslationError::BreakerOpen { name },
            BreakerError::Timeout { name, .. } => TranslationError::Timeout { name },
            BreakerError::Operation(inner) => inner,
        }
    }
}

impl From<TranslationError> for AppError {
    fn from(err: TranslationError) -> Self {
        match err {
            TranslationError::Auth(message) => AppError::RemoteAuth(message),
            TranslationError::Remote { status, message } => {
                AppError::RemoteOperation { status, message }
            }
            TranslationError::BreakerOpen { name } => AppError::BreakerOpen { operation: name },
            TranslationError::Timeout { name } => AppError::RemoteOperation {
                status: None,
                message: format!("Call '{}' timed out", name),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimflow_core::ErrorMetadata;

    #[test]
    fn transient_classification() {
        assert!(TranslationError::remote(Some(503), "busy").is_transient());
        assert!(TranslationError::remote(Some(429), "slow down").is_transient());
        assert!(TranslationError::remote(None, "connection reset").is_transient());
        assert!(!TranslationError::remote(Some(400), "bad urn").is_transient());
        assert!(TranslationError::BreakerOpen {
            name: "manifest".into()
        }
        .is_transient());
    }

    #[test]
    fn maps_to_http_statuses() {
        let open: AppError = TranslationError::BreakerOpen {
            name: "manifest".into(),
        }
        .into();
        assert_eq!(open.http_status_code(), 503);

        let remote: AppError = TranslationError::remote(Some(500), "boom").into();
        assert_eq!(remote.http_status_code(), 502);

        let auth: AppError = TranslationError::Auth("bad secret".into()).into();
        assert_eq!(auth.http_status_code(), 502);
    }
}
