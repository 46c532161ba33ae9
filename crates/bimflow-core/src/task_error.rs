//! Job execution error types
//!
//! A translation handler returns `anyhow::Error`; wrapping it in [`TaskError`]
//! tells the job queue whether another attempt can help. Content the remote
//! translator rejected will be rejected again, so it is unrecoverable. A
//! breaker that is open or a flaky network is worth another attempt.

use std::fmt;

/// Job execution error that can be either recoverable or unrecoverable
#[derive(Debug)]
pub struct TaskError {
    inner: anyhow::Error,
    recoverable: bool,
}

impl TaskError {
    /// Unrecoverable errors move the job straight to `failed-terminal`.
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: false,
        }
    }

    /// Recoverable errors are retried according to the queue's attempt policy.
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: true,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        Self::recoverable(err)
    }
}

/// Returns true when `err` carries a [`TaskError`] marked unrecoverable.
/// Plain errors are treated as recoverable.
pub fn is_unrecoverable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<TaskError>()
        .map(|te| !te.is_recoverable())
        .unwrap_or(false)
}

/// Extension trait for Result to easily create unrecoverable task errors
pub trait TaskResultExt<T> {
    fn unrecoverable(self) -> Result<T, TaskError>;
}

impl<T, E: Into<anyhow::Error>> TaskResultExt<T> for Result<T, E> {
    fn unrecoverable(self) -> Result<T, TaskError> {
        self.map_err(|e| TaskError::unrecoverable(e.into()))
    }
}
