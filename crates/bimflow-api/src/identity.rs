//! Caller identity.
//!
//! Authentication happens upstream; this service only records who asked.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

use crate::constants::{ANONYMOUS_USER, USER_ID_HEADER};

const MAX_USER_ID_LENGTH: usize = 128;

/// Value of the `X-User-Id` header, or `anonymous`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

impl Caller {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// FromRequestParts so it can sit next to Multipart in a handler
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= MAX_USER_ID_LENGTH)
            .unwrap_or(ANONYMOUS_USER);
        Ok(Caller(user.to_string()))
    }
}
