//! Client for the external model-derivative (translation) service.
//!
//! [`ForgeApi`] speaks HTTP. [`TranslationClient`] adds a circuit breaker
//! per remote operation and caches the access token.
//! [`CachingTranslationClient`] serves derived results from the result cache
//! before falling through to the remote service.

pub mod api;
pub mod caching;
pub mod client;
pub mod error;
pub mod forge;
pub mod quantities;

pub use api::{AccessToken, TranslationApi};
pub use caching::{is_terminal_manifest, CacheTtls, CachedResult, CachingTranslationClient};
pub use client::{object_urn, DerivativeHandle, DerivativeSource, TranslationClient};
pub use error::TranslationError;
pub use forge::{ForgeApi, ForgeCredentials};
pub use quantities::{derive_quantities, CountItem, QuantityItem, QuantityTakeoff};
