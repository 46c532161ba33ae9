//! Shared infrastructure for the ingestion pipeline:
//! - Middleware (request ID)
//! - Telemetry initialization
//! - HTTP error body
//! - Circuit breakers around remote calls
//! - Result cache

#[cfg(feature = "middleware")]
pub mod middleware;

#[cfg(feature = "observability-basic")]
pub mod telemetry;

pub mod error;

#[cfg(feature = "circuit-breaker")]
pub mod circuit_breaker;

#[cfg(feature = "cache")]
pub mod cache;

#[cfg(feature = "middleware")]
pub use middleware::{get_request_id, request_id_middleware, RequestId};

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, shutdown_telemetry, LogFormat};

pub use error::ErrorResponse;

#[cfg(feature = "circuit-breaker")]
pub use circuit_breaker::{
    BreakerError, BreakerSnapshot, BreakerState, CircuitBreaker, CircuitBreakerConfig,
};

#[cfg(feature = "cache")]
pub use cache::{Cache, CacheStats, InMemoryCache};
