//! Persistence for content records and translation jobs.
//!
//! Each repository is a trait with two implementations:
//!
//! - PostgreSQL (`Pg*`), the production path. Records survive restarts, and
//!   several processes share one dedup index and one lease table.
//! - In-memory (`Memory*`), the degraded mode used when no `DATABASE_URL`
//!   is configured. Its guarantees are weaker: dedup and leases hold only
//!   within one process, and everything is lost on restart.

pub mod content;
pub mod jobs;
pub mod memory;
pub mod pool;

pub use content::{ContentRepository, PgContentRepository};
pub use jobs::{EnqueueOutcome, JobRepository, PgJobRepository};
pub use memory::{MemoryContentRepository, MemoryJobRepository};
pub use pool::{connect, run_migrations};
