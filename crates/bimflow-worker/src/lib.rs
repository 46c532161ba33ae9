//! Background translation jobs: a durable queue with per-job leases and a
//! bounded worker pool that drives a [`JobHandler`].

pub mod context;
pub mod queue;

pub use context::{JobHandler, JobLease};
pub use bimflow_core::models::compute_retry_backoff;
pub use queue::{JobQueue, JobQueueConfig};
