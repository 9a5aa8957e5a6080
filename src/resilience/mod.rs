//! Resilience patterns for world operations
//!
//! Exponential-backoff retry for the rollback path.

pub mod retry;

pub use retry::{ExponentialBackoff, RetryConfig, RetryPolicy};
