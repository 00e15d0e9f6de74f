//! Failure containment for the report run
//!
//! This module provides:
//! - Retry with exponential backoff for transient remote failures
//! - Per-run bookkeeping of skipped stores and placeholder substitutions

mod partial_success;
mod retry;

pub use partial_success::{RunSummary, StoreFailure};
pub use retry::{
    ExponentialBackoff, RetryConfig, RetryPolicy, Retryable, retry_with_policy,
};
