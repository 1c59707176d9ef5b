//! Utility modules for the bundler

pub mod retry;

pub use retry::{is_retryable, retry_with_backoff};
