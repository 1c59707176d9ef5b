//! # CVB Common Library
//!
//! Shared code for the clip bundler:
//! - Error type used by every stage
//! - Bundler configuration loading (TOML + environment)
//! - Client identifier anonymization
//! - Progress event types and the EventBus

pub mod config;
pub mod error;
pub mod events;
pub mod hashing;

pub use error::{Error, Result};
