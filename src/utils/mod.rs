//! Pure utility functions.
//!
//! These are stateless helper functions used across the codebase.

pub mod bootstrap;
#[cfg(feature = "otel")]
pub mod metrics;
pub mod retry;
