//! Quill - author-gated posts with resilient change events
//!
//! Posts are written only for active authors, searched with one of several
//! strategies, and announced on a broker through a fault-tolerant emitter.
//! Author records are kept in sync by consuming an upstream author topic.

pub mod bus;
pub mod config;
pub mod consumer;
pub mod emitter;
pub mod error;
pub mod interfaces;
pub mod model;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(all(test, feature = "memory"))]
mod test_utils;
