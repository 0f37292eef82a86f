//! MBT Bridge – execution core for model-based testing plugins
//!
//! This crate receives action requests from an external test-sequence driver
//! and runs them against a user-supplied behavioural model:
//! - A generic value codec between native data and the wire value
//! - Resolution of requests against a pre-registered action table and live roles
//! - Fail-soft execution with classified failures and nanosecond timing
//! - Parallel execution of action sequences with scheduler interference
//! - An NDJSON service adapter for driving the bridge over a stream

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Bridge core: codec, resolution, execution and orchestration
pub mod runtime;

/// Newline-delimited JSON transport adapter
pub mod service;

/// Reference counter model
pub mod demo;

// Re-export key types for convenience
pub use runtime::{Bridge, BridgeConfig, BridgeError, Model, Role, Value};

/// Current version of the bridge
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version for the NDJSON service
pub const PROTOCOL_VERSION: &str = "1.0.0";
