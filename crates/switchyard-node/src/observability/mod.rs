//! # Observability
//!
//! Structured logging for the node. Router and connection events are
//! emitted through `tracing`; this module installs the subscriber.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use switchyard_node::observability::{init_logging, LogFormat};
//!
//! init_logging("info", LogFormat::Json);
//! ```

mod logging;

pub use logging::{env_filter_directives, init_logging, LogFormat};
