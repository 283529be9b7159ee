//! # virtnet Common
//!
//! Shared utilities for the virtnet components.
//!
//! ## Logging
//!
//! ```rust,ignore
//! use virtnet_common::init_logging;
//!
//! init_logging("info").unwrap();
//! tracing::info!(network = "default", "Network configured");
//! ```

pub mod logging;

pub use logging::{init, init_logging, init_logging_json, LogFormat};
