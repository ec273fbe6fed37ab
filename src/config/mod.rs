//! # Configuration
//!
//! Controller configuration loaded from environment variables.
//!
//! - `controller`: Controller-level settings (backoff, concurrency, logging, server port)

mod controller;

pub use controller::{ControllerConfig, LogFormat, SharedControllerConfig};
