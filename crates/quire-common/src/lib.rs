//! # Quire Common
//!
//! Shared utilities for the quire offline runtime.
//!
//! ## Features
//!
//! - Logging configuration and setup
//! - Bounded-timeout helper for network calls
//! - Detached background tasks

pub mod logging;
pub mod task;
pub mod timeout;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use task::detach;
pub use timeout::{with_timeout, Elapsed};
