//! Common utilities for amibridge
//!
//! Shared error taxonomy and logging setup used by every amibridge crate.

pub mod error;
pub mod logging;

pub use error::{AmiError, Result};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogOutput};
