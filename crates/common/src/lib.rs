//! Common utilities for the pigpio remote client
//!
//! This crate provides shared plumbing for the workspace: the common error
//! type and tracing setup. The `test-utils` feature adds test helpers,
//! including a scripted mock daemon.

pub mod error;
pub mod logging;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{Error, Result};
pub use logging::setup_logging;
