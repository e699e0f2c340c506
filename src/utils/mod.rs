//! The `utils` module provides a collection of utility functions and common
//! definitions used across the broker.
//!
//! It centralizes the error type shared by every module and the tracing
//! initialisation used by the demo binary and tests.

pub mod error;
pub mod logging;

pub use error::{BrokerError, Result};
