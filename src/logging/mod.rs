//! Structured logging with device context.
//!
//! Provides logging macros and utilities that include the device id and
//! component in every log message for easy correlation across devices.

pub mod structured;

pub use structured::*;
