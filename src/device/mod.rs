//! Device module.
//!
//! Per-device wiring of the core:
//! - Sensor collection cadence, buffering and error tracking
//! - `DeviceContext`, which owns one of each component and runs them
//!   together on ingest and tick

pub mod collection;
pub mod context;

pub use collection::*;
pub use context::*;
