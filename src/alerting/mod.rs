//! Alert lifecycle module.
//!
//! Escalates sustained abnormal plant states into user-facing alerts:
//! - Delayed or immediate (urgent) triggering
//! - Repeats with a cap
//! - Acknowledge and snooze windows

pub mod machine;
pub mod types;

pub use machine::*;
pub use types::*;
