//! Communication protocol module.
//!
//! Resilient device-to-cloud messaging:
//! - Checksummed JSON framing
//! - Priority and normal queues with capacity and TTL limits
//! - Offline buffering and sync passes
//! - Inbound validation and signed commands

pub mod builder;
pub mod communicator;
pub mod message;
pub mod queue;
pub mod transport;
pub mod validation;

pub use builder::*;
pub use communicator::*;
pub use message::*;
pub use queue::*;
pub use transport::*;
pub use validation::*;
