//! Security module.
//!
//! Provides content checksums and Ed25519 signature verification.

pub mod checksum;
pub mod signature;

pub use checksum::*;
pub use signature::*;
