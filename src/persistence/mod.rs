//! Persistence module.
//!
//! Checksummed records over a byte-level store:
//! - `RecordStore` implementations (memory, directory of files)
//! - Record shapes with zero-field SHA-256 checksums
//! - Save/load, integrity verification and repair

pub mod manager;
pub mod records;
pub mod store;

pub use manager::*;
pub use records::*;
pub use store::*;
