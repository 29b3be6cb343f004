//! PlantCare Core - on-device decision core for a plant-care sensor node
//!
//! Turns raw sensor samples into plant-state decisions, alerts and
//! outbound messages, and keeps enough checksummed state to resume after a
//! power cycle. The implementation prioritizes:
//!
//! 1. **Determinism** - Every time-sensitive call takes `now` explicitly
//! 2. **Logging** - Every decision point logged with device context
//! 3. **Resilience** - Messages survive link loss, records survive corruption
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `evaluation` - Reading validation, classification, health score, history
//! - `alerting` - Alert lifecycle state machine with delay, repeat and snooze
//! - `protocol` - Framing, checksums, priority queue, offline sync
//! - `persistence` - Checksummed records over a pluggable byte store
//! - `device` - Per-device context wiring the components together
//! - `security` - Content hashing and Ed25519 command verification
//! - `config` - JSON configuration with environment overrides
//! - `logging` - Structured logging with device context

pub mod alerting;
pub mod config;
pub mod device;
pub mod evaluation;
pub mod logging;
pub mod persistence;
pub mod protocol;
pub mod security;

/// Milliseconds since the Unix epoch, supplied by the caller.
pub type Timestamp = u64;

pub use alerting::{AlertEffect, AlertInfo, AlertMachine, AlertState, AlertTiming, AlertType};
pub use config::{ConfigError, CoreConfig};
pub use device::{DeviceContext, TickReport};
pub use evaluation::{Evaluation, PlantState, PlantStatus, SensorReading, StateEvaluator};
pub use logging::structured::LogContext;
pub use persistence::{FileStore, MemoryStore, RecordStore, StatePersistence};
pub use protocol::{
    Channel, CommunicationProtocol, LoopbackTransport, MessageType, ProtocolEvent, Transport,
};

/// Initialize the process-wide logger.
///
/// Defaults to `info`; `RUST_LOG` overrides. Safe to call more than once.
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
