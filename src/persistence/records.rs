//! Persisted record shapes.
//!
//! Every record carries a `checksum` field: the SHA-256 of the record's JSON
//! with that field set to the empty string.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::alerting::AlertSnapshot;
use crate::evaluation::{PlantState, PlantStatus, StateChangeRecord, StateEvaluator, StateStats};
use crate::protocol::QueuedMessage;
use crate::security::checksum::compute_hash;
use crate::Timestamp;

pub const RECORD_HEADER: &str = "header";
pub const RECORD_STATE: &str = "state";
pub const RECORD_HISTORY: &str = "history";
pub const RECORD_STATS: &str = "stats";
pub const RECORD_ALERT: &str = "alert";
pub const RECORD_QUEUE: &str = "queue";

pub const STORE_MAGIC: u32 = 0x5678;
pub const DATA_VERSION: u32 = 1;

/// Most recent transitions kept on persisted writes.
pub const MAX_STORED_HISTORY: usize = 5;

pub trait Checksummed: Serialize + DeserializeOwned + Clone {
    /// Store key for this record type.
    const KEY: &'static str;

    fn checksum(&self) -> &str;
    fn set_checksum(&mut self, checksum: String);

    fn compute_checksum(&self) -> Result<String, serde_json::Error> {
        let mut zeroed = self.clone();
        zeroed.set_checksum(String::new());
        Ok(compute_hash(&serde_json::to_string(&zeroed)?))
    }

    /// Stamp the record with its checksum.
    fn seal(&mut self) -> Result<(), serde_json::Error> {
        let checksum = self.compute_checksum()?;
        self.set_checksum(checksum);
        Ok(())
    }

    fn is_intact(&self) -> bool {
        match self.compute_checksum() {
            Ok(expected) => !self.checksum().is_empty() && expected == self.checksum(),
            Err(_) => false,
        }
    }
}

macro_rules! impl_checksummed {
    ($record:ty, $key:expr) => {
        impl Checksummed for $record {
            const KEY: &'static str = $key;

            fn checksum(&self) -> &str {
                &self.checksum
            }

            fn set_checksum(&mut self, checksum: String) {
                self.checksum = checksum;
            }
        }
    };
}

/// Marks an initialized store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreHeader {
    pub magic: u32,
    pub version: u32,
    pub created_at: Timestamp,
    pub checksum: String,
}

impl StoreHeader {
    pub fn new(now: Timestamp) -> Self {
        Self {
            magic: STORE_MAGIC,
            version: DATA_VERSION,
            created_at: now,
            checksum: String::new(),
        }
    }

    pub fn is_recognized(&self) -> bool {
        self.magic == STORE_MAGIC && self.version == DATA_VERSION
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentStateData {
    pub current_state: PlantState,
    pub previous_state: PlantState,
    pub state_start_time: Timestamp,
    pub last_update_time: Timestamp,
    pub health_score: u8,
    pub last_soil_moisture: f32,
    pub last_light_level: f32,
    pub last_temperature: f32,
    pub last_air_humidity: f32,
    pub needs_attention: bool,
    pub status_message: String,
    pub checksum: String,
}

impl Default for PersistentStateData {
    fn default() -> Self {
        Self::from_status(&PlantStatus::default(), PlantState::Unknown, 0)
    }
}

impl PersistentStateData {
    pub fn from_status(status: &PlantStatus, previous_state: PlantState, state_start_time: Timestamp) -> Self {
        Self {
            current_state: status.state,
            previous_state,
            state_start_time,
            last_update_time: status.timestamp,
            health_score: status.health_score,
            last_soil_moisture: status.soil_moisture,
            last_light_level: status.light_level,
            last_temperature: status.temperature,
            last_air_humidity: status.air_humidity,
            needs_attention: status.needs_attention,
            status_message: status.status_message.clone(),
            checksum: String::new(),
        }
    }

    pub fn from_evaluator(evaluator: &StateEvaluator) -> Self {
        Self::from_status(
            evaluator.status(),
            evaluator.previous_state(),
            evaluator.state_start_time(),
        )
    }

    pub fn to_status(&self) -> PlantStatus {
        PlantStatus {
            state: self.current_state,
            soil_moisture: self.last_soil_moisture,
            light_level: self.last_light_level,
            temperature: self.last_temperature,
            air_humidity: self.last_air_humidity,
            timestamp: self.last_update_time,
            needs_attention: self.needs_attention,
            status_message: self.status_message.clone(),
            health_score: self.health_score,
        }
    }
}

/// Newest-first, at most [`MAX_STORED_HISTORY`] records.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentStateHistory {
    pub records: Vec<StateChangeRecord>,
    pub checksum: String,
}

impl PersistentStateHistory {
    pub fn from_newest_first(records: &[StateChangeRecord]) -> Self {
        Self {
            records: records.iter().take(MAX_STORED_HISTORY).cloned().collect(),
            checksum: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentStateStats {
    pub stats: StateStats,
    pub checksum: String,
}

impl PersistentStateStats {
    pub fn new(stats: &StateStats) -> Self {
        Self {
            stats: stats.clone(),
            checksum: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentAlertData {
    pub snapshot: AlertSnapshot,
    pub saved_at: Timestamp,
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentQueue {
    pub messages: Vec<QueuedMessage>,
    pub saved_at: Timestamp,
    pub checksum: String,
}

impl_checksummed!(StoreHeader, RECORD_HEADER);
impl_checksummed!(PersistentStateData, RECORD_STATE);
impl_checksummed!(PersistentStateHistory, RECORD_HISTORY);
impl_checksummed!(PersistentStateStats, RECORD_STATS);
impl_checksummed!(PersistentAlertData, RECORD_ALERT);
impl_checksummed!(PersistentQueue, RECORD_QUEUE);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::SensorReading;

    fn record(previous: PlantState, current: PlantState, at: Timestamp) -> StateChangeRecord {
        StateChangeRecord {
            previous_state: previous,
            current_state: current,
            change_time: at,
            trigger_reading: SensorReading::new(40.0, 900.0, 22.0, 50.0, at),
            reason: "test".to_string(),
        }
    }

    #[test]
    fn test_seal_and_verify() {
        let mut data = PersistentStateData::default();
        assert!(!data.is_intact());

        data.seal().unwrap();
        assert!(data.is_intact());

        data.health_score = 99;
        assert!(!data.is_intact());
    }

    #[test]
    fn test_checksum_ignores_checksum_field() {
        let mut header = StoreHeader::new(5);
        let before = header.compute_checksum().unwrap();
        header.checksum = "anything".to_string();
        assert_eq!(header.compute_checksum().unwrap(), before);
    }

    #[test]
    fn test_history_capped() {
        let records: Vec<StateChangeRecord> = (0..8)
            .map(|i| record(PlantState::Healthy, PlantState::NeedsWater, 100 - i))
            .collect();
        let history = PersistentStateHistory::from_newest_first(&records);
        assert_eq!(history.records.len(), MAX_STORED_HISTORY);
        assert_eq!(history.records[0].change_time, 100);
    }

    #[test]
    fn test_status_conversion() {
        let status = PlantStatus {
            state: PlantState::NeedsLight,
            soil_moisture: 45.0,
            light_level: 300.0,
            temperature: 21.0,
            air_humidity: 40.0,
            timestamp: 77,
            needs_attention: true,
            status_message: "plant needs more light (light: 300 lux)".to_string(),
            health_score: 64,
        };
        let data = PersistentStateData::from_status(&status, PlantState::Healthy, 70);
        assert_eq!(data.to_status(), status);
        assert_eq!(data.previous_state, PlantState::Healthy);
        assert_eq!(data.state_start_time, 70);
    }

    #[test]
    fn test_header_recognized() {
        assert!(StoreHeader::new(0).is_recognized());
        let stale = StoreHeader {
            version: DATA_VERSION + 1,
            ..StoreHeader::new(0)
        };
        assert!(!stale.is_recognized());
    }
}
