//! Checksummed persistence of evaluator, alert and queue state.
//!
//! Corrupted or unreadable records load as `None` and the caller falls back
//! to defaults. Nothing here panics on bad data.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use super::records::{
    Checksummed, PersistentAlertData, PersistentQueue, PersistentStateData, PersistentStateHistory,
    PersistentStateStats, StoreHeader, RECORD_ALERT, RECORD_HISTORY, RECORD_QUEUE, RECORD_STATE,
    RECORD_STATS,
};
use super::store::{RecordStore, StoreError};
use crate::alerting::AlertSnapshot;
use crate::config::ConfigError;
use crate::evaluation::{StateChangeRecord, StateEvaluator, StateStats};
use crate::logging::structured::LogContext;
use crate::protocol::QueuedMessage;
use crate::Timestamp;

pub const DEFAULT_AUTO_SAVE_INTERVAL_MS: u64 = 5 * 60 * 1000;
pub const MIN_AUTO_SAVE_INTERVAL_MS: u64 = 60_000;

const SELF_TEST_KEY: &str = "selftest";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistenceConfig {
    pub data_dir: PathBuf,
    pub auto_save_enabled: bool,
    pub auto_save_interval: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            auto_save_enabled: true,
            auto_save_interval: DEFAULT_AUTO_SAVE_INTERVAL_MS,
        }
    }
}

impl PersistenceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auto_save_interval < MIN_AUTO_SAVE_INTERVAL_MS {
            return Err(ConfigError::invalid(
                "persistence.autoSaveInterval",
                format!("must be at least {}ms", MIN_AUTO_SAVE_INTERVAL_MS),
            ));
        }
        Ok(())
    }
}

/// What `initialize` found in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    /// No recognized header; defaults were written.
    Fresh,
    /// Header and every record verified.
    Intact,
    /// Some records were corrupted and rewritten with defaults.
    Repaired,
}

pub struct StatePersistence<S: RecordStore> {
    store: S,
    config: PersistenceConfig,
    initialized: bool,
    last_save_time: Timestamp,
    ctx: LogContext,
}

impl<S: RecordStore> StatePersistence<S> {
    pub fn new(store: S, config: PersistenceConfig, ctx: &LogContext) -> Self {
        let mut config = config;
        config.auto_save_interval = config.auto_save_interval.max(MIN_AUTO_SAVE_INTERVAL_MS);
        Self {
            store,
            config,
            initialized: false,
            last_save_time: 0,
            ctx: ctx.with_component("persistence"),
        }
    }

    /// Prepare the store: write defaults into an empty store, repair a
    /// damaged one.
    pub fn initialize(&mut self, now: Timestamp) -> Result<StoreStatus, PersistenceError> {
        let header = self.load::<StoreHeader>();
        let status = match header {
            Some(header) if header.is_recognized() => {
                if self.verify_integrity() {
                    StoreStatus::Intact
                } else {
                    self.repair_corrupted()?;
                    StoreStatus::Repaired
                }
            }
            _ => {
                self.write_defaults(now)?;
                StoreStatus::Fresh
            }
        };

        self.initialized = true;
        log::info!("{} STORE_INITIALIZED status={:?}", self.ctx, status);
        Ok(status)
    }

    fn write_defaults(&mut self, now: Timestamp) -> Result<(), PersistenceError> {
        self.save(&PersistentStateData::default())?;
        self.save(&PersistentStateHistory::default())?;
        self.save(&PersistentStateStats::default())?;
        self.save(&StoreHeader::new(now))?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Seal and write one record.
    pub fn save<R: Checksummed>(&mut self, record: &R) -> Result<(), PersistenceError> {
        let mut sealed = record.clone();
        sealed.seal()?;
        let bytes = serde_json::to_vec(&sealed)?;
        self.store.write(R::KEY, &bytes)?;
        log::debug!("{} RECORD_SAVED key={} bytes={}", self.ctx, R::KEY, bytes.len());
        Ok(())
    }

    /// Load one record. Absent, unreadable or corrupted records are `None`.
    pub fn load<R: Checksummed>(&self) -> Option<R> {
        let bytes = match self.store.read(R::KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("{} RECORD_READ_FAILED key={} error={}", self.ctx, R::KEY, e);
                return None;
            }
        };

        let record: R = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("{} RECORD_UNREADABLE key={} error={}", self.ctx, R::KEY, e);
                return None;
            }
        };

        if !record.is_intact() {
            log::warn!("{} RECORD_CHECKSUM_MISMATCH key={}", self.ctx, R::KEY);
            return None;
        }
        Some(record)
    }

    /// `None` if absent, otherwise whether the stored record verifies.
    fn record_intact<R: Checksummed>(&self) -> Option<bool> {
        match self.store.read(R::KEY) {
            Ok(None) => None,
            Ok(Some(_)) => Some(self.load::<R>().is_some()),
            Err(_) => Some(false),
        }
    }

    pub fn save_state(&mut self, evaluator: &StateEvaluator) -> Result<(), PersistenceError> {
        self.save(&PersistentStateData::from_evaluator(evaluator))
    }

    pub fn load_state(&self) -> Option<PersistentStateData> {
        self.load()
    }

    /// Persist the newest [`super::records::MAX_STORED_HISTORY`] transitions.
    pub fn save_history(&mut self, newest_first: &[StateChangeRecord]) -> Result<(), PersistenceError> {
        self.save(&PersistentStateHistory::from_newest_first(newest_first))
    }

    pub fn load_history(&self) -> Option<Vec<StateChangeRecord>> {
        self.load::<PersistentStateHistory>().map(|h| h.records)
    }

    pub fn save_stats(&mut self, stats: &StateStats) -> Result<(), PersistenceError> {
        self.save(&PersistentStateStats::new(stats))
    }

    pub fn load_stats(&self) -> Option<StateStats> {
        self.load::<PersistentStateStats>().map(|s| s.stats)
    }

    pub fn save_alert(&mut self, snapshot: &AlertSnapshot, now: Timestamp) -> Result<(), PersistenceError> {
        self.save(&PersistentAlertData {
            snapshot: snapshot.clone(),
            saved_at: now,
            checksum: String::new(),
        })
    }

    pub fn load_alert(&self) -> Option<AlertSnapshot> {
        self.load::<PersistentAlertData>().map(|a| a.snapshot)
    }

    pub fn save_queue(&mut self, messages: &[QueuedMessage], now: Timestamp) -> Result<(), PersistenceError> {
        self.save(&PersistentQueue {
            messages: messages.to_vec(),
            saved_at: now,
            checksum: String::new(),
        })
    }

    pub fn load_queue(&self) -> Option<Vec<QueuedMessage>> {
        self.load::<PersistentQueue>().map(|q| q.messages)
    }

    /// Save state, history and stats. Writes the header first if the store
    /// has none yet, so the next `initialize` sees the records as intact.
    pub fn save_complete(&mut self, evaluator: &StateEvaluator, now: Timestamp) -> Result<(), PersistenceError> {
        if !matches!(self.load::<StoreHeader>(), Some(h) if h.is_recognized()) {
            self.save(&StoreHeader::new(now))?;
        }
        self.save_state(evaluator)?;
        self.save_history(&evaluator.history())?;
        self.save_stats(evaluator.stats())?;
        self.last_save_time = now;
        log::info!(
            "{} STATE_SAVED state={} history={}",
            self.ctx,
            evaluator.state().name(),
            evaluator.history().len()
        );
        Ok(())
    }

    /// Restore evaluator state. Returns `false` if the state record is
    /// missing or corrupted; history and stats are restored independently.
    pub fn load_complete(&self, evaluator: &mut StateEvaluator) -> bool {
        let state = match self.load_state() {
            Some(state) => state,
            None => {
                log::info!("{} STATE_LOAD_SKIPPED reason=no_valid_state", self.ctx);
                return false;
            }
        };

        evaluator.restore_status(state.to_status(), state.state_start_time);
        if let Some(history) = self.load_history() {
            evaluator.restore_history(history);
        }
        if let Some(stats) = self.load_stats() {
            evaluator.restore_stats(stats);
        }
        log::info!(
            "{} STATE_LOADED state={} score={}",
            self.ctx,
            state.current_state.name(),
            state.health_score
        );
        true
    }

    /// Required records must be present and intact; optional ones only need
    /// to be intact if present.
    pub fn verify_integrity(&self) -> bool {
        let required = [
            self.record_intact::<PersistentStateData>(),
            self.record_intact::<PersistentStateHistory>(),
            self.record_intact::<PersistentStateStats>(),
        ];
        let optional = [
            self.record_intact::<PersistentAlertData>(),
            self.record_intact::<PersistentQueue>(),
        ];

        let valid = required.iter().all(|r| *r == Some(true))
            && optional.iter().all(|r| *r != Some(false));
        log::debug!("{} INTEGRITY_CHECK valid={}", self.ctx, valid);
        valid
    }

    /// Rewrite broken required records with defaults and drop broken
    /// optional ones. Returns whether anything was repaired.
    pub fn repair_corrupted(&mut self) -> Result<bool, PersistenceError> {
        let mut repaired = Vec::new();

        if self.record_intact::<PersistentStateData>() != Some(true) {
            self.save(&PersistentStateData::default())?;
            repaired.push(RECORD_STATE);
        }
        if self.record_intact::<PersistentStateHistory>() != Some(true) {
            self.save(&PersistentStateHistory::default())?;
            repaired.push(RECORD_HISTORY);
        }
        if self.record_intact::<PersistentStateStats>() != Some(true) {
            self.save(&PersistentStateStats::default())?;
            repaired.push(RECORD_STATS);
        }
        if self.record_intact::<PersistentAlertData>() == Some(false) {
            self.store.remove(RECORD_ALERT)?;
            repaired.push(RECORD_ALERT);
        }
        if self.record_intact::<PersistentQueue>() == Some(false) {
            self.store.remove(RECORD_QUEUE)?;
            repaired.push(RECORD_QUEUE);
        }

        if repaired.is_empty() {
            return Ok(false);
        }
        log::warn!("{} STORE_REPAIRED records={}", self.ctx, repaired.join(","));
        Ok(true)
    }

    pub fn clear_all(&mut self) -> Result<(), PersistenceError> {
        let keys = self.store.keys()?;
        for key in &keys {
            self.store.remove(key)?;
        }
        self.last_save_time = 0;
        log::info!("{} STORE_CLEARED records={}", self.ctx, keys.len());
        Ok(())
    }

    pub fn has_valid_data(&self) -> bool {
        matches!(self.load::<StoreHeader>(), Some(h) if h.is_recognized()) && self.verify_integrity()
    }

    /// Total bytes held by all records.
    pub fn storage_usage(&self) -> usize {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                log::warn!("{} STORAGE_USAGE_FAILED error={}", self.ctx, e);
                return 0;
            }
        };
        keys.iter()
            .filter_map(|key| self.store.read(key).ok().flatten())
            .map(|bytes| bytes.len())
            .sum()
    }

    pub fn set_auto_save_interval(&mut self, interval_ms: u64) {
        if interval_ms < MIN_AUTO_SAVE_INTERVAL_MS {
            log::warn!(
                "{} AUTO_SAVE_INTERVAL_CLAMPED requested_ms={} min_ms={}",
                self.ctx,
                interval_ms,
                MIN_AUTO_SAVE_INTERVAL_MS
            );
        }
        self.config.auto_save_interval = interval_ms.max(MIN_AUTO_SAVE_INTERVAL_MS);
    }

    pub fn set_auto_save_enabled(&mut self, enabled: bool) {
        self.config.auto_save_enabled = enabled;
    }

    pub fn needs_auto_save(&self, now: Timestamp) -> bool {
        self.config.auto_save_enabled
            && now.saturating_sub(self.last_save_time) >= self.config.auto_save_interval
    }

    pub fn last_save_time(&self) -> Timestamp {
        self.last_save_time
    }

    pub fn data_version(&self) -> Option<u32> {
        self.load::<StoreHeader>().map(|h| h.version)
    }

    /// Write, read back and remove a scratch record.
    pub fn self_test(&mut self) -> bool {
        let scratch = b"plantcare-self-test";
        let ok = self.store.write(SELF_TEST_KEY, scratch).is_ok()
            && matches!(self.store.read(SELF_TEST_KEY), Ok(Some(ref bytes)) if bytes == scratch)
            && self.store.remove(SELF_TEST_KEY).is_ok();
        if ok {
            log::info!("{} SELF_TEST_PASSED", self.ctx);
        } else {
            log::warn!("{} SELF_TEST_FAILED", self.ctx);
        }
        ok
    }

    pub fn persistence_info(&self) -> Value {
        json!({
            "initialized": self.initialized,
            "lastSaveTime": self.last_save_time,
            "autoSaveEnabled": self.config.auto_save_enabled,
            "autoSaveInterval": self.config.auto_save_interval,
            "dataVersion": self.data_version(),
            "storageUsage": self.storage_usage(),
            "hasValidData": self.has_valid_data(),
            "records": self.store.keys().unwrap_or_default(),
        })
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}
