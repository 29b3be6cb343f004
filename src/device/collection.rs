//! Sensor data collection: cadence, buffering and error tracking.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::evaluation::SensorReading;
use crate::logging::structured::LogContext;
use crate::Timestamp;

pub const DEFAULT_COLLECTION_INTERVAL_MS: u64 = 5 * 60 * 1000;
pub const MIN_COLLECTION_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_BUFFER_SIZE: usize = 100;
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CollectionConfig {
    pub interval: u64,
    pub buffer_size: usize,
    pub max_consecutive_errors: u32,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_COLLECTION_INTERVAL_MS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
        }
    }
}

impl CollectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval < MIN_COLLECTION_INTERVAL_MS {
            return Err(ConfigError::invalid(
                "collection.interval",
                format!("must be at least {}ms", MIN_COLLECTION_INTERVAL_MS),
            ));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::invalid("collection.bufferSize", "must be at least 1"));
        }
        if self.max_consecutive_errors == 0 {
            return Err(ConfigError::invalid(
                "collection.maxConsecutiveErrors",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectionStatus {
    Idle,
    Collecting,
    Error,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub total_collections: u64,
    pub successful_collections: u64,
    pub failed_collections: u64,
    pub last_collection_time: Timestamp,
    /// Percent of collections that produced a valid reading.
    pub success_rate: f32,
    /// Mean gap between successful collections (ms).
    pub average_interval: u64,
}

#[derive(Debug, Clone)]
pub struct DataCollector {
    config: CollectionConfig,
    status: CollectionStatus,
    /// Status to return to on resume.
    resume_status: CollectionStatus,
    buffer: VecDeque<SensorReading>,
    stats: CollectionStats,
    consecutive_errors: u32,
    last_success_time: Option<Timestamp>,
    ctx: LogContext,
}

impl DataCollector {
    pub fn new(config: CollectionConfig, ctx: &LogContext) -> Self {
        let mut config = config;
        config.interval = config.interval.max(MIN_COLLECTION_INTERVAL_MS);
        config.buffer_size = config.buffer_size.max(1);
        Self {
            buffer: VecDeque::with_capacity(config.buffer_size),
            config,
            status: CollectionStatus::Idle,
            resume_status: CollectionStatus::Idle,
            stats: CollectionStats::default(),
            consecutive_errors: 0,
            last_success_time: None,
            ctx: ctx.with_component("collector"),
        }
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        if self.status == CollectionStatus::Paused {
            return false;
        }
        self.stats.total_collections == 0
            || now.saturating_sub(self.stats.last_collection_time) >= self.config.interval
    }

    /// Record one collection attempt. Returns whether the reading was valid
    /// and buffered.
    pub fn accept(&mut self, reading: &SensorReading, now: Timestamp) -> bool {
        if self.status == CollectionStatus::Paused {
            log::debug!("{} COLLECTION_SKIPPED reason=paused", self.ctx);
            return false;
        }

        self.stats.total_collections += 1;
        self.stats.last_collection_time = now;

        let accepted = reading.is_valid();
        if accepted {
            self.record_success(reading, now);
        } else {
            self.record_failure();
        }
        self.stats.success_rate =
            self.stats.successful_collections as f32 / self.stats.total_collections as f32 * 100.0;
        accepted
    }

    fn record_success(&mut self, reading: &SensorReading, now: Timestamp) {
        if let Some(previous) = self.last_success_time {
            let gap = now.saturating_sub(previous);
            let n = self.stats.successful_collections.max(1);
            // Running mean over n gaps.
            self.stats.average_interval = (self.stats.average_interval * (n - 1) + gap) / n;
        }
        self.stats.successful_collections += 1;
        self.last_success_time = Some(now);

        if self.status == CollectionStatus::Error {
            log::info!(
                "{} COLLECTION_RECOVERED after_errors={}",
                self.ctx,
                self.consecutive_errors
            );
        }
        self.consecutive_errors = 0;
        self.status = CollectionStatus::Collecting;

        if self.buffer.len() == self.config.buffer_size {
            self.buffer.pop_front();
        }
        self.buffer.push_back(*reading);
    }

    fn record_failure(&mut self) {
        self.stats.failed_collections += 1;
        self.consecutive_errors += 1;
        log::debug!(
            "{} COLLECTION_FAILED consecutive={}",
            self.ctx,
            self.consecutive_errors
        );

        if self.consecutive_errors >= self.config.max_consecutive_errors
            && self.status != CollectionStatus::Error
        {
            self.status = CollectionStatus::Error;
            log::warn!(
                "{} COLLECTION_ERROR_STATE consecutive={}",
                self.ctx,
                self.consecutive_errors
            );
        }
    }

    pub fn pause(&mut self) {
        if self.status != CollectionStatus::Paused {
            self.resume_status = self.status;
            self.status = CollectionStatus::Paused;
            log::info!("{} COLLECTION_PAUSED", self.ctx);
        }
    }

    pub fn resume(&mut self) {
        if self.status == CollectionStatus::Paused {
            self.status = self.resume_status;
            log::info!("{} COLLECTION_RESUMED status={:?}", self.ctx, self.status);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.status == CollectionStatus::Paused
    }

    pub fn status(&self) -> CollectionStatus {
        self.status
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn set_interval(&mut self, interval_ms: u64) {
        self.config.interval = interval_ms.max(MIN_COLLECTION_INTERVAL_MS);
    }

    pub fn interval(&self) -> u64 {
        self.config.interval
    }

    pub fn latest(&self) -> Option<&SensorReading> {
        self.buffer.back()
    }

    /// Up to `count` buffered readings, newest first.
    pub fn recent(&self, count: usize) -> Vec<SensorReading> {
        self.buffer.iter().rev().take(count).copied().collect()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_buffer_full(&self) -> bool {
        self.buffer.len() == self.config.buffer_size
    }

    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    pub fn stats(&self) -> &CollectionStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = CollectionStats::default();
        self.last_success_time = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid(ts: Timestamp) -> SensorReading {
        SensorReading::new(40.0, 900.0, 22.0, 50.0, ts)
    }

    fn invalid(ts: Timestamp) -> SensorReading {
        SensorReading::new(f32::NAN, 900.0, 22.0, 50.0, ts)
    }

    fn collector() -> DataCollector {
        DataCollector::new(CollectionConfig::default(), &LogContext::default())
    }

    #[test]
    fn test_due_cadence() {
        let mut collector = collector();
        assert!(collector.is_due(0));
        collector.accept(&valid(1_000), 1_000);
        assert!(!collector.is_due(1_000 + DEFAULT_COLLECTION_INTERVAL_MS - 1));
        assert!(collector.is_due(1_000 + DEFAULT_COLLECTION_INTERVAL_MS));
    }

    #[test]
    fn test_stats_and_average_interval() {
        let mut collector = collector();
        assert!(collector.accept(&valid(1_000), 1_000));
        assert!(collector.accept(&valid(3_000), 3_000));
        assert!(!collector.accept(&invalid(4_000), 4_000));
        assert!(collector.accept(&valid(7_000), 7_000));

        let stats = collector.stats();
        assert_eq!(stats.total_collections, 4);
        assert_eq!(stats.successful_collections, 3);
        assert_eq!(stats.failed_collections, 1);
        assert!((stats.success_rate - 75.0).abs() < 1e-4);
        assert_eq!(stats.average_interval, 3_000);
    }

    #[test]
    fn test_error_state_and_recovery() {
        let mut collector = collector();
        for i in 0..DEFAULT_MAX_CONSECUTIVE_ERRORS as u64 - 1 {
            collector.accept(&invalid(i + 1), i + 1);
        }
        assert_ne!(collector.status(), CollectionStatus::Error);

        collector.accept(&invalid(100), 100);
        assert_eq!(collector.status(), CollectionStatus::Error);

        assert!(collector.accept(&valid(200), 200));
        assert_eq!(collector.status(), CollectionStatus::Collecting);
        assert_eq!(collector.consecutive_errors(), 0);
    }

    #[test]
    fn test_buffer_ring() {
        let config = CollectionConfig {
            buffer_size: 3,
            ..CollectionConfig::default()
        };
        let mut collector = DataCollector::new(config, &LogContext::default());
        for ts in 1..=5 {
            collector.accept(&valid(ts), ts);
        }
        assert!(collector.is_buffer_full());
        assert_eq!(collector.latest().map(|r| r.timestamp), Some(5));
        let recent: Vec<Timestamp> = collector.recent(10).iter().map(|r| r.timestamp).collect();
        assert_eq!(recent, vec![5, 4, 3]);
    }

    #[test]
    fn test_pause_resume() {
        let mut collector = collector();
        collector.accept(&valid(1), 1);
        collector.pause();
        assert!(!collector.is_due(u64::MAX));
        assert!(!collector.accept(&valid(2), 2));
        assert_eq!(collector.stats().total_collections, 1);

        collector.resume();
        assert_eq!(collector.status(), CollectionStatus::Collecting);
    }

    #[test]
    fn test_interval_clamped() {
        let mut collector = collector();
        collector.set_interval(10);
        assert_eq!(collector.interval(), MIN_COLLECTION_INTERVAL_MS);
    }
}
