//! Aggregated runtime configuration.
//!
//! Every section deserializes with defaults, so partial JSON documents work:
//!
//! ```json
//! { "deviceId": "greenhouse-3", "alerts": { "alertDelay": 600000 } }
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::alerting::AlertTiming;
use crate::device::CollectionConfig;
use crate::evaluation::ThresholdConfig;
use crate::persistence::PersistenceConfig;
use crate::protocol::validation::is_valid_device_id;
use crate::protocol::ProtocolConfig;

pub const DEFAULT_DEVICE_ID: &str = "plantcare-device";

/// Environment variable overriding `deviceId`.
pub const ENV_DEVICE_ID: &str = "PLANTCARE_DEVICE_ID";
/// Environment variable overriding `persistence.dataDir`.
pub const ENV_DATA_DIR: &str = "PLANTCARE_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoreConfig {
    pub device_id: String,
    pub thresholds: ThresholdConfig,
    pub alerts: AlertTiming,
    pub protocol: ProtocolConfig,
    pub persistence: PersistenceConfig,
    pub collection: CollectionConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID.to_string(),
            thresholds: ThresholdConfig::default(),
            alerts: AlertTiming::default(),
            protocol: ProtocolConfig::default(),
            persistence: PersistenceConfig::default(),
            collection: CollectionConfig::default(),
        }
    }
}

impl CoreConfig {
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load and validate configuration from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        let config = Self::from_json_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// First loadable file wins; otherwise defaults.
    pub fn load_or_default(paths: &[PathBuf]) -> Self {
        for path in paths {
            if !path.exists() {
                continue;
            }
            match Self::load(path) {
                Ok(config) => {
                    log::info!("CONFIG_LOADED path={}", path.display());
                    return config;
                }
                Err(e) => {
                    log::warn!("CONFIG_LOAD_FAILED path={} error={:#}", path.display(), e);
                }
            }
        }

        log::warn!("CONFIG_DEFAULTS reason=no_config_file candidates={}", paths.len());
        Self::default()
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(device_id) = lookup(ENV_DEVICE_ID).filter(|v| !v.is_empty()) {
            log::info!("CONFIG_OVERRIDE key={} value={}", ENV_DEVICE_ID, device_id);
            self.device_id = device_id;
        }
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.is_empty()) {
            log::info!("CONFIG_OVERRIDE key={} value={}", ENV_DATA_DIR, dir);
            self.persistence.data_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_device_id(&self.device_id) {
            return Err(ConfigError::invalid(
                "deviceId",
                format!("'{}' must match [A-Za-z0-9_.:-]{{1,64}}", self.device_id),
            ));
        }
        self.thresholds.validate()?;
        self.alerts.validate()?;
        self.protocol.validate()?;
        self.persistence.validate()?;
        self.collection.validate()?;
        Ok(())
    }

    pub fn log_config(&self) {
        log::info!(
            "CONFIG device_id={} primary_channel={:?} fallback_channel={:?}",
            self.device_id,
            self.protocol.primary_channel,
            self.protocol.fallback_channel
        );
        log::info!(
            "CONFIG_THRESHOLDS moisture_low={} moisture_critical={} light_low={} light_critical={} temperature={}..{}",
            self.thresholds.moisture_low,
            self.thresholds.moisture_critical,
            self.thresholds.light_low,
            self.thresholds.light_critical,
            self.thresholds.temperature_min,
            self.thresholds.temperature_max
        );
        log::info!(
            "CONFIG_ALERTS delay_ms={} repeat_ms={} snooze_ms={} max_repeats={}",
            self.alerts.alert_delay,
            self.alerts.repeat_interval,
            self.alerts.snooze_time,
            self.alerts.max_repeat_count
        );
        log::info!(
            "CONFIG_PROTOCOL heartbeat_ms={} sync_ms={} max_queue={} ttl_ms={} signed_commands={}",
            self.protocol.heartbeat_interval,
            self.protocol.sync_interval,
            self.protocol.max_queue_size,
            self.protocol.message_ttl,
            self.protocol.require_signed_commands
        );
        log::info!(
            "CONFIG_STORAGE data_dir={} auto_save={} auto_save_ms={} collection_ms={}",
            self.persistence.data_dir.display(),
            self.persistence.auto_save_enabled,
            self.persistence.auto_save_interval,
            self.collection.interval
        );
    }
}
