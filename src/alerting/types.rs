//! Alert lifecycle types.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::evaluation::PlantState;
use crate::Timestamp;

pub const DEFAULT_ALERT_DELAY_MS: u64 = 30 * 60 * 1000;
pub const DEFAULT_REPEAT_INTERVAL_MS: u64 = 2 * 60 * 60 * 1000;
pub const DEFAULT_SNOOZE_TIME_MS: u64 = 30 * 60 * 1000;
pub const DEFAULT_MAX_REPEAT_COUNT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    #[default]
    None,
    NeedsWater,
    NeedsLight,
    LowBattery,
    SensorError,
    Critical,
}

impl AlertType {
    /// Alert type raised for an evaluated plant state, with its urgency.
    ///
    /// Returns `None` for states that should clear the alert.
    pub fn for_plant_state(state: PlantState) -> Option<(AlertType, bool)> {
        match state {
            PlantState::NeedsWater => Some((AlertType::NeedsWater, false)),
            PlantState::NeedsLight => Some((AlertType::NeedsLight, false)),
            PlantState::Critical => Some((AlertType::Critical, true)),
            PlantState::Healthy | PlantState::Unknown => None,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AlertType::NeedsWater => "plant needs water",
            AlertType::NeedsLight => "plant needs more light",
            AlertType::LowBattery => "battery is low",
            AlertType::SensorError => "sensor failure",
            AlertType::Critical => "plant is in critical condition",
            AlertType::None => "",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AlertType::None => "none",
            AlertType::NeedsWater => "needs_water",
            AlertType::NeedsLight => "needs_light",
            AlertType::LowBattery => "low_battery",
            AlertType::SensorError => "sensor_error",
            AlertType::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertState {
    #[default]
    Inactive,
    Pending,
    Active,
    Acknowledged,
    Snoozed,
}

/// Snapshot of the single alert lifecycle owned by a device.
///
/// Whenever `alert_type != None`, `state != Inactive`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AlertInfo {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub state: AlertState,
    pub start_time: Timestamp,
    pub last_alert_time: Timestamp,
    pub acknowledge_time: Timestamp,
    pub repeat_count: u32,
    pub is_urgent: bool,
    pub message: String,
}

impl AlertInfo {
    pub fn inactive() -> Self {
        Self::default()
    }

    pub(crate) fn pending(alert_type: AlertType, is_urgent: bool, now: Timestamp) -> Self {
        Self {
            alert_type,
            state: AlertState::Pending,
            start_time: now,
            last_alert_time: 0,
            acknowledge_time: 0,
            repeat_count: 0,
            is_urgent,
            message: alert_type.message().to_string(),
        }
    }
}

/// Side effect emitted by the alert machine for the caller to dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertEffect {
    /// The alert entered or re-fired `Active`.
    Triggered(AlertInfo),
    /// The alert left `Active`.
    Stopped(AlertInfo),
}

impl AlertEffect {
    pub fn info(&self) -> &AlertInfo {
        match self {
            AlertEffect::Triggered(info) | AlertEffect::Stopped(info) => info,
        }
    }

    pub fn is_triggered(&self) -> bool {
        matches!(self, AlertEffect::Triggered(_))
    }
}

/// Alert timing, all durations in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AlertTiming {
    pub alert_delay: u64,
    pub repeat_interval: u64,
    pub snooze_time: u64,
    pub max_repeat_count: u32,
}

impl Default for AlertTiming {
    fn default() -> Self {
        Self {
            alert_delay: DEFAULT_ALERT_DELAY_MS,
            repeat_interval: DEFAULT_REPEAT_INTERVAL_MS,
            snooze_time: DEFAULT_SNOOZE_TIME_MS,
            max_repeat_count: DEFAULT_MAX_REPEAT_COUNT,
        }
    }
}

impl AlertTiming {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repeat_interval == 0 {
            return Err(ConfigError::invalid("alerts.repeatInterval", "must be positive"));
        }
        if self.max_repeat_count == 0 {
            return Err(ConfigError::invalid("alerts.maxRepeatCount", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStatistics {
    pub total_alerts: u64,
    pub total_acknowledgments: u64,
    pub total_snoozes: u64,
}

/// Everything needed to resume an alert lifecycle after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSnapshot {
    pub alert: AlertInfo,
    /// Duration of the snooze in progress, if any.
    pub snooze_duration: u64,
    pub statistics: AlertStatistics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plant_state_mapping() {
        assert_eq!(
            AlertType::for_plant_state(PlantState::NeedsWater),
            Some((AlertType::NeedsWater, false))
        );
        assert_eq!(
            AlertType::for_plant_state(PlantState::Critical),
            Some((AlertType::Critical, true))
        );
        assert_eq!(AlertType::for_plant_state(PlantState::Healthy), None);
        assert_eq!(AlertType::for_plant_state(PlantState::Unknown), None);
    }

    #[test]
    fn test_inactive_has_no_type() {
        let info = AlertInfo::inactive();
        assert_eq!(info.alert_type, AlertType::None);
        assert_eq!(info.state, AlertState::Inactive);
    }

    #[test]
    fn test_default_timing() {
        let timing = AlertTiming::default();
        assert_eq!(timing.alert_delay, 1_800_000);
        assert_eq!(timing.repeat_interval, 7_200_000);
        assert_eq!(timing.snooze_time, 1_800_000);
        assert_eq!(timing.max_repeat_count, 10);
        assert!(timing.validate().is_ok());
    }

    #[test]
    fn test_alert_info_wire_shape() {
        let info = AlertInfo::pending(AlertType::NeedsLight, false, 42);
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["type"], "NEEDS_LIGHT");
        assert_eq!(value["state"], "PENDING");
        assert_eq!(value["startTime"], 42);
    }
}
