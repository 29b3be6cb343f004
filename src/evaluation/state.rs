//! Plant-state types produced by the evaluator.

use serde::{Deserialize, Serialize};

use super::reading::SensorReading;
use crate::Timestamp;

/// Derived plant classification.
///
/// `Unknown` is the state before the first valid reading has been evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlantState {
    #[default]
    Unknown,
    Healthy,
    NeedsWater,
    NeedsLight,
    Critical,
}

impl PlantState {
    pub fn name(&self) -> &'static str {
        match self {
            PlantState::Unknown => "unknown",
            PlantState::Healthy => "healthy",
            PlantState::NeedsWater => "needs_water",
            PlantState::NeedsLight => "needs_light",
            PlantState::Critical => "critical",
        }
    }

    /// Indicator colour (0xRRGGBB) for the annunciation layer.
    pub fn color(&self) -> u32 {
        match self {
            PlantState::Healthy => 0x00FF00,
            PlantState::NeedsWater => 0xFFFF00,
            PlantState::NeedsLight => 0xFF0000,
            PlantState::Critical => 0xFF00FF,
            PlantState::Unknown => 0x000000,
        }
    }

    pub fn is_abnormal(&self) -> bool {
        !matches!(self, PlantState::Healthy | PlantState::Unknown)
    }

    /// Higher is more severe.
    pub fn priority(&self) -> u8 {
        match self {
            PlantState::Critical => 4,
            PlantState::NeedsWater => 3,
            PlantState::NeedsLight => 2,
            PlantState::Healthy => 1,
            PlantState::Unknown => 0,
        }
    }
}

/// Latest evaluated status of the plant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantStatus {
    pub state: PlantState,
    pub soil_moisture: f32,
    pub light_level: f32,
    pub temperature: f32,
    pub air_humidity: f32,
    pub timestamp: Timestamp,
    pub needs_attention: bool,
    pub status_message: String,
    pub health_score: u8,
}

impl Default for PlantStatus {
    fn default() -> Self {
        Self {
            state: PlantState::Unknown,
            soil_moisture: 0.0,
            light_level: 0.0,
            temperature: 0.0,
            air_humidity: 0.0,
            timestamp: 0,
            needs_attention: false,
            status_message: "initializing".to_string(),
            health_score: 0,
        }
    }
}

/// Result of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub state: PlantState,
    pub health_score: u8,
    pub needs_attention: bool,
    /// Whether this evaluation changed the state.
    pub changed: bool,
}

/// One recorded state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChangeRecord {
    pub previous_state: PlantState,
    pub current_state: PlantState,
    pub change_time: Timestamp,
    pub trigger_reading: SensorReading,
    pub reason: String,
}

/// Running evaluation statistics. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateStats {
    pub total_evaluations: u64,
    pub state_changes: u64,
    pub time_in_healthy: u64,
    pub time_in_needs_water: u64,
    pub time_in_needs_light: u64,
    pub time_in_critical: u64,
    pub average_health_score: f32,
    pub last_state_change: Timestamp,
}

impl StateStats {
    pub(crate) fn accrue(&mut self, state: PlantState, elapsed: u64) {
        match state {
            PlantState::Healthy => self.time_in_healthy += elapsed,
            PlantState::NeedsWater => self.time_in_needs_water += elapsed,
            PlantState::NeedsLight => self.time_in_needs_light += elapsed,
            PlantState::Critical => self.time_in_critical += elapsed,
            PlantState::Unknown => {}
        }
    }

    pub(crate) fn record_score(&mut self, score: u8) {
        self.total_evaluations += 1;
        let n = self.total_evaluations as f32;
        self.average_health_score += (score as f32 - self.average_health_score) / n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abnormal_states() {
        assert!(!PlantState::Healthy.is_abnormal());
        assert!(!PlantState::Unknown.is_abnormal());
        assert!(PlantState::NeedsWater.is_abnormal());
        assert!(PlantState::NeedsLight.is_abnormal());
        assert!(PlantState::Critical.is_abnormal());
    }

    #[test]
    fn test_priority_order() {
        assert!(PlantState::Critical.priority() > PlantState::NeedsWater.priority());
        assert!(PlantState::NeedsWater.priority() > PlantState::NeedsLight.priority());
        assert!(PlantState::NeedsLight.priority() > PlantState::Healthy.priority());
    }

    #[test]
    fn test_running_average() {
        let mut stats = StateStats::default();
        stats.record_score(80);
        stats.record_score(60);
        assert_eq!(stats.total_evaluations, 2);
        assert!((stats.average_health_score - 70.0).abs() < 1e-4);
    }

    #[test]
    fn test_state_serializes_screaming_case() {
        let json = serde_json::to_string(&PlantState::NeedsWater).unwrap();
        assert_eq!(json, "\"NEEDS_WATER\"");
    }
}
