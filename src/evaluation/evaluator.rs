//! Plant-state evaluator.
//!
//! Turns a validated sensor reading plus thresholds into a plant state and
//! health score, keeps a bounded history of state transitions and running
//! statistics. Invalid readings never mutate evaluator state.

use std::collections::VecDeque;

use serde_json::{json, Value};

use super::reading::SensorReading;
use super::score::health_score;
use super::state::{Evaluation, PlantState, PlantStatus, StateChangeRecord, StateStats};
use super::thresholds::ThresholdConfig;
use crate::logging::structured::LogContext;
use crate::Timestamp;

/// Maximum number of state transitions kept in memory.
pub const HISTORY_CAPACITY: usize = 10;

/// Minimum evaluation interval (ms).
pub const MIN_EVALUATION_INTERVAL_MS: u64 = 1_000;

const DEFAULT_EVALUATION_INTERVAL_MS: u64 = 60_000;

/// Classify a reading against thresholds. Pure; no bounds checking.
///
/// Equality at a threshold counts as satisfying it.
pub fn classify(reading: &SensorReading, thresholds: &ThresholdConfig) -> PlantState {
    let needs_water = reading.soil_moisture < thresholds.moisture_low;
    let needs_light = reading.light_intensity < thresholds.light_low;
    let critical_water = reading.soil_moisture < thresholds.moisture_critical;
    let critical_light = reading.light_intensity < thresholds.light_critical;
    let temperature_ok = thresholds.is_temperature_safe(reading.temperature);

    if critical_water || critical_light || !temperature_ok || (needs_water && needs_light) {
        PlantState::Critical
    } else if needs_water {
        PlantState::NeedsWater
    } else if needs_light {
        PlantState::NeedsLight
    } else {
        PlantState::Healthy
    }
}

/// Human-readable status line for a state.
pub fn status_message(
    state: PlantState,
    reading: &SensorReading,
    thresholds: &ThresholdConfig,
) -> String {
    match state {
        PlantState::Healthy => {
            if thresholds.is_temperature_optimal(reading.temperature) {
                "plant is healthy, conditions are ideal".to_string()
            } else {
                "plant is healthy".to_string()
            }
        }
        PlantState::NeedsWater => {
            format!("plant needs water (moisture: {:.1}%)", reading.soil_moisture)
        }
        PlantState::NeedsLight => {
            format!("plant needs more light (light: {:.0} lux)", reading.light_intensity)
        }
        PlantState::Critical => {
            let mut causes = Vec::new();
            if reading.soil_moisture < thresholds.moisture_critical {
                causes.push("severe drought");
            }
            if reading.light_intensity < thresholds.light_critical {
                causes.push("severe darkness");
            }
            if !thresholds.is_temperature_safe(reading.temperature) {
                causes.push("temperature out of range");
            }
            if causes.is_empty() {
                causes.push("lacking both water and light");
            }
            format!("plant is critical: {}", causes.join(", "))
        }
        PlantState::Unknown => "state unknown".to_string(),
    }
}

/// Stateful evaluator for one device.
#[derive(Debug, Clone)]
pub struct StateEvaluator {
    thresholds: ThresholdConfig,
    thresholds_customized: bool,
    status: PlantStatus,
    previous_state: PlantState,
    state_start_time: Timestamp,
    last_evaluation_time: Timestamp,
    evaluation_interval: u64,
    history: VecDeque<StateChangeRecord>,
    stats: StateStats,
    ctx: LogContext,
}

impl StateEvaluator {
    pub fn new(thresholds: ThresholdConfig, ctx: &LogContext) -> Self {
        Self {
            thresholds,
            thresholds_customized: false,
            status: PlantStatus::default(),
            previous_state: PlantState::Unknown,
            state_start_time: 0,
            last_evaluation_time: 0,
            evaluation_interval: DEFAULT_EVALUATION_INTERVAL_MS,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            stats: StateStats::default(),
            ctx: ctx.with_component("evaluator"),
        }
    }

    /// Evaluate a reading.
    ///
    /// Invalid readings are rejected and the previous result is returned
    /// unchanged.
    pub fn evaluate(&mut self, reading: &SensorReading) -> Evaluation {
        if let Some(field) = reading.invalid_field() {
            log::warn!(
                "{} READING_REJECTED field={} timestamp={}",
                self.ctx,
                field,
                reading.timestamp
            );
            return self.current_evaluation(false);
        }

        let new_state = classify(reading, &self.thresholds);
        let score = health_score(reading, &self.thresholds);
        let message = status_message(new_state, reading, &self.thresholds);
        let old_state = self.status.state;

        if self.last_evaluation_time > 0 {
            let elapsed = reading.timestamp.saturating_sub(self.last_evaluation_time);
            self.stats.accrue(old_state, elapsed);
        }

        let changed = new_state != old_state;
        if changed {
            let reason = format!(
                "sensor change: moisture={:.1}%, light={:.0}lux, temperature={:.1}C",
                reading.soil_moisture, reading.light_intensity, reading.temperature
            );
            self.record_change(old_state, new_state, reading, reason);
            self.previous_state = old_state;
            self.state_start_time = reading.timestamp;

            log::info!(
                "{} STATE_CHANGED from={} to={} score={}",
                self.ctx,
                old_state.name(),
                new_state.name(),
                score
            );
        }

        self.status = PlantStatus {
            state: new_state,
            soil_moisture: reading.soil_moisture,
            light_level: reading.light_intensity,
            temperature: reading.temperature,
            air_humidity: reading.air_humidity,
            timestamp: reading.timestamp,
            needs_attention: new_state.is_abnormal(),
            status_message: message,
            health_score: score,
        };
        self.stats.record_score(score);
        self.last_evaluation_time = reading.timestamp;

        log::debug!(
            "{} STATE_EVALUATED state={} score={}",
            self.ctx,
            new_state.name(),
            score
        );

        self.current_evaluation(changed)
    }

    /// Latest result, without evaluating anything.
    pub fn current(&self) -> Evaluation {
        self.current_evaluation(false)
    }

    fn current_evaluation(&self, changed: bool) -> Evaluation {
        Evaluation {
            state: self.status.state,
            health_score: self.status.health_score,
            needs_attention: self.status.needs_attention,
            changed,
        }
    }

    fn record_change(
        &mut self,
        previous: PlantState,
        current: PlantState,
        reading: &SensorReading,
        reason: String,
    ) {
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(StateChangeRecord {
            previous_state: previous,
            current_state: current,
            change_time: reading.timestamp,
            trigger_reading: *reading,
            reason,
        });
        self.stats.state_changes += 1;
        self.stats.last_state_change = reading.timestamp;
    }

    pub fn status(&self) -> &PlantStatus {
        &self.status
    }

    pub fn state(&self) -> PlantState {
        self.status.state
    }

    pub fn previous_state(&self) -> PlantState {
        self.previous_state
    }

    pub fn health_score(&self) -> u8 {
        self.status.health_score
    }

    pub fn needs_attention(&self) -> bool {
        self.status.needs_attention
    }

    pub fn state_start_time(&self) -> Timestamp {
        self.state_start_time
    }

    pub fn state_duration(&self, now: Timestamp) -> u64 {
        now.saturating_sub(self.state_start_time)
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    pub fn thresholds_customized(&self) -> bool {
        self.thresholds_customized
    }

    pub fn set_thresholds(&mut self, thresholds: ThresholdConfig) {
        self.thresholds = thresholds;
        self.thresholds_customized = true;
        log::info!("{} THRESHOLDS_UPDATED {:?}", self.ctx, thresholds);
    }

    pub fn reset_thresholds(&mut self) {
        self.thresholds = ThresholdConfig::default();
        self.thresholds_customized = false;
        log::info!("{} THRESHOLDS_RESET", self.ctx);
    }

    /// State transitions, newest first.
    pub fn history(&self) -> Vec<StateChangeRecord> {
        self.history.iter().rev().cloned().collect()
    }

    pub fn last_state_change(&self) -> Option<&StateChangeRecord> {
        self.history.back()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        log::info!("{} HISTORY_CLEARED", self.ctx);
    }

    pub fn stats(&self) -> &StateStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = StateStats::default();
        log::info!("{} STATS_RESET", self.ctx);
    }

    pub fn set_evaluation_interval(&mut self, interval_ms: u64) {
        self.evaluation_interval = interval_ms.max(MIN_EVALUATION_INTERVAL_MS);
    }

    pub fn evaluation_interval(&self) -> u64 {
        self.evaluation_interval
    }

    pub fn is_time_for_evaluation(&self, now: Timestamp) -> bool {
        now.saturating_sub(self.last_evaluation_time) >= self.evaluation_interval
    }

    /// Restore the cached status after a restart.
    pub fn restore_status(&mut self, status: PlantStatus, state_start_time: Timestamp) {
        self.previous_state = status.state;
        self.last_evaluation_time = status.timestamp;
        self.state_start_time = state_start_time;
        self.status = status;
        log::info!(
            "{} STATUS_RESTORED state={} score={}",
            self.ctx,
            self.status.state.name(),
            self.status.health_score
        );
    }

    /// Restore history from newest-first records.
    pub fn restore_history(&mut self, newest_first: Vec<StateChangeRecord>) {
        self.history = newest_first
            .into_iter()
            .take(HISTORY_CAPACITY)
            .rev()
            .collect();
        log::info!(
            "{} HISTORY_RESTORED records={}",
            self.ctx,
            self.history.len()
        );
    }

    pub fn restore_stats(&mut self, stats: StateStats) {
        self.stats = stats;
        log::info!(
            "{} STATS_RESTORED evaluations={}",
            self.ctx,
            self.stats.total_evaluations
        );
    }

    /// Validate thresholds and check the classification logic against a
    /// known-healthy reading. Does not mutate the evaluator.
    pub fn self_test(&self) -> bool {
        if let Err(e) = self.thresholds.validate() {
            log::warn!("{} SELF_TEST_FAILED reason={}", self.ctx, e);
            return false;
        }

        let sample = SensorReading::new(
            self.thresholds.moisture_low.max(50.0).min(100.0),
            self.thresholds.light_low.max(800.0).min(50_000.0),
            (self.thresholds.temperature_optimal_min + self.thresholds.temperature_optimal_max)
                / 2.0,
            60.0,
            1,
        );
        let state = classify(&sample, &self.thresholds);
        if state != PlantState::Healthy {
            log::warn!(
                "{} SELF_TEST_FAILED reason=sample_classified_as_{}",
                self.ctx,
                state.name()
            );
            return false;
        }

        log::info!("{} SELF_TEST_PASSED", self.ctx);
        true
    }

    /// Diagnostics snapshot.
    pub fn system_info(&self, now: Timestamp) -> Value {
        json!({
            "currentState": self.status.state,
            "stateName": self.status.state.name(),
            "healthScore": self.status.health_score,
            "needsAttention": self.status.needs_attention,
            "stateDuration": self.state_duration(now),
            "evaluationInterval": self.evaluation_interval,
            "thresholds": self.thresholds,
            "thresholdsCustomized": self.thresholds_customized,
            "stats": self.stats,
        })
    }
}

impl Default for StateEvaluator {
    fn default() -> Self {
        Self::new(ThresholdConfig::default(), &LogContext::default())
    }
}
