//! Alert state machine.
//!
//! Owns the single alert lifecycle of one device:
//! `Inactive → Pending → Active → {Acknowledged, Snoozed} → Pending ...`
//!
//! There is no internal timer. Callers drive the machine with `update(now)`
//! and dispatch the returned [`AlertEffect`]s themselves.

use serde_json::{json, Value};

use super::types::{
    AlertEffect, AlertInfo, AlertSnapshot, AlertState, AlertStatistics, AlertTiming, AlertType,
};
use crate::logging::structured::LogContext;
use crate::Timestamp;

/// The machine counts as working if it was updated within this window (ms).
const WORKING_WINDOW_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct AlertMachine {
    timing: AlertTiming,
    current: AlertInfo,
    snooze_duration: u64,
    enabled: bool,
    alerting: bool,
    last_update: Timestamp,
    statistics: AlertStatistics,
    ctx: LogContext,
}

impl AlertMachine {
    pub fn new(timing: AlertTiming, ctx: &LogContext) -> Self {
        Self {
            timing,
            current: AlertInfo::inactive(),
            snooze_duration: 0,
            enabled: true,
            alerting: false,
            last_update: 0,
            statistics: AlertStatistics::default(),
            ctx: ctx.with_component("alert"),
        }
    }

    /// Report that an abnormal condition holds.
    ///
    /// Starts a new lifecycle when the type changed or no lifecycle is
    /// running; otherwise only upgrades urgency.
    pub fn report_abnormal_state(
        &mut self,
        alert_type: AlertType,
        is_urgent: bool,
        now: Timestamp,
    ) -> Vec<AlertEffect> {
        let mut effects = Vec::new();
        if !self.enabled || alert_type == AlertType::None {
            return effects;
        }

        if self.current.alert_type != alert_type || self.current.state == AlertState::Inactive {
            self.stop(&mut effects);
            self.current = AlertInfo::pending(alert_type, is_urgent, now);
            self.snooze_duration = 0;
            log::info!(
                "{} ALERT_PENDING type={} urgent={}",
                self.ctx,
                alert_type.name(),
                is_urgent
            );
        } else if is_urgent && !self.current.is_urgent {
            self.current.is_urgent = true;
            log::info!(
                "{} ALERT_ESCALATED type={}",
                self.ctx,
                alert_type.name()
            );
        }

        effects
    }

    /// Report that conditions are normal again. Cancels any lifecycle.
    pub fn report_normal_state(&mut self, _now: Timestamp) -> Vec<AlertEffect> {
        let mut effects = Vec::new();
        if self.current.state != AlertState::Inactive {
            self.stop(&mut effects);
            log::info!(
                "{} ALERT_CLEARED type={} repeats={}",
                self.ctx,
                self.current.alert_type.name(),
                self.current.repeat_count
            );
            self.clear();
        }
        effects
    }

    /// Acknowledge the active alert. Ignored unless `Active`.
    pub fn acknowledge(&mut self, now: Timestamp) -> Vec<AlertEffect> {
        let mut effects = Vec::new();
        if self.current.state != AlertState::Active {
            log::debug!(
                "{} ACKNOWLEDGE_IGNORED state={:?}",
                self.ctx,
                self.current.state
            );
            return effects;
        }

        self.current.state = AlertState::Acknowledged;
        self.current.acknowledge_time = now;
        self.statistics.total_acknowledgments += 1;
        log::info!(
            "{} ALERT_ACKNOWLEDGED type={}",
            self.ctx,
            self.current.alert_type.name()
        );
        self.stop(&mut effects);
        effects
    }

    /// Snooze the active alert for `duration` ms (default: snooze time).
    /// Ignored unless `Active`.
    pub fn snooze(&mut self, duration: Option<u64>, now: Timestamp) -> Vec<AlertEffect> {
        let mut effects = Vec::new();
        if self.current.state != AlertState::Active {
            log::debug!("{} SNOOZE_IGNORED state={:?}", self.ctx, self.current.state);
            return effects;
        }

        let duration = duration
            .filter(|d| *d > 0)
            .unwrap_or(self.timing.snooze_time);

        self.current.state = AlertState::Snoozed;
        self.current.acknowledge_time = now;
        // Next natural repeat lands `duration` from now.
        self.current.last_alert_time =
            now.saturating_add(duration).saturating_sub(self.timing.repeat_interval);
        self.snooze_duration = duration;
        self.statistics.total_snoozes += 1;
        log::info!(
            "{} ALERT_SNOOZED type={} duration_ms={}",
            self.ctx,
            self.current.alert_type.name(),
            duration
        );
        self.stop(&mut effects);
        effects
    }

    /// Advance the machine to `now`.
    pub fn update(&mut self, now: Timestamp) -> Vec<AlertEffect> {
        let mut effects = Vec::new();
        if !self.enabled {
            return effects;
        }
        self.last_update = now;

        match self.current.state {
            AlertState::Inactive | AlertState::Pending => {}
            AlertState::Acknowledged => {
                if now.saturating_sub(self.current.acknowledge_time) >= self.timing.snooze_time {
                    self.current.state = AlertState::Pending;
                    log::info!("{} ALERT_REARMED from=acknowledged", self.ctx);
                }
            }
            AlertState::Snoozed => {
                if now.saturating_sub(self.current.acknowledge_time) >= self.snooze_duration {
                    self.current.state = AlertState::Pending;
                    self.snooze_duration = 0;
                    log::info!("{} ALERT_REARMED from=snoozed", self.ctx);
                }
            }
            AlertState::Active => {
                if self.current.repeat_count >= self.timing.max_repeat_count {
                    self.current.state = AlertState::Acknowledged;
                    self.current.acknowledge_time = now;
                    log::warn!(
                        "{} ALERT_REPEAT_CAP_REACHED type={} repeats={}",
                        self.ctx,
                        self.current.alert_type.name(),
                        self.current.repeat_count
                    );
                    self.stop(&mut effects);
                } else if now.saturating_sub(self.current.last_alert_time)
                    >= self.timing.repeat_interval
                {
                    self.trigger(now, &mut effects);
                }
                return effects;
            }
        }

        if self.current.state == AlertState::Pending && self.due(now) {
            self.trigger(now, &mut effects);
        }
        effects
    }

    fn due(&self, now: Timestamp) -> bool {
        self.current.is_urgent
            || now.saturating_sub(self.current.start_time) >= self.timing.alert_delay
    }

    fn trigger(&mut self, now: Timestamp, effects: &mut Vec<AlertEffect>) {
        if self.current.alert_type == AlertType::None {
            return;
        }
        self.current.state = AlertState::Active;
        self.current.last_alert_time = now;
        self.current.repeat_count += 1;
        self.statistics.total_alerts += 1;
        self.alerting = true;

        log::info!(
            "{} ALERT_TRIGGERED type={} repeat={} urgent={}",
            self.ctx,
            self.current.alert_type.name(),
            self.current.repeat_count,
            self.current.is_urgent
        );
        effects.push(AlertEffect::Triggered(self.current.clone()));
    }

    fn stop(&mut self, effects: &mut Vec<AlertEffect>) {
        if self.alerting {
            self.alerting = false;
            log::debug!("{} ALERT_STOPPED type={}", self.ctx, self.current.alert_type.name());
            effects.push(AlertEffect::Stopped(self.current.clone()));
        }
    }

    fn clear(&mut self) {
        // Single assignment keeps type and state consistent.
        self.current = AlertInfo::inactive();
        self.snooze_duration = 0;
    }

    /// Stop any signal and return to `Inactive`.
    pub fn reset(&mut self) -> Vec<AlertEffect> {
        let mut effects = Vec::new();
        self.stop(&mut effects);
        self.clear();
        log::info!("{} ALERT_MACHINE_RESET", self.ctx);
        effects
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Vec<AlertEffect> {
        self.enabled = enabled;
        log::info!("{} ALERT_MACHINE_ENABLED enabled={}", self.ctx, enabled);
        if enabled {
            Vec::new()
        } else {
            self.reset()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn current_alert(&self) -> &AlertInfo {
        &self.current
    }

    pub fn state(&self) -> AlertState {
        self.current.state
    }

    pub fn has_active_alert(&self) -> bool {
        self.current.state != AlertState::Inactive
    }

    pub fn is_alerting(&self) -> bool {
        self.alerting
    }

    pub fn timing(&self) -> &AlertTiming {
        &self.timing
    }

    pub fn set_timing(&mut self, timing: AlertTiming) {
        self.timing = timing;
        log::info!("{} ALERT_TIMING_UPDATED {:?}", self.ctx, timing);
    }

    pub fn set_alert_delay(&mut self, delay_ms: u64) {
        self.timing.alert_delay = delay_ms;
    }

    pub fn set_repeat_interval(&mut self, interval_ms: u64) {
        self.timing.repeat_interval = interval_ms;
    }

    pub fn set_snooze_time(&mut self, snooze_ms: u64) {
        self.timing.snooze_time = snooze_ms;
    }

    pub fn set_max_repeat_count(&mut self, count: u32) {
        self.timing.max_repeat_count = count;
    }

    pub fn abnormal_duration(&self, now: Timestamp) -> u64 {
        if self.current.state == AlertState::Inactive {
            0
        } else {
            now.saturating_sub(self.current.start_time)
        }
    }

    /// Milliseconds until the machine next fires, or `None` when nothing is
    /// scheduled.
    pub fn time_to_next_alert(&self, now: Timestamp) -> Option<u64> {
        let remaining = |since: Timestamp, window: u64| since.saturating_add(window).saturating_sub(now);
        match self.current.state {
            AlertState::Inactive => None,
            AlertState::Pending if self.current.is_urgent => Some(0),
            AlertState::Pending => Some(remaining(self.current.start_time, self.timing.alert_delay)),
            AlertState::Active if self.current.repeat_count >= self.timing.max_repeat_count => None,
            AlertState::Active => Some(remaining(
                self.current.last_alert_time,
                self.timing.repeat_interval,
            )),
            AlertState::Acknowledged => Some(remaining(
                self.current.acknowledge_time,
                self.timing.snooze_time,
            )),
            AlertState::Snoozed => Some(remaining(
                self.current.acknowledge_time,
                self.snooze_duration,
            )),
        }
    }

    pub fn is_working(&self, now: Timestamp) -> bool {
        self.enabled && now.saturating_sub(self.last_update) < WORKING_WINDOW_MS
    }

    pub fn statistics(&self) -> &AlertStatistics {
        &self.statistics
    }

    pub fn reset_statistics(&mut self) {
        self.statistics = AlertStatistics::default();
    }

    pub fn snapshot(&self) -> AlertSnapshot {
        AlertSnapshot {
            alert: self.current.clone(),
            snooze_duration: self.snooze_duration,
            statistics: self.statistics,
        }
    }

    /// Resume a persisted lifecycle. Inconsistent snapshots restore as
    /// `Inactive`.
    pub fn restore(&mut self, snapshot: AlertSnapshot) {
        let consistent = (snapshot.alert.alert_type == AlertType::None)
            == (snapshot.alert.state == AlertState::Inactive);
        self.statistics = snapshot.statistics;
        if !consistent {
            log::warn!(
                "{} ALERT_RESTORE_INCONSISTENT type={} state={:?}",
                self.ctx,
                snapshot.alert.alert_type.name(),
                snapshot.alert.state
            );
            self.clear();
            self.alerting = false;
            return;
        }
        self.alerting = snapshot.alert.state == AlertState::Active;
        self.snooze_duration = snapshot.snooze_duration;
        self.current = snapshot.alert;
        log::info!(
            "{} ALERT_RESTORED type={} state={:?}",
            self.ctx,
            self.current.alert_type.name(),
            self.current.state
        );
    }

    pub fn system_info(&self, now: Timestamp) -> Value {
        json!({
            "enabled": self.enabled,
            "alerting": self.alerting,
            "timing": self.timing,
            "currentAlert": self.current,
            "abnormalDuration": self.abnormal_duration(now),
            "timeToNextAlert": self.time_to_next_alert(now),
            "statistics": self.statistics,
            "working": self.is_working(now),
        })
    }
}

impl Default for AlertMachine {
    fn default() -> Self {
        Self::new(AlertTiming::default(), &LogContext::default())
    }
}
