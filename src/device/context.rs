//! Per-device context.
//!
//! Owns one evaluator, alert machine, protocol, persistence manager and
//! collector, and wires them together for the outer loop. Any number of
//! contexts can live in one process.

use serde_json::{json, Value};

use super::collection::{CollectionStatus, DataCollector};
use crate::alerting::{AlertEffect, AlertMachine, AlertType};
use crate::config::CoreConfig;
use crate::evaluation::{Evaluation, SensorReading, StateEvaluator};
use crate::logging::structured::LogContext;
use crate::persistence::{PersistenceError, RecordStore, StatePersistence, StoreStatus};
use crate::protocol::{
    CommunicationProtocol, MessageBuilder, MessageHeader, MessageType, ProtocolError,
    ProtocolEvent, Transport,
};
use crate::Timestamp;

/// Everything one step of the device produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub evaluation: Evaluation,
    pub alert_effects: Vec<AlertEffect>,
    pub protocol_events: Vec<ProtocolEvent>,
}

impl TickReport {
    pub fn triggered(&self) -> impl Iterator<Item = &AlertEffect> {
        self.alert_effects.iter().filter(|e| e.is_triggered())
    }
}

pub struct DeviceContext<T: Transport, S: RecordStore> {
    config: CoreConfig,
    evaluator: StateEvaluator,
    alerts: AlertMachine,
    protocol: CommunicationProtocol<T>,
    persistence: StatePersistence<S>,
    collector: DataCollector,
    ctx: LogContext,
}

impl<T: Transport, S: RecordStore> DeviceContext<T, S> {
    pub fn new(config: CoreConfig, transport: T, store: S) -> Self {
        let ctx = LogContext::new(&config.device_id);
        let device = Self {
            evaluator: StateEvaluator::new(config.thresholds, &ctx),
            alerts: AlertMachine::new(config.alerts, &ctx),
            protocol: CommunicationProtocol::new(config.protocol.clone(), transport, &ctx),
            persistence: StatePersistence::new(store, config.persistence.clone(), &ctx),
            collector: DataCollector::new(config.collection.clone(), &ctx),
            ctx: ctx.with_component("device"),
            config,
        };
        crate::log_info!(device.ctx, "DEVICE_CREATED", device_id = device.config.device_id);
        device
    }

    /// Feed one sensor sample through the whole core.
    pub fn ingest(&mut self, reading: SensorReading, now: Timestamp) -> TickReport {
        if self.collector.is_paused() {
            return self.tick(now);
        }

        let mut alert_effects = Vec::new();
        let accepted = self.collector.accept(&reading, now);
        let evaluation = self.evaluator.evaluate(&reading);

        if accepted {
            let payload = MessageBuilder::sensor_data(&self.config.device_id, &reading);
            self.protocol.send(MessageType::SensorData, payload, false, now);

            if evaluation.changed {
                let payload =
                    MessageBuilder::plant_status(&self.config.device_id, self.evaluator.status());
                self.protocol.send(MessageType::PlantStatus, payload, false, now);
            }

            match AlertType::for_plant_state(evaluation.state) {
                Some((alert_type, urgent)) => {
                    alert_effects.extend(self.alerts.report_abnormal_state(alert_type, urgent, now));
                }
                None => alert_effects.extend(self.alerts.report_normal_state(now)),
            }
        } else if self.collector.status() == CollectionStatus::Error {
            alert_effects.extend(self.alerts.report_abnormal_state(
                AlertType::SensorError,
                false,
                now,
            ));
        }

        self.step(now, evaluation, alert_effects)
    }

    /// Time-only step: alert timers, protocol housekeeping, auto-save.
    pub fn tick(&mut self, now: Timestamp) -> TickReport {
        let evaluation = self.evaluator.current();
        self.step(now, evaluation, Vec::new())
    }

    fn step(
        &mut self,
        now: Timestamp,
        evaluation: Evaluation,
        mut alert_effects: Vec<AlertEffect>,
    ) -> TickReport {
        alert_effects.extend(self.alerts.update(now));
        self.dispatch_alerts(&alert_effects, now);
        self.protocol.update(now);

        if self.persistence.needs_auto_save(now) {
            if let Err(e) = self.save_all(now) {
                crate::log_warn!(self.ctx, "AUTO_SAVE_FAILED", error = e.to_string());
            }
        }

        TickReport {
            evaluation,
            alert_effects,
            protocol_events: self.protocol.drain_events(),
        }
    }

    /// Every triggered alert becomes a priority notification.
    fn dispatch_alerts(&mut self, effects: &[AlertEffect], now: Timestamp) {
        for effect in effects.iter().filter(|e| e.is_triggered()) {
            let payload = MessageBuilder::alert(&self.config.device_id, effect.info(), now);
            self.protocol.send(MessageType::AlertNotification, payload, true, now);
        }
    }

    pub fn acknowledge(&mut self, now: Timestamp) -> Vec<AlertEffect> {
        self.alerts.acknowledge(now)
    }

    pub fn snooze(&mut self, duration: Option<u64>, now: Timestamp) -> Vec<AlertEffect> {
        self.alerts.snooze(duration, now)
    }

    /// Update link state. Coming back online triggers an immediate sync.
    pub fn set_network_available(&mut self, available: bool, now: Timestamp) -> Vec<ProtocolEvent> {
        let was_available = self.protocol.is_network_available();
        self.protocol.set_network_available(available);
        if available && !was_available && self.config.protocol.enable_data_sync {
            self.protocol.start_sync(now);
        }
        self.protocol.drain_events()
    }

    pub fn set_offline_mode(&mut self, offline: bool, now: Timestamp) -> Vec<ProtocolEvent> {
        let was_offline = self.protocol.is_offline_mode();
        self.protocol.set_offline_mode(offline);
        if was_offline && !offline && self.config.protocol.enable_data_sync {
            self.protocol.start_sync(now);
        }
        self.protocol.drain_events()
    }

    /// Validate an inbound frame. The resulting `MessageReceived` (or
    /// `Error`) event is returned by the next `drain_events` or step.
    pub fn handle_inbound(&mut self, raw: &str, now: Timestamp) -> Result<MessageHeader, ProtocolError> {
        self.protocol.handle_inbound(raw, now)
    }

    pub fn drain_events(&mut self) -> Vec<ProtocolEvent> {
        self.protocol.drain_events()
    }

    /// Load persisted state. Returns whether previously saved evaluator
    /// state was restored; a fresh store only gets defaults written, and a
    /// corrupted state record counts as absent even after repair.
    pub fn restore(&mut self, now: Timestamp) -> Result<bool, PersistenceError> {
        let saved_state = self.persistence.load_state().is_some();
        let store_status = self.persistence.initialize(now)?;
        let restored = saved_state
            && store_status != StoreStatus::Fresh
            && self.persistence.load_complete(&mut self.evaluator);

        if let Some(snapshot) = self.persistence.load_alert() {
            self.alerts.restore(snapshot);
        }
        let queued = match self.persistence.load_queue() {
            Some(messages) => {
                let count = messages.len();
                self.protocol.restore_queue(messages);
                count
            }
            None => 0,
        };

        crate::log_info!(
            self.ctx,
            "DEVICE_RESTORED",
            store = store_status,
            state_restored = restored,
            queued = queued,
        );
        Ok(restored)
    }

    fn save_all(&mut self, now: Timestamp) -> Result<(), PersistenceError> {
        self.persistence.save_complete(&self.evaluator, now)?;
        self.persistence.save_alert(&self.alerts.snapshot(), now)?;
        self.persistence.save_queue(&self.protocol.queue_snapshot(), now)?;
        Ok(())
    }

    /// Persist everything before power-down.
    pub fn shutdown(&mut self, now: Timestamp) -> Result<(), PersistenceError> {
        self.save_all(now)?;
        crate::log_info!(
            self.ctx,
            "DEVICE_SHUTDOWN",
            queued = self.protocol.queue_len(),
            alert = self.alerts.state(),
        );
        Ok(())
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn device_id(&self) -> &str {
        &self.config.device_id
    }

    pub fn evaluator(&self) -> &StateEvaluator {
        &self.evaluator
    }

    pub fn evaluator_mut(&mut self) -> &mut StateEvaluator {
        &mut self.evaluator
    }

    pub fn alerts(&self) -> &AlertMachine {
        &self.alerts
    }

    pub fn alerts_mut(&mut self) -> &mut AlertMachine {
        &mut self.alerts
    }

    pub fn protocol(&self) -> &CommunicationProtocol<T> {
        &self.protocol
    }

    pub fn protocol_mut(&mut self) -> &mut CommunicationProtocol<T> {
        &mut self.protocol
    }

    pub fn persistence(&self) -> &StatePersistence<S> {
        &self.persistence
    }

    pub fn persistence_mut(&mut self) -> &mut StatePersistence<S> {
        &mut self.persistence
    }

    pub fn collector(&self) -> &DataCollector {
        &self.collector
    }

    pub fn collector_mut(&mut self) -> &mut DataCollector {
        &mut self.collector
    }

    pub fn system_info(&self, now: Timestamp) -> Value {
        json!({
            "deviceId": self.config.device_id,
            "evaluator": self.evaluator.system_info(now),
            "alerts": self.alerts.system_info(now),
            "protocol": self.protocol.system_info(),
            "persistence": self.persistence.persistence_info(),
            "collection": {
                "status": self.collector.status(),
                "stats": self.collector.stats(),
                "buffered": self.collector.buffer_len(),
            },
        })
    }
}
