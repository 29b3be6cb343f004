//! Resilient message layer.
//!
//! Frames domain messages, delivers them immediately when the link is up and
//! otherwise buffers them for the next sync pass. Inbound frames are
//! validated and surfaced as events; payload semantics are left to the
//! caller.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use super::builder::MessageBuilder;
use super::message::{new_message_id, Frame, MessageHeader, MessageType, QueuedMessage};
use super::queue::MessageQueue;
use super::transport::{Channel, Transport};
use super::validation::validate_frame;
use crate::config::ConfigError;
use crate::logging::structured::LogContext;
use crate::security::signature::{AuthError, TrustedKeys};
use crate::Timestamp;

pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 5 * 60 * 1000;
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;
pub const DEFAULT_MESSAGE_TTL_MS: u64 = 24 * 60 * 60 * 1000;
pub const DEFAULT_TIMESTAMP_TOLERANCE_MS: u64 = 5 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("timestamp outside tolerance by {skew_ms}ms")]
    StaleTimestamp { skew_ms: u64 },

    #[error("invalid device id '{0}'")]
    InvalidDeviceId(String),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u32),

    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("unauthenticated command: {0}")]
    Unauthenticated(#[from] AuthError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProtocolConfig {
    pub primary_channel: Channel,
    pub fallback_channel: Option<Channel>,
    pub heartbeat_interval: u64,
    pub sync_interval: u64,
    pub max_queue_size: usize,
    pub message_ttl: u64,
    pub timestamp_tolerance: u64,
    pub enable_data_sync: bool,
    pub require_signed_commands: bool,
    /// Key id to base64 Ed25519 public key.
    pub trusted_keys: BTreeMap<String, String>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            primary_channel: Channel::HttpRest,
            fallback_channel: Some(Channel::WebSocket),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL_MS,
            sync_interval: DEFAULT_SYNC_INTERVAL_MS,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            message_ttl: DEFAULT_MESSAGE_TTL_MS,
            timestamp_tolerance: DEFAULT_TIMESTAMP_TOLERANCE_MS,
            enable_data_sync: true,
            require_signed_commands: false,
            trusted_keys: BTreeMap::new(),
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval == 0 {
            return Err(ConfigError::invalid("protocol.heartbeatInterval", "must be positive"));
        }
        if self.sync_interval == 0 {
            return Err(ConfigError::invalid("protocol.syncInterval", "must be positive"));
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::invalid("protocol.maxQueueSize", "must be at least 1"));
        }
        if self.message_ttl == 0 {
            return Err(ConfigError::invalid("protocol.messageTtl", "must be positive"));
        }
        if self.require_signed_commands && self.trusted_keys.is_empty() {
            return Err(ConfigError::invalid(
                "protocol.trustedKeys",
                "signed commands require at least one trusted key",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationStats {
    pub total_messages_sent: u64,
    pub total_messages_received: u64,
    pub failed_transmissions: u64,
    pub successful_transmissions: u64,
    pub last_successful_sync: Timestamp,
    pub total_bytes_transferred: u64,
    pub current_queue_size: usize,
    pub messages_evicted: u64,
    pub messages_expired: u64,
    pub messages_rejected: u64,
}

/// Event for the caller to dispatch after a protocol call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    MessageReceived { header: MessageHeader, payload: String },
    ConnectionChanged { channel: Channel, connected: bool },
    SyncComplete { success: bool, attempted: usize },
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Queued,
    /// Heartbeats are never queued.
    Dropped,
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent)
    }
}

fn load_trusted_keys(config: &ProtocolConfig, ctx: &LogContext) -> TrustedKeys {
    let mut trusted_keys = TrustedKeys::new();
    for (key_id, public_key) in &config.trusted_keys {
        if let Err(e) = trusted_keys.load_key(key_id, public_key) {
            log::warn!("{} TRUSTED_KEY_REJECTED key_id={} error={}", ctx, key_id, e);
        }
    }
    trusted_keys
}

pub struct CommunicationProtocol<T: Transport> {
    config: ProtocolConfig,
    device_id: String,
    transport: T,
    queue: MessageQueue,
    stats: CommunicationStats,
    events: Vec<ProtocolEvent>,
    trusted_keys: TrustedKeys,
    network_available: bool,
    offline_mode: bool,
    last_heartbeat: Timestamp,
    last_sync_attempt: Timestamp,
    session_id: String,
    ctx: LogContext,
}

impl<T: Transport> CommunicationProtocol<T> {
    pub fn new(config: ProtocolConfig, transport: T, ctx: &LogContext) -> Self {
        let ctx = ctx.with_component("protocol");
        let trusted_keys = load_trusted_keys(&config, &ctx);

        let session_id = new_message_id();
        log::info!(
            "{} PROTOCOL_INIT session={} primary={} keys={}",
            ctx,
            session_id,
            config.primary_channel.name(),
            trusted_keys.key_count()
        );

        Self {
            queue: MessageQueue::new(config.max_queue_size),
            device_id: ctx.device_id.clone(),
            config,
            transport,
            stats: CommunicationStats::default(),
            events: Vec::new(),
            trusted_keys,
            network_available: false,
            offline_mode: false,
            last_heartbeat: 0,
            last_sync_attempt: 0,
            session_id,
            ctx,
        }
    }

    /// Frame and send a payload, or queue it if it cannot go out now.
    pub fn send(
        &mut self,
        message_type: MessageType,
        payload: String,
        priority: bool,
        now: Timestamp,
    ) -> SendOutcome {
        let message = QueuedMessage::new(message_type, &self.device_id, payload, priority, now);
        log::debug!(
            "{} MESSAGE_CREATED id={} type={} priority={}",
            self.ctx,
            message.message_id(),
            message_type.as_str(),
            priority
        );

        if self.can_transmit() && self.transmit(&message.frame) {
            return SendOutcome::Sent;
        }

        if message_type == MessageType::Heartbeat {
            log::debug!("{} HEARTBEAT_DROPPED id={}", self.ctx, message.message_id());
            return SendOutcome::Dropped;
        }
        self.enqueue(message);
        SendOutcome::Queued
    }

    fn can_transmit(&self) -> bool {
        self.network_available && !self.offline_mode
    }

    /// Try the primary channel, then the fallback. Updates counters.
    fn transmit(&mut self, frame: &Frame) -> bool {
        let encoded = frame.encode();
        let primary = self.config.primary_channel;
        let channels = std::iter::once(primary)
            .chain(self.config.fallback_channel.filter(|c| *c != primary));

        let mut last_error = None;
        for channel in channels {
            match self.transport.transmit(channel, &encoded) {
                Ok(()) => {
                    self.stats.successful_transmissions += 1;
                    self.stats.total_messages_sent += 1;
                    self.stats.total_bytes_transferred += encoded.len() as u64;
                    log::debug!(
                        "{} MESSAGE_SENT id={} channel={} bytes={}",
                        self.ctx,
                        frame.header.message_id,
                        channel.name(),
                        encoded.len()
                    );
                    return true;
                }
                Err(e) => {
                    log::debug!(
                        "{} CHANNEL_FAILED id={} channel={} error={}",
                        self.ctx,
                        frame.header.message_id,
                        channel.name(),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        self.stats.failed_transmissions += 1;
        if let Some(e) = last_error {
            log::warn!(
                "{} TRANSMISSION_FAILED id={} type={} error={}",
                self.ctx,
                frame.header.message_id,
                frame.header.message_type.as_str(),
                e
            );
            self.events.push(ProtocolEvent::Error {
                message: e.to_string(),
            });
        }
        false
    }

    fn enqueue(&mut self, message: QueuedMessage) {
        log::debug!(
            "{} MESSAGE_QUEUED id={} priority={} retries={}",
            self.ctx,
            message.message_id(),
            message.is_priority,
            message.retry_count
        );
        let evicted = self.queue.push(message);
        for dropped in &evicted {
            log::warn!(
                "{} QUEUE_EVICTED id={} type={} priority={}",
                self.ctx,
                dropped.message_id(),
                dropped.message_type().as_str(),
                dropped.is_priority
            );
        }
        self.stats.messages_evicted += evicted.len() as u64;
    }

    /// One sync pass over both queues, priority lane first.
    ///
    /// Returns `false` without attempting anything if the link is down or
    /// offline mode is set. Failed messages go back to their own lane.
    pub fn start_sync(&mut self, now: Timestamp) -> bool {
        if !self.can_transmit() {
            log::debug!(
                "{} SYNC_SKIPPED network={} offline={}",
                self.ctx,
                self.network_available,
                self.offline_mode
            );
            return false;
        }

        self.last_sync_attempt = now;
        let pending = self.queue.take_all();
        let attempted = pending.len();
        log::info!("{} SYNC_START messages={}", self.ctx, attempted);

        let mut failed = 0usize;
        for mut message in pending {
            if !self.transmit(&message.frame) {
                failed += 1;
                message.retry_count += 1;
                self.enqueue(message);
            }
        }

        let success = failed == 0;
        if success {
            self.stats.last_successful_sync = now;
        }
        log::info!(
            "{} SYNC_COMPLETE success={} attempted={} failed={}",
            self.ctx,
            success,
            attempted,
            failed
        );
        self.events.push(ProtocolEvent::SyncComplete { success, attempted });
        success
    }

    /// Periodic work: heartbeat, scheduled sync, TTL purge.
    pub fn update(&mut self, now: Timestamp) {
        if self.can_transmit()
            && now.saturating_sub(self.last_heartbeat) >= self.config.heartbeat_interval
        {
            self.send_heartbeat(now);
        }

        if self.config.enable_data_sync
            && self.can_transmit()
            && !self.queue.is_empty()
            && now.saturating_sub(self.last_sync_attempt) >= self.config.sync_interval
        {
            self.start_sync(now);
        }

        self.purge_expired(now);
    }

    pub fn send_heartbeat(&mut self, now: Timestamp) -> SendOutcome {
        self.last_heartbeat = now;
        let payload =
            MessageBuilder::heartbeat(&self.device_id, &self.session_id, self.queue.len(), now);
        self.send(MessageType::Heartbeat, payload, false, now)
    }

    /// Drop queued messages older than the configured TTL.
    pub fn purge_expired(&mut self, now: Timestamp) -> usize {
        let expired = self.queue.purge_expired(now, self.config.message_ttl);
        if !expired.is_empty() {
            log::warn!(
                "{} QUEUE_EXPIRED count={} ttl_ms={}",
                self.ctx,
                expired.len(),
                self.config.message_ttl
            );
        }
        self.stats.messages_expired += expired.len() as u64;
        expired.len()
    }

    /// Validate an inbound frame and surface it as `MessageReceived`.
    pub fn handle_inbound(&mut self, raw: &str, now: Timestamp) -> Result<MessageHeader, ProtocolError> {
        match self.accept_inbound(raw, now) {
            Ok(frame) => {
                self.stats.total_messages_received += 1;
                self.stats.total_bytes_transferred += raw.len() as u64;
                log::info!(
                    "{} MESSAGE_RECEIVED id={} type={}",
                    self.ctx,
                    frame.header.message_id,
                    frame.header.message_type.as_str()
                );
                let header = frame.header.clone();
                self.events.push(ProtocolEvent::MessageReceived {
                    header: frame.header,
                    payload: frame.payload,
                });
                Ok(header)
            }
            Err(e) => {
                self.stats.messages_rejected += 1;
                log::warn!("{} MESSAGE_REJECTED bytes={} error={}", self.ctx, raw.len(), e);
                self.events.push(ProtocolEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn accept_inbound(&self, raw: &str, now: Timestamp) -> Result<Frame, ProtocolError> {
        let frame = Frame::decode(raw)?;
        validate_frame(&frame, now, self.config.timestamp_tolerance)?;

        if self.config.require_signed_commands && frame.header.message_type.is_command() {
            let (signature, key_id) = match (&frame.signature, &frame.key_id) {
                (Some(signature), Some(key_id)) => (signature, key_id),
                _ => return Err(AuthError::MissingSignature.into()),
            };
            self.trusted_keys
                .verify(&frame.header.signing_input(), signature, key_id, &self.ctx)?;
        }

        Ok(frame)
    }

    pub fn set_network_available(&mut self, available: bool) {
        if self.network_available == available {
            return;
        }
        self.network_available = available;
        log::info!(
            "{} CONNECTION_CHANGED channel={} connected={}",
            self.ctx,
            self.config.primary_channel.name(),
            available
        );
        self.events.push(ProtocolEvent::ConnectionChanged {
            channel: self.config.primary_channel,
            connected: available,
        });
    }

    pub fn set_offline_mode(&mut self, offline: bool) {
        if self.offline_mode != offline {
            log::info!("{} OFFLINE_MODE enabled={}", self.ctx, offline);
        }
        self.offline_mode = offline;
    }

    pub fn is_network_available(&self) -> bool {
        self.network_available
    }

    pub fn is_offline_mode(&self) -> bool {
        self.offline_mode
    }

    /// Empty both lanes. Counters are untouched.
    pub fn clear_queue(&mut self) {
        let dropped = self.queue.len();
        self.queue.clear();
        log::info!("{} QUEUE_CLEARED dropped={}", self.ctx, dropped);
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_snapshot(&self) -> Vec<QueuedMessage> {
        self.queue.snapshot()
    }

    /// Re-queue persisted messages, respecting capacity.
    pub fn restore_queue(&mut self, messages: Vec<QueuedMessage>) {
        let count = messages.len();
        for message in messages {
            self.enqueue(message);
        }
        log::info!("{} QUEUE_RESTORED messages={}", self.ctx, count);
    }

    pub fn drain_events(&mut self) -> Vec<ProtocolEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn stats(&self) -> CommunicationStats {
        CommunicationStats {
            current_queue_size: self.queue.len(),
            ..self.stats
        }
    }

    pub fn reset_stats(&mut self) {
        self.stats = CommunicationStats::default();
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Apply a new configuration. The trusted key set is rebuilt from it,
    /// so keys dropped from the config stop verifying.
    pub fn set_config(&mut self, config: ProtocolConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let evicted = self.queue.set_max_size(config.max_queue_size);
        self.stats.messages_evicted += evicted.len() as u64;
        self.trusted_keys = load_trusted_keys(&config, &self.ctx);
        log::info!(
            "{} PROTOCOL_CONFIG_UPDATED keys={} signed_commands={}",
            self.ctx,
            self.trusted_keys.key_count(),
            config.require_signed_commands
        );
        self.config = config;
        Ok(())
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn start_new_session(&mut self) -> &str {
        self.session_id = new_message_id();
        log::info!("{} SESSION_STARTED session={}", self.ctx, self.session_id);
        &self.session_id
    }

    pub fn trusted_keys_mut(&mut self) -> &mut TrustedKeys {
        &mut self.trusted_keys
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn system_info(&self) -> Value {
        json!({
            "sessionId": self.session_id,
            "networkAvailable": self.network_available,
            "offlineMode": self.offline_mode,
            "primaryChannel": self.config.primary_channel,
            "fallbackChannel": self.config.fallback_channel,
            "priorityQueue": self.queue.priority_len(),
            "normalQueue": self.queue.normal_len(),
            "stats": self.stats(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::transport::LoopbackTransport;
    use crate::security::checksum::compute_hash;
    use base64::{engine::general_purpose, Engine as _};
    use ed25519_dalek::{Signer, SigningKey};

    const NOW: Timestamp = 1_700_000_000_000;

    fn protocol() -> (CommunicationProtocol<LoopbackTransport>, LoopbackTransport) {
        let transport = LoopbackTransport::new();
        let protocol = CommunicationProtocol::new(
            ProtocolConfig::default(),
            transport.clone(),
            &LogContext::new("pot-1"),
        );
        (protocol, transport)
    }

    fn inbound(message_type: MessageType, payload: &str, timestamp: Timestamp) -> Frame {
        let header = MessageHeader::new(message_type, "app-7", payload, timestamp);
        Frame::new(header, payload.to_string())
    }

    #[test]
    fn test_offline_sends_are_queued() {
        let (mut protocol, transport) = protocol();
        for i in 0..7 {
            let outcome = protocol.send(MessageType::SensorData, format!("{{\"i\":{}}}", i), false, NOW);
            assert_eq!(outcome, SendOutcome::Queued);
        }
        assert_eq!(protocol.stats().current_queue_size, 7);
        assert_eq!(transport.sent_count(), 0);
    }

    #[test]
    fn test_offline_mode_never_transmits() {
        let (mut protocol, transport) = protocol();
        protocol.set_network_available(true);
        protocol.set_offline_mode(true);
        assert_eq!(
            protocol.send(MessageType::SensorData, "{}".to_string(), true, NOW),
            SendOutcome::Queued
        );
        assert!(!protocol.start_sync(NOW));
        assert_eq!(transport.sent_count(), 0);
        assert!(!protocol
            .drain_events()
            .iter()
            .any(|e| matches!(e, ProtocolEvent::SyncComplete { .. })));
    }

    #[test]
    fn test_online_send_goes_out() {
        let (mut protocol, transport) = protocol();
        protocol.set_network_available(true);
        let outcome = protocol.send(MessageType::PlantStatus, "{\"s\":1}".to_string(), false, NOW);

        assert!(outcome.is_sent());
        assert_eq!(protocol.queue_len(), 0);
        let sent = transport.sent_frames();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, Channel::HttpRest);

        let frame = Frame::decode(&sent[0].frame).unwrap();
        assert_eq!(frame.header.device_id, "pot-1");
        assert_eq!(frame.header.checksum, compute_hash("{\"s\":1}"));
        assert_eq!(protocol.stats().successful_transmissions, 1);
    }

    #[test]
    fn test_fallback_channel_used() {
        let (mut protocol, transport) = protocol();
        protocol.set_network_available(true);
        transport.set_channel_down(Channel::HttpRest, true);

        assert!(protocol.send(MessageType::Heartbeat, "{}".to_string(), false, NOW).is_sent());
        assert_eq!(transport.sent_frames()[0].channel, Channel::WebSocket);
    }

    #[test]
    fn test_transport_failure_enqueues() {
        let (mut protocol, transport) = protocol();
        protocol.set_network_available(true);
        transport.fail_next(2);

        let outcome = protocol.send(MessageType::SensorData, "{}".to_string(), false, NOW);
        assert_eq!(outcome, SendOutcome::Queued);
        let stats = protocol.stats();
        assert_eq!(stats.failed_transmissions, 1);
        assert_eq!(stats.current_queue_size, 1);
    }

    #[test]
    fn test_failed_heartbeat_is_not_queued() {
        let (mut protocol, transport) = protocol();
        protocol.set_network_available(true);
        protocol.send(MessageType::SensorData, "{}".to_string(), false, NOW);
        transport.set_channel_down(Channel::HttpRest, true);
        transport.set_channel_down(Channel::WebSocket, true);

        for minute in 1..=5 {
            protocol.update(NOW + minute * DEFAULT_HEARTBEAT_INTERVAL_MS);
        }
        let outcome = protocol.send_heartbeat(NOW + 6 * DEFAULT_HEARTBEAT_INTERVAL_MS);
        assert_eq!(outcome, SendOutcome::Dropped);
        assert_eq!(protocol.queue_len(), 0);
        assert!(protocol.stats().failed_transmissions >= 6);

        // Offline heartbeats are dropped too, data still queues.
        protocol.set_network_available(false);
        assert_eq!(protocol.send_heartbeat(NOW), SendOutcome::Dropped);
        assert_eq!(
            protocol.send(MessageType::SensorData, "{}".to_string(), false, NOW),
            SendOutcome::Queued
        );
        assert_eq!(protocol.queue_len(), 1);
    }

    #[test]
    fn test_sync_drains_priority_first() {
        let (mut protocol, transport) = protocol();
        protocol.send(MessageType::SensorData, "{\"n\":1}".to_string(), false, NOW);
        protocol.send(MessageType::AlertNotification, "{\"p\":1}".to_string(), true, NOW);
        protocol.send(MessageType::SensorData, "{\"n\":2}".to_string(), false, NOW);

        protocol.set_network_available(true);
        assert!(protocol.start_sync(NOW + 1));

        let payloads: Vec<String> = transport
            .sent_frames()
            .iter()
            .map(|s| Frame::decode(&s.frame).unwrap().payload)
            .collect();
        assert_eq!(payloads, vec!["{\"p\":1}", "{\"n\":1}", "{\"n\":2}"]);
        assert_eq!(protocol.stats().current_queue_size, 0);
        assert_eq!(protocol.stats().last_successful_sync, NOW + 1);

        let events = protocol.drain_events();
        let syncs: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ProtocolEvent::SyncComplete { .. }))
            .collect();
        assert_eq!(
            syncs,
            vec![&ProtocolEvent::SyncComplete { success: true, attempted: 3 }]
        );
    }

    #[test]
    fn test_failed_sync_keeps_messages_in_their_lane() {
        let (mut protocol, transport) = protocol();
        protocol.send(MessageType::AlertNotification, "{}".to_string(), true, NOW);
        protocol.send(MessageType::SensorData, "{}".to_string(), false, NOW);
        protocol.set_network_available(true);
        protocol.drain_events();

        // Both channels of the first message fail.
        transport.fail_next(2);
        assert!(!protocol.start_sync(NOW));

        let queued = protocol.queue_snapshot();
        assert_eq!(queued.len(), 1);
        assert!(queued[0].is_priority);
        assert_eq!(queued[0].retry_count, 1);
        assert_eq!(protocol.stats().last_successful_sync, 0);
        assert!(protocol
            .drain_events()
            .contains(&ProtocolEvent::SyncComplete { success: false, attempted: 2 }));
    }

    #[test]
    fn test_clear_queue_keeps_counters() {
        let (mut protocol, _) = protocol();
        protocol.set_network_available(true);
        protocol.send(MessageType::SensorData, "{}".to_string(), false, NOW);
        protocol.set_offline_mode(true);
        protocol.send(MessageType::SensorData, "{}".to_string(), false, NOW);

        protocol.clear_queue();
        let stats = protocol.stats();
        assert_eq!(stats.current_queue_size, 0);
        assert_eq!(stats.total_messages_sent, 1);
    }

    #[test]
    fn test_capacity_eviction_counted() {
        let transport = LoopbackTransport::new();
        let config = ProtocolConfig {
            max_queue_size: 3,
            ..ProtocolConfig::default()
        };
        let mut protocol = CommunicationProtocol::new(config, transport, &LogContext::new("pot-1"));
        for _ in 0..5 {
            protocol.send(MessageType::SensorData, "{}".to_string(), false, NOW);
        }
        let stats = protocol.stats();
        assert_eq!(stats.current_queue_size, 3);
        assert_eq!(stats.messages_evicted, 2);
    }

    #[test]
    fn test_update_heartbeat_and_ttl() {
        let (mut protocol, transport) = protocol();
        protocol.send(MessageType::SensorData, "{}".to_string(), false, NOW);

        // Offline: no heartbeat, but TTL still applies.
        protocol.update(NOW + DEFAULT_MESSAGE_TTL_MS + 1);
        assert_eq!(protocol.queue_len(), 0);
        assert_eq!(protocol.stats().messages_expired, 1);

        protocol.set_network_available(true);
        protocol.update(NOW + DEFAULT_MESSAGE_TTL_MS + 2);
        let frame = Frame::decode(&transport.sent_frames()[0].frame).unwrap();
        assert_eq!(frame.header.message_type, MessageType::Heartbeat);
    }

    #[test]
    fn test_update_syncs_when_due() {
        let (mut protocol, transport) = protocol();
        protocol.send(MessageType::SensorData, "{}".to_string(), false, NOW);
        protocol.set_network_available(true);

        protocol.update(NOW + DEFAULT_SYNC_INTERVAL_MS);
        assert_eq!(protocol.queue_len(), 0);
        assert_eq!(transport.sent_count(), 2);
    }

    #[test]
    fn test_connection_events() {
        let (mut protocol, _) = protocol();
        protocol.set_network_available(true);
        protocol.set_network_available(true);
        protocol.set_network_available(false);
        assert_eq!(
            protocol.drain_events(),
            vec![
                ProtocolEvent::ConnectionChanged { channel: Channel::HttpRest, connected: true },
                ProtocolEvent::ConnectionChanged { channel: Channel::HttpRest, connected: false },
            ]
        );
    }

    #[test]
    fn test_inbound_accepted() {
        let (mut protocol, _) = protocol();
        let frame = inbound(MessageType::CommandRequest, "{\"cmd\":\"status\"}", NOW);
        let header = protocol.handle_inbound(&frame.encode(), NOW + 1_000).unwrap();

        assert_eq!(header.message_type, MessageType::CommandRequest);
        assert_eq!(protocol.stats().total_messages_received, 1);
        assert_eq!(
            protocol.drain_events(),
            vec![ProtocolEvent::MessageReceived {
                header,
                payload: "{\"cmd\":\"status\"}".to_string()
            }]
        );
    }

    #[test]
    fn test_inbound_rejections() {
        let (mut protocol, _) = protocol();

        let mut tampered = inbound(MessageType::SensorData, "{\"a\":1}", NOW);
        tampered.payload = "{\"a\":2}".to_string();
        assert!(matches!(
            protocol.handle_inbound(&tampered.encode(), NOW),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));

        let stale = inbound(MessageType::SensorData, "{}", NOW - DEFAULT_TIMESTAMP_TOLERANCE_MS - 1);
        assert!(matches!(
            protocol.handle_inbound(&stale.encode(), NOW),
            Err(ProtocolError::StaleTimestamp { .. })
        ));

        assert!(matches!(
            protocol.handle_inbound("garbage", NOW),
            Err(ProtocolError::Malformed(_))
        ));

        assert_eq!(protocol.stats().messages_rejected, 3);
        assert_eq!(protocol.stats().total_messages_received, 0);
    }

    #[test]
    fn test_signed_commands() {
        let signing = SigningKey::from_bytes(&[9u8; 32]);
        let mut keys = BTreeMap::new();
        keys.insert(
            "app".to_string(),
            general_purpose::STANDARD.encode(signing.verifying_key().to_bytes()),
        );
        let config = ProtocolConfig {
            require_signed_commands: true,
            trusted_keys: keys,
            ..ProtocolConfig::default()
        };
        let mut protocol =
            CommunicationProtocol::new(config, LoopbackTransport::new(), &LogContext::new("pot-1"));

        let unsigned = inbound(MessageType::CommandRequest, "{}", NOW);
        assert_eq!(
            protocol.handle_inbound(&unsigned.encode(), NOW),
            Err(ProtocolError::Unauthenticated(AuthError::MissingSignature))
        );

        let frame = inbound(MessageType::DeviceConfig, "{\"x\":1}", NOW);
        let signature = signing.sign(frame.header.signing_input().as_bytes());
        let signed = frame.with_signature(
            "app",
            &general_purpose::URL_SAFE_NO_PAD.encode(signature.to_bytes()),
        );
        assert!(protocol.handle_inbound(&signed.encode(), NOW).is_ok());

        // Non-command types need no signature.
        let status = inbound(MessageType::SyncRequest, "{}", NOW);
        assert!(protocol.handle_inbound(&status.encode(), NOW).is_ok());
    }

    #[test]
    fn test_set_config_reloads_trusted_keys() {
        let signing = SigningKey::from_bytes(&[7u8; 32]);
        let (mut protocol, _) = protocol();
        let frame = inbound(MessageType::CommandRequest, "{\"water\":true}", NOW);
        let signature = signing.sign(frame.header.signing_input().as_bytes());
        let signed = frame
            .with_signature("app", &general_purpose::STANDARD.encode(signature.to_bytes()))
            .encode();

        let mut keys = BTreeMap::new();
        keys.insert(
            "app".to_string(),
            general_purpose::STANDARD.encode(signing.verifying_key().to_bytes()),
        );
        protocol
            .set_config(ProtocolConfig {
                require_signed_commands: true,
                trusted_keys: keys,
                ..ProtocolConfig::default()
            })
            .unwrap();
        assert!(protocol.handle_inbound(&signed, NOW).is_ok());

        // Replacing the key set revokes the old key.
        let other = SigningKey::from_bytes(&[8u8; 32]);
        let mut replaced = BTreeMap::new();
        replaced.insert(
            "backend".to_string(),
            general_purpose::STANDARD.encode(other.verifying_key().to_bytes()),
        );
        protocol
            .set_config(ProtocolConfig {
                require_signed_commands: true,
                trusted_keys: replaced,
                ..ProtocolConfig::default()
            })
            .unwrap();
        assert_eq!(
            protocol.handle_inbound(&signed, NOW),
            Err(ProtocolError::Unauthenticated(AuthError::UnknownKey("app".to_string())))
        );
    }

    #[test]
    fn test_set_config_rejects_invalid() {
        let (mut protocol, _) = protocol();
        let invalid = ProtocolConfig {
            require_signed_commands: true,
            ..ProtocolConfig::default()
        };
        assert!(protocol.set_config(invalid).is_err());
        assert!(!protocol.config().require_signed_commands);
    }

    #[test]
    fn test_new_session() {
        let (mut protocol, _) = protocol();
        let first = protocol.session_id().to_string();
        let second = protocol.start_new_session().to_string();
        assert_ne!(first, second);
    }
}
