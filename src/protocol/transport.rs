//! Transport seam.
//!
//! The physical link (HTTP client, WebSocket, MQTT, BLE) lives outside the
//! core behind [`Transport`]. [`LoopbackTransport`] records frames in memory
//! and can be scripted to fail.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "HTTP_REST")]
    HttpRest,
    #[serde(rename = "WEBSOCKET")]
    WebSocket,
    #[serde(rename = "MQTT")]
    Mqtt,
    #[serde(rename = "BLUETOOTH")]
    Bluetooth,
}

impl Channel {
    pub fn name(&self) -> &'static str {
        match self {
            Channel::HttpRest => "http_rest",
            Channel::WebSocket => "websocket",
            Channel::Mqtt => "mqtt",
            Channel::Bluetooth => "bluetooth",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("link down on {}", .0.name())]
    LinkDown(Channel),

    #[error("frame rejected on {}: {reason}", .channel.name())]
    Rejected { channel: Channel, reason: String },

    #[error("timed out on {} after {timeout_ms}ms", .channel.name())]
    Timeout { channel: Channel, timeout_ms: u64 },
}

/// Physical send of one encoded frame.
pub trait Transport {
    fn transmit(&mut self, channel: Channel, frame: &str) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub channel: Channel,
    pub frame: String,
}

#[derive(Debug, Default)]
struct LoopbackState {
    sent: Vec<SentFrame>,
    down: HashSet<Channel>,
    fail_remaining: u32,
}

/// In-memory transport. Clones share state, so a test can keep a handle
/// while the protocol owns another.
#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    inner: Arc<Mutex<LoopbackState>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` transmissions on any channel.
    pub fn fail_next(&self, count: u32) {
        self.inner.lock().fail_remaining = count;
    }

    pub fn set_channel_down(&self, channel: Channel, down: bool) {
        let mut state = self.inner.lock();
        if down {
            state.down.insert(channel);
        } else {
            state.down.remove(&channel);
        }
    }

    pub fn sent_frames(&self) -> Vec<SentFrame> {
        self.inner.lock().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.inner.lock().sent.len()
    }

    pub fn take_sent(&self) -> Vec<SentFrame> {
        std::mem::take(&mut self.inner.lock().sent)
    }
}

impl Transport for LoopbackTransport {
    fn transmit(&mut self, channel: Channel, frame: &str) -> Result<(), TransportError> {
        let mut state = self.inner.lock();
        if state.down.contains(&channel) {
            return Err(TransportError::LinkDown(channel));
        }
        if state.fail_remaining > 0 {
            state.fail_remaining -= 1;
            return Err(TransportError::Rejected {
                channel,
                reason: "scripted failure".to_string(),
            });
        }
        state.sent.push(SentFrame {
            channel,
            frame: frame.to_string(),
        });
        Ok(())
    }
}
