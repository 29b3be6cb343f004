//! Outbound message queue: a priority lane and a normal lane under one
//! shared capacity.

use std::collections::VecDeque;

use super::message::QueuedMessage;
use crate::Timestamp;

#[derive(Debug, Clone)]
pub struct MessageQueue {
    priority: VecDeque<QueuedMessage>,
    normal: VecDeque<QueuedMessage>,
    max_size: usize,
}

impl MessageQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            priority: VecDeque::new(),
            normal: VecDeque::new(),
            max_size: max_size.max(1),
        }
    }

    /// Append to the matching lane. Returns whatever had to be evicted to
    /// stay within capacity: oldest normal first, then oldest priority.
    pub fn push(&mut self, message: QueuedMessage) -> Vec<QueuedMessage> {
        if message.is_priority {
            self.priority.push_back(message);
        } else {
            self.normal.push_back(message);
        }
        self.enforce_capacity()
    }

    fn enforce_capacity(&mut self) -> Vec<QueuedMessage> {
        let mut evicted = Vec::new();
        while self.len() > self.max_size {
            match self.normal.pop_front().or_else(|| self.priority.pop_front()) {
                Some(message) => evicted.push(message),
                None => break,
            }
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.priority.len() + self.normal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.priority.is_empty() && self.normal.is_empty()
    }

    pub fn priority_len(&self) -> usize {
        self.priority.len()
    }

    pub fn normal_len(&self) -> usize {
        self.normal.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn set_max_size(&mut self, max_size: usize) -> Vec<QueuedMessage> {
        self.max_size = max_size.max(1);
        self.enforce_capacity()
    }

    /// Remove everything, priority lane first.
    pub fn take_all(&mut self) -> Vec<QueuedMessage> {
        let mut all: Vec<QueuedMessage> = self.priority.drain(..).collect();
        all.extend(self.normal.drain(..));
        all
    }

    pub fn clear(&mut self) {
        self.priority.clear();
        self.normal.clear();
    }

    /// Drop messages queued more than `ttl` ms before `now`.
    pub fn purge_expired(&mut self, now: Timestamp, ttl: u64) -> Vec<QueuedMessage> {
        let mut expired = Vec::new();
        for lane in [&mut self.priority, &mut self.normal] {
            let (old, fresh): (VecDeque<_>, VecDeque<_>) = lane
                .drain(..)
                .partition(|m| now.saturating_sub(m.queued_at) > ttl);
            *lane = fresh;
            expired.extend(old);
        }
        expired
    }

    /// Copy of the contents, priority lane first.
    pub fn snapshot(&self) -> Vec<QueuedMessage> {
        self.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedMessage> {
        self.priority.iter().chain(self.normal.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::MessageType;

    fn message(priority: bool, queued_at: Timestamp) -> QueuedMessage {
        QueuedMessage::new(
            MessageType::SensorData,
            "pot-1",
            format!("{{\"t\":{}}}", queued_at),
            priority,
            queued_at,
        )
    }

    #[test]
    fn test_lanes() {
        let mut queue = MessageQueue::new(10);
        queue.push(message(false, 1));
        queue.push(message(true, 2));
        queue.push(message(false, 3));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.priority_len(), 1);
        assert_eq!(queue.normal_len(), 2);

        let order: Vec<Timestamp> = queue.take_all().iter().map(|m| m.queued_at).collect();
        assert_eq!(order, vec![2, 1, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_eviction_prefers_oldest_normal() {
        let mut queue = MessageQueue::new(2);
        queue.push(message(true, 1));
        queue.push(message(false, 2));
        let evicted = queue.push(message(false, 3));

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].queued_at, 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_eviction_falls_back_to_priority() {
        let mut queue = MessageQueue::new(2);
        queue.push(message(true, 1));
        queue.push(message(true, 2));
        let evicted = queue.push(message(true, 3));

        assert_eq!(evicted[0].queued_at, 1);
        assert_eq!(queue.priority_len(), 2);
    }

    #[test]
    fn test_purge_expired() {
        let mut queue = MessageQueue::new(10);
        queue.push(message(true, 100));
        queue.push(message(false, 500));
        queue.push(message(false, 900));

        let expired = queue.purge_expired(1_000, 450);
        assert_eq!(expired.len(), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.snapshot()[0].queued_at, 900);
    }

    #[test]
    fn test_shrink_capacity() {
        let mut queue = MessageQueue::new(5);
        for t in 0..5 {
            queue.push(message(false, t));
        }
        let evicted = queue.set_max_size(3);
        assert_eq!(evicted.len(), 2);
        assert_eq!(queue.len(), 3);
    }
}
