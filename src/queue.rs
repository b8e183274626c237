// file: src/queue.rs
// description: bounded buffer for outbound messages issued while no transport is open

use crate::{transport::Transport, types::OutboundMessage};
use std::collections::VecDeque;
use tracing::{debug, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// FIFO of unsent messages. When full, the oldest entry is discarded to make
/// room for the newest one.
#[derive(Debug)]
pub struct OutboundQueue {
    messages: VecDeque<OutboundMessage>,
    capacity: usize,
    dropped: u64,
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Appends `message`, returning the entry evicted to make room, if any.
    pub fn enqueue(&mut self, message: OutboundMessage) -> Option<OutboundMessage> {
        let evicted = if self.messages.len() >= self.capacity {
            self.dropped += 1;
            let evicted = self.messages.pop_front();
            if let Some(ref old) = evicted {
                warn!(
                    capacity = self.capacity,
                    dropped_type = %old.message_type,
                    "Outbound queue full, dropping oldest message"
                );
            }
            evicted
        } else {
            None
        };

        self.messages.push_back(message);
        evicted
    }

    /// Sends queued messages in order. Stops at the first message the transport
    /// refuses; that message and everything behind it stay queued.
    pub fn flush(&mut self, transport: &mut dyn Transport) -> usize {
        let mut sent = 0;
        while let Some(message) = self.messages.front() {
            if !transport.send(message) {
                debug!(
                    remaining = self.messages.len(),
                    "Transport refused message during flush"
                );
                break;
            }
            self.messages.pop_front();
            sent += 1;
        }
        sent
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total messages discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.messages.iter()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
