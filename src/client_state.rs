/// file: src/client_state.rs
/// description: per-client connection bookkeeping shared between the channel loop and its handles
use crate::types::{ChannelTopic, ConnectionState, TransportKind};
use chrono::{DateTime, Utc};
use std::sync::{
    Arc,
    atomic::{AtomicU32, AtomicU64, Ordering},
};
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct ChannelStats {
    pub connection_id: String,
    pub topic: ChannelTopic,
    pub state: ConnectionState,
    pub transport: Option<TransportKind>,
    pub started_at: Instant,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_disconnection_at: Option<DateTime<Utc>>,

    pub reconnect_count: AtomicU32,
    pub messages_received: AtomicU64,
    pub malformed_frames: AtomicU64,
    pub unhandled_messages: AtomicU64,
    pub handler_failures: AtomicU64,
    pub queue_dropped: AtomicU64,
    pub queued: usize,
}

impl ChannelStats {
    pub fn new(topic: ChannelTopic) -> Self {
        Self {
            connection_id: uuid::Uuid::new_v4().to_string(),
            topic,
            state: ConnectionState::Disconnected,
            transport: None,
            started_at: Instant::now(),
            last_message_at: None,
            last_disconnection_at: None,
            reconnect_count: AtomicU32::new(0),
            messages_received: AtomicU64::new(0),
            malformed_frames: AtomicU64::new(0),
            unhandled_messages: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            queue_dropped: AtomicU64::new(0),
            queued: 0,
        }
    }

    /// Called on every successful open; each connection gets a fresh id.
    pub fn reset_connection(&mut self, transport: TransportKind) {
        self.connection_id = uuid::Uuid::new_v4().to_string();
        self.transport = Some(transport);
    }

    pub fn record_disconnect(&mut self) {
        self.transport = None;
        self.last_disconnection_at = Some(Utc::now());
    }

    pub fn record_reconnect(&self) {
        self.reconnect_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_message(&mut self) {
        self.last_message_at = Some(Utc::now());
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unhandled(&self) {
        self.unhandled_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queue_drop(&self) {
        self.queue_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn reconnects(&self) -> u32 {
        self.reconnect_count.load(Ordering::Acquire)
    }
}

pub type SharedChannelStats = Arc<Mutex<ChannelStats>>;
