/// file: src/events.rs
/// description: event bus decoupling the channel loop from status presentation
use crate::types::{ChannelTopic, ConnectionState, MessageKind, TransportKind};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Starting { topic: ChannelTopic },
    Connecting { url: String, attempt: u32 },
    Connected { connection_id: String, transport: TransportKind },
    StateChanged { from: ConnectionState, to: ConnectionState },
    SubscriptionSent { message: String },
    Reconnecting { attempt: u32, delay: Duration },
    /// Live updates unavailable; data refreshes periodically from `poll_url`.
    Degraded { poll_url: String },
    HeartbeatTimeout,
    MalformedFrame { reason: String },
    ServerError { message: String },
    HandlerFailed { kind: MessageKind, reason: String },
    QueueOverflow { dropped_type: String },
    Stopped,
}

// Status events are low volume; a full buffer means nobody is rendering them
const EVENT_CHANNEL_CAPACITY: usize = 1_024;

pub type EventSender = mpsc::Sender<ClientEvent>;
pub type EventReceiver = mpsc::Receiver<ClientEvent>;

pub fn create_event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}
