// file: src/transport/mod.rs
// description: transport contract shared by the WebSocket push channel and the HTTP polling fallback

use crate::{
    config::Config,
    error::ChannelError,
    types::{CLOSE_NORMAL, InboundMessage, OutboundMessage, TransportKind},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Persistent WebSocket transport.
pub mod push;
/// Interval HTTP snapshot transport.
pub mod pull;

pub use pull::{HttpSnapshotSource, PollingTransport, SnapshotSource};
pub use push::WebSocketTransport;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEventKind {
    Open,
    Message(InboundMessage),
    Close { code: u16, reason: String },
    /// A single frame could not be understood; the connection stays up.
    Error(String),
}

/// Event tagged with the generation of the transport that produced it, so the
/// client can discard events from a transport it has already replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub generation: u64,
    pub kind: TransportEventKind,
}

pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    sender: TransportEventSender,
}

impl EventSink {
    pub fn new(generation: u64, sender: TransportEventSender) -> Self {
        Self { generation, sender }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once the owning client has gone away.
    pub fn emit(&self, kind: TransportEventKind) -> bool {
        let sent = self
            .sender
            .send(TransportEvent {
                generation: self.generation,
                kind,
            })
            .is_ok();
        if !sent {
            trace!(generation = self.generation, "Transport event receiver dropped");
        }
        sent
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// A source of inbound messages. Implementations run on the tokio runtime and
/// report everything through the [`EventSink`] given to `start`.
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    fn start(&mut self, sink: EventSink);

    /// Closes the connection, telling the peer `code` where the protocol has
    /// a close handshake. Safe to call repeatedly.
    fn close(&mut self, code: u16);

    fn stop(&mut self) {
        self.close(CLOSE_NORMAL);
    }

    /// Returns false when the message could not be handed to an open connection;
    /// the caller is expected to queue it.
    fn send(&mut self, message: &OutboundMessage) -> bool;

    /// Suspends periodic work while the page is hidden.
    fn pause(&mut self) {}

    fn resume(&mut self) {}
}

/// Builds fresh transports for each connection attempt.
pub trait TransportFactory: Send + Sync {
    fn push(&self) -> Box<dyn Transport>;

    fn pull(&self) -> Box<dyn Transport>;
}

/// Production transports targeting the endpoints derived from the page origin.
pub struct DefaultTransports {
    config: Arc<Config>,
    snapshots: Arc<HttpSnapshotSource>,
}

impl DefaultTransports {
    pub fn new(config: Arc<Config>) -> Result<Self, ChannelError> {
        let snapshots = HttpSnapshotSource::new(
            config.channel.poll_url.clone(),
            config.polling.request_timeout,
        )?;
        Ok(Self {
            config,
            snapshots: Arc::new(snapshots),
        })
    }
}

impl TransportFactory for DefaultTransports {
    fn push(&self) -> Box<dyn Transport> {
        Box::new(WebSocketTransport::new(
            self.config.channel.push_url.clone(),
            self.config.channel.connect_timeout,
        ))
    }

    fn pull(&self) -> Box<dyn Transport> {
        Box::new(PollingTransport::new(
            self.config.channel.topic,
            self.config.polling.interval,
            self.snapshots.clone(),
        ))
    }
}
