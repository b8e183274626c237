// file: src/dispatcher.rs
// description: routes parsed inbound messages to page handlers, isolating handler failures

use crate::{
    error::ChannelError,
    types::{InboundMessage, MessageKind},
};
use std::{
    collections::HashMap,
    fmt,
    panic::{self, AssertUnwindSafe},
};
use tracing::{debug, error, warn};

/// Page callback for one message kind.
pub type Handler = Box<dyn FnMut(&InboundMessage) -> anyhow::Result<()> + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    /// No handler is registered for this kind.
    Unhandled,
    HandlerFailed { reason: String },
}

/// Parses one text frame at the message boundary.
pub fn parse_frame(text: &str) -> Result<InboundMessage, ChannelError> {
    serde_json::from_str::<InboundMessage>(text).map_err(|e| {
        ChannelError::InvalidMessage(format!(
            "{}. Message: {}",
            e,
            text.chars().take(100).collect::<String>()
        ))
    })
}

#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<MessageKind, Handler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `kind`, replacing any earlier one.
    pub fn on<F>(mut self, kind: MessageKind, handler: F) -> Self
    where
        F: FnMut(&InboundMessage) -> anyhow::Result<()> + Send + 'static,
    {
        self.register(kind, handler);
        self
    }

    pub fn register<F>(&mut self, kind: MessageKind, handler: F)
    where
        F: FnMut(&InboundMessage) -> anyhow::Result<()> + Send + 'static,
    {
        if kind == MessageKind::Pong {
            warn!("pong is consumed by the heartbeat and never reaches page handlers");
        }
        self.handlers.insert(kind, Box::new(handler));
    }

    pub fn handles(&self, kind: &MessageKind) -> bool {
        self.handlers.contains_key(kind)
    }

    pub fn dispatch(&mut self, message: &InboundMessage) -> DispatchOutcome {
        let Some(handler) = self.handlers.get_mut(&message.kind) else {
            match &message.kind {
                MessageKind::Unknown(kind) => {
                    warn!(message_type = %kind, "Ignoring message with unrecognised type")
                }
                kind => debug!(message_type = %kind, "No handler registered"),
            }
            return DispatchOutcome::Unhandled;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler(message))) {
            Ok(Ok(())) => DispatchOutcome::Handled,
            Ok(Err(e)) => {
                error!(message_type = %message.kind, "Handler returned error: {:#}", e);
                DispatchOutcome::HandlerFailed {
                    reason: e.to_string(),
                }
            }
            Err(payload) => {
                let reason = panic_reason(payload.as_ref());
                error!(message_type = %message.kind, "Handler panicked: {}", reason);
                DispatchOutcome::HandlerFailed { reason }
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
