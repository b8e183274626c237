#![doc = include_str!("../docs/rustdoc.md")]

/// Reconnect delay schedule.
pub mod backoff;
/// Command-line argument definitions.
pub mod cli;
/// Channel client, its handle and runtime loop.
pub mod client;
/// Shared channel statistics.
pub mod client_state;
/// Runtime configuration model.
pub mod config;
/// Reconnection and heartbeat state machine.
pub mod controller;
/// Inbound message routing to page handlers.
pub mod dispatcher;
/// Error types used across the crate.
pub mod error;
/// Event bus messages between client and UI.
pub mod events;
/// Currency, crypto, percentage and date formatters.
pub mod formatter;
/// Metrics and health status structures.
pub mod monitoring;
/// Bounded outbound message queue.
pub mod queue;
/// Tracing/logging initialization.
pub mod tracing_setup;
/// Push and pull transports.
pub mod transport;
/// Wire message and channel data models.
pub mod types;
/// UI controller and page renderers.
pub mod ui;

/// Primary crate error type.
pub use error::ChannelError;
pub use client::{ChannelClient, ChannelHandle};
pub use dispatcher::Dispatcher;
pub use types::{ChannelTopic, ConnectionState, InboundMessage, MessageKind, OutboundMessage, Subscription};
