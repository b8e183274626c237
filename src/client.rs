// file: src/client.rs
// description: real-time channel client; one task owning state machine, transport, timers and queue

use crate::{
    client_state::{ChannelStats, SharedChannelStats},
    config::Config,
    controller::{Command, ControlInput, ReconnectController},
    dispatcher::{DispatchOutcome, Dispatcher},
    error::ChannelError,
    events::{ClientEvent, EventSender},
    monitoring::{
        CONNECTED_GAUGE, FALLBACK_COUNTER, HANDLER_FAILURE_COUNTER, MALFORMED_FRAME_COUNTER,
        MESSAGES_RECEIVED_COUNTER, QUEUE_DROP_COUNTER, RECONNECT_COUNTER,
    },
    queue::OutboundQueue,
    transport::{
        DefaultTransports, EventSink, Transport, TransportEvent, TransportEventKind,
        TransportEventReceiver, TransportEventSender, TransportFactory,
    },
    types::{
        CLOSE_NORMAL, ConnectionState, InboundMessage, MessageKind, OutboundMessage,
        Subscription, TransportKind,
    },
};
use std::sync::Arc;
use tokio::{
    sync::{Mutex, mpsc, watch},
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, PartialEq)]
enum ClientCommand {
    Start,
    Stop,
    Send(OutboundMessage),
    Subscribe(Subscription),
    Unsubscribe(Subscription),
    SetVisible(bool),
}

/// Page-facing side of a running channel. Cheap to clone; every method is
/// safe to call after the channel has shut down.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    commands: mpsc::UnboundedSender<ClientCommand>,
    state: watch::Receiver<ConnectionState>,
    stats: SharedChannelStats,
}

impl ChannelHandle {
    pub fn start(&self) -> Result<(), ChannelError> {
        self.command(ClientCommand::Start)
    }

    /// Closes the transport and clears every timer. Idempotent.
    pub fn stop(&self) {
        if self.commands.send(ClientCommand::Stop).is_err() {
            trace!("Stop requested on a channel that already shut down");
        }
    }

    /// Sends now if a transport is open, otherwise queues for the next connect.
    pub fn send(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        self.command(ClientCommand::Send(message))
    }

    pub fn subscribe(&self, subscription: Subscription) -> Result<(), ChannelError> {
        self.command(ClientCommand::Subscribe(subscription))
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> Result<(), ChannelError> {
        self.command(ClientCommand::Unsubscribe(subscription))
    }

    /// Host page visibility; hidden pages suspend heartbeat and polling.
    pub fn set_visible(&self, visible: bool) -> Result<(), ChannelError> {
        self.command(ClientCommand::SetVisible(visible))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Resolves once the channel reaches `target`.
    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<(), ChannelError> {
        let mut state = self.state.clone();
        if *state.borrow() == target {
            return Ok(());
        }
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| ChannelError::ClientStopped)
    }

    pub fn stats(&self) -> SharedChannelStats {
        self.stats.clone()
    }

    fn command(&self, command: ClientCommand) -> Result<(), ChannelError> {
        self.commands
            .send(command)
            .map_err(|_| ChannelError::ClientStopped)
    }
}

/// Builder for a channel bound to one topic for the lifetime of a page.
pub struct ChannelClient {
    config: Arc<Config>,
    dispatcher: Dispatcher,
    transports: Arc<dyn TransportFactory>,
    events: Option<EventSender>,
}

impl ChannelClient {
    pub fn new(config: Arc<Config>, dispatcher: Dispatcher) -> Result<Self, ChannelError> {
        let transports = Arc::new(DefaultTransports::new(config.clone())?);
        Self::with_transports(config, dispatcher, transports)
    }

    /// Rejects configurations the controller cannot run with, such as a pong
    /// timeout that outlasts the ping interval.
    pub fn with_transports(
        config: Arc<Config>,
        dispatcher: Dispatcher,
        transports: Arc<dyn TransportFactory>,
    ) -> Result<Self, ChannelError> {
        config.validate()?;
        Ok(Self {
            config,
            dispatcher,
            transports,
            events: None,
        })
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Spawns the channel loop. Nothing connects until [`ChannelHandle::start`].
    pub fn spawn(self) -> (ChannelHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(Mutex::new(ChannelStats::new(self.config.channel.topic)));

        let mut subscriptions = Vec::new();
        for subscription in &self.config.channel.subscriptions {
            if !subscriptions.contains(subscription) {
                subscriptions.push(subscription.clone());
            }
        }

        let runtime = ChannelRuntime {
            controller: ReconnectController::new(
                self.config.backoff,
                self.config.channel.max_push_failures,
            ),
            queue: OutboundQueue::new(self.config.queue.capacity),
            dispatcher: self.dispatcher,
            transports: self.transports,
            events: self.events,
            subscriptions,
            transport: None,
            generation: 0,
            commands: command_rx,
            transport_tx,
            transport_rx,
            reconnect_at: None,
            heartbeat_at: None,
            pong_deadline: None,
            state_tx,
            stats: stats.clone(),
            config: self.config,
        };

        let task = tokio::spawn(runtime.run());
        let handle = ChannelHandle {
            commands: command_tx,
            state: state_rx,
            stats,
        };
        (handle, task)
    }
}

enum Wake {
    Command(Option<ClientCommand>),
    Transport(TransportEvent),
    ReconnectDue,
    PongTimeout,
    HeartbeatDue,
}

struct ChannelRuntime {
    config: Arc<Config>,
    controller: ReconnectController,
    dispatcher: Dispatcher,
    queue: OutboundQueue,
    subscriptions: Vec<Subscription>,
    transports: Arc<dyn TransportFactory>,
    transport: Option<Box<dyn Transport>>,
    generation: u64,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
    transport_tx: TransportEventSender,
    transport_rx: TransportEventReceiver,
    reconnect_at: Option<Instant>,
    heartbeat_at: Option<Instant>,
    pong_deadline: Option<Instant>,
    state_tx: watch::Sender<ConnectionState>,
    stats: SharedChannelStats,
    events: Option<EventSender>,
}

async fn at(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl ChannelRuntime {
    async fn run(mut self) {
        info!(topic = %self.config.channel.topic, "Channel client ready");
        self.emit(ClientEvent::Starting {
            topic: self.config.channel.topic,
        });

        loop {
            let wake = tokio::select! {
                biased;
                command = self.commands.recv() => Wake::Command(command),
                Some(event) = self.transport_rx.recv() => Wake::Transport(event),
                _ = at(self.reconnect_at) => Wake::ReconnectDue,
                _ = at(self.pong_deadline) => Wake::PongTimeout,
                _ = at(self.heartbeat_at) => Wake::HeartbeatDue,
            };

            match wake {
                Wake::Command(Some(command)) => self.handle_command(command).await,
                Wake::Command(None) => {
                    debug!("All channel handles dropped, shutting down");
                    self.apply(ControlInput::Stop).await;
                }
                Wake::Transport(event) => self.handle_transport_event(event).await,
                Wake::ReconnectDue => {
                    self.reconnect_at = None;
                    self.apply(ControlInput::ReconnectDue).await;
                }
                Wake::PongTimeout => {
                    self.pong_deadline = None;
                    self.emit(ClientEvent::HeartbeatTimeout);
                    self.apply(ControlInput::PongTimeout).await;
                }
                Wake::HeartbeatDue => {
                    self.heartbeat_at = Some(Instant::now() + self.config.heartbeat.interval);
                    self.apply(ControlInput::HeartbeatDue).await;
                }
            }

            if self.controller.state() == ConnectionState::Closed {
                break;
            }
        }

        self.close_transport(CLOSE_NORMAL);
        self.reconnect_at = None;
        self.heartbeat_at = None;
        self.pong_deadline = None;
        CONNECTED_GAUGE.set(0.0);
        info!(topic = %self.config.channel.topic, "Channel client stopped");
        self.emit(ClientEvent::Stopped);
    }

    async fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Start => self.apply(ControlInput::Start).await,
            ClientCommand::Stop => self.apply(ControlInput::Stop).await,
            ClientCommand::Send(message) => self.send_or_queue(message).await,
            ClientCommand::Subscribe(subscription) => {
                if self.subscriptions.contains(&subscription) {
                    debug!(channel = %subscription.channel, "Already subscribed");
                    return;
                }
                self.subscriptions.push(subscription.clone());
                // otherwise it goes out with the resubscribe on the next open
                if self.controller.state() == ConnectionState::Connected {
                    self.send_subscription(&subscription);
                }
            }
            ClientCommand::Unsubscribe(subscription) => {
                let before = self.subscriptions.len();
                self.subscriptions.retain(|s| s != &subscription);
                if self.subscriptions.len() != before
                    && self.controller.state() == ConnectionState::Connected
                    && let Some(transport) = self.transport.as_mut()
                {
                    transport.send(&OutboundMessage::unsubscribe(&subscription));
                }
            }
            ClientCommand::SetVisible(visible) => {
                self.apply(ControlInput::VisibilityChanged { visible }).await
            }
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        if event.generation != self.generation || self.transport.is_none() {
            trace!(
                generation = event.generation,
                current = self.generation,
                "Ignoring event from retired transport"
            );
            return;
        }

        match event.kind {
            TransportEventKind::Open => {
                let kind = self
                    .transport
                    .as_ref()
                    .map(|t| t.kind())
                    .unwrap_or(TransportKind::Push);
                self.stats.lock().await.reset_connection(kind);
                self.apply(ControlInput::TransportOpened).await;
            }
            TransportEventKind::Message(message) => self.handle_inbound(message).await,
            TransportEventKind::Close { code, reason } => {
                info!(code, reason = %reason, "Transport closed");
                self.close_transport(CLOSE_NORMAL);
                self.stats.lock().await.record_disconnect();
                self.apply(ControlInput::TransportClosed { code }).await;
            }
            TransportEventKind::Error(reason) => {
                MALFORMED_FRAME_COUNTER.increment(1);
                self.stats.lock().await.record_malformed();
                self.emit(ClientEvent::MalformedFrame { reason });
            }
        }
    }

    async fn handle_inbound(&mut self, message: InboundMessage) {
        MESSAGES_RECEIVED_COUNTER.increment(1);
        self.stats.lock().await.record_message();

        if message.is_pong() {
            self.apply(ControlInput::PongReceived).await;
            return;
        }

        if message.kind == MessageKind::Error {
            let text = message
                .message
                .clone()
                .unwrap_or_else(|| "unspecified server error".to_string());
            warn!(message = %text, "Server reported error");
            self.emit(ClientEvent::ServerError { message: text });
        }

        match self.dispatcher.dispatch(&message) {
            DispatchOutcome::Handled => {}
            DispatchOutcome::Unhandled => self.stats.lock().await.record_unhandled(),
            DispatchOutcome::HandlerFailed { reason } => {
                HANDLER_FAILURE_COUNTER.increment(1);
                self.stats.lock().await.record_handler_failure();
                self.emit(ClientEvent::HandlerFailed {
                    kind: message.kind.clone(),
                    reason,
                });
            }
        }
    }

    async fn apply(&mut self, input: ControlInput) {
        let commands = self.controller.handle(input);
        for command in commands {
            self.execute(command).await;
        }
    }

    async fn execute(&mut self, command: Command) {
        trace!(?command, "Executing controller command");
        match command {
            Command::ConnectPush => {
                let transport = self.transports.push();
                self.emit(ClientEvent::Connecting {
                    url: self.config.channel.push_url.to_string(),
                    attempt: self.controller.attempt(),
                });
                self.open_transport(transport);
            }
            Command::StartPolling => {
                FALLBACK_COUNTER.increment(1);
                warn!(
                    poll_url = %self.config.channel.poll_url,
                    "Live updates unavailable, refreshing periodically"
                );
                self.emit(ClientEvent::Degraded {
                    poll_url: self.config.channel.poll_url.to_string(),
                });
                let transport = self.transports.pull();
                self.open_transport(transport);
            }
            Command::CloseTransport { code } => {
                debug!(code, "Closing transport");
                self.close_transport(code);
            }
            Command::ScheduleReconnect { attempt, delay } => {
                RECONNECT_COUNTER.increment(1);
                self.stats.lock().await.record_reconnect();
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Reconnecting after delay"
                );
                self.reconnect_at = Some(Instant::now() + delay);
                self.emit(ClientEvent::Reconnecting { attempt, delay });
            }
            Command::CancelReconnect => self.reconnect_at = None,
            Command::StartHeartbeat => {
                if self.config.heartbeat.enabled {
                    self.heartbeat_at = Some(Instant::now() + self.config.heartbeat.interval);
                }
            }
            Command::StopHeartbeat => self.heartbeat_at = None,
            Command::SendPing => {
                if let Some(transport) = self.transport.as_mut()
                    && !transport.send(&OutboundMessage::ping())
                {
                    debug!("Ping refused by transport");
                }
            }
            Command::ArmPongTimeout => {
                self.pong_deadline = Some(Instant::now() + self.config.heartbeat.timeout);
            }
            Command::DisarmPongTimeout => self.pong_deadline = None,
            Command::Resubscribe => {
                let subscriptions = self.subscriptions.clone();
                for subscription in &subscriptions {
                    self.send_subscription(subscription);
                }
            }
            Command::FlushQueue => {
                if let Some(transport) = self.transport.as_mut() {
                    let sent = self.queue.flush(transport.as_mut());
                    if sent > 0 {
                        debug!(sent, remaining = self.queue.len(), "Flushed outbound queue");
                    }
                }
                self.stats.lock().await.queued = self.queue.len();
            }
            Command::PausePolling => {
                if let Some(transport) = self.transport.as_mut() {
                    transport.pause();
                }
            }
            Command::ResumePolling => {
                if let Some(transport) = self.transport.as_mut() {
                    transport.resume();
                }
            }
            Command::StateChanged { from, to } => {
                info!(%from, %to, topic = %self.config.channel.topic, "Channel state changed");
                self.state_tx.send_replace(to);
                CONNECTED_GAUGE.set(if to == ConnectionState::Connected { 1.0 } else { 0.0 });

                let connection_id = {
                    let mut stats = self.stats.lock().await;
                    stats.state = to;
                    stats.connection_id.clone()
                };
                self.emit(ClientEvent::StateChanged { from, to });
                if to == ConnectionState::Connected {
                    self.emit(ClientEvent::Connected {
                        connection_id,
                        transport: TransportKind::Push,
                    });
                }
            }
        }
    }

    fn open_transport(&mut self, mut transport: Box<dyn Transport>) {
        self.close_transport(CLOSE_NORMAL);
        self.generation += 1;
        debug!(generation = self.generation, kind = %transport.kind(), "Starting transport");
        transport.start(EventSink::new(self.generation, self.transport_tx.clone()));
        self.transport = Some(transport);
    }

    /// Closes the active transport with `code` and retires its generation so late
    /// events are dropped.
    fn close_transport(&mut self, code: u16) {
        if let Some(mut transport) = self.transport.take() {
            transport.close(code);
            self.generation += 1;
        }
    }

    fn send_subscription(&mut self, subscription: &Subscription) {
        let message = OutboundMessage::subscribe(subscription);
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if transport.send(&message) {
            let text = message.to_json().unwrap_or_default();
            debug!(message = %text, "Subscription sent");
            self.emit(ClientEvent::SubscriptionSent { message: text });
        } else {
            debug!(channel = %subscription.channel, "Subscription deferred to next connect");
        }
    }

    async fn send_or_queue(&mut self, message: OutboundMessage) {
        // anything already waiting must leave first to keep FIFO order
        if self.queue.is_empty()
            && let Some(transport) = self.transport.as_mut()
            && transport.send(&message)
        {
            return;
        }

        if let Some(evicted) = self.queue.enqueue(message) {
            QUEUE_DROP_COUNTER.increment(1);
            self.stats.lock().await.record_queue_drop();
            self.emit(ClientEvent::QueueOverflow {
                dropped_type: evicted.message_type,
            });
        }

        if self.controller.state().is_live()
            && let Some(transport) = self.transport.as_mut()
        {
            self.queue.flush(transport.as_mut());
        }
        self.stats.lock().await.queued = self.queue.len();
    }

    fn emit(&self, event: ClientEvent) {
        let Some(events) = &self.events else {
            return;
        };
        if let Err(e) = events.try_send(event) {
            match e {
                mpsc::error::TrySendError::Full(event) => {
                    trace!(?event, "Event channel full, dropping status event")
                }
                mpsc::error::TrySendError::Closed(_) => {
                    trace!("Event receiver dropped")
                }
            }
        }
    }
}

impl Drop for ChannelRuntime {
    fn drop(&mut self) {
        if self.transport.is_some() {
            debug!("Channel runtime dropped with an active transport");
            self.close_transport(CLOSE_NORMAL);
        }
    }
}
