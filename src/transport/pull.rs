// file: src/transport/pull.rs
// description: fixed-interval snapshot polling that mimics the push transport's message stream

use super::{EventSink, Transport, TransportEventKind};
use crate::{
    error::ChannelError,
    monitoring::{POLL_COUNTER, POLL_FAILURE_COUNTER},
    types::{ChannelTopic, OutboundMessage, TransportKind},
};
use async_trait::async_trait;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{MissedTickBehavior, interval, timeout},
};
use tracing::{debug, info, warn};
use url::Url;

/// Where snapshot bodies come from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<Value, ChannelError>;
}

pub struct HttpSnapshotSource {
    client: reqwest::Client,
    url: Url,
}

impl HttpSnapshotSource {
    pub fn new(url: Url, request_timeout: Duration) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("rs-livechannel/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self) -> Result<Value, ChannelError> {
        let response = self
            .client
            .get(self.url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<Value>().await?)
    }
}

#[derive(Debug, Clone, Copy)]
enum PollControl {
    Pause,
    Resume,
}

pub struct PollingTransport {
    topic: ChannelTopic,
    period: Duration,
    source: Arc<dyn SnapshotSource>,
    control: Option<mpsc::UnboundedSender<PollControl>>,
    task: Option<JoinHandle<()>>,
}

impl PollingTransport {
    pub fn new(topic: ChannelTopic, period: Duration, source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            topic,
            period: period.max(Duration::from_millis(1)),
            source,
            control: None,
            task: None,
        }
    }
}

impl Transport for PollingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Pull
    }

    fn start(&mut self, sink: EventSink) {
        if self.task.is_some() {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.control = Some(tx);
        self.task = Some(tokio::spawn(run_polling(
            self.topic,
            self.period,
            self.source.clone(),
            rx,
            sink,
        )));
    }

    // polling has no close handshake, the code has nowhere to go
    fn close(&mut self, _code: u16) {
        self.control.take();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn send(&mut self, message: &OutboundMessage) -> bool {
        // snapshot endpoints are stateless, subscriptions have nothing to attach to
        debug!(
            topic = %self.topic,
            message_type = %message.message_type,
            "Polling transport discarding outbound message"
        );
        true
    }

    fn pause(&mut self) {
        if let Some(control) = &self.control {
            let _ = control.send(PollControl::Pause);
        }
    }

    fn resume(&mut self) {
        if let Some(control) = &self.control {
            let _ = control.send(PollControl::Resume);
        }
    }
}

impl Drop for PollingTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_polling(
    topic: ChannelTopic,
    period: Duration,
    source: Arc<dyn SnapshotSource>,
    mut control: mpsc::UnboundedReceiver<PollControl>,
    sink: EventSink,
) {
    info!(topic = %topic, period_ms = period.as_millis() as u64, "Polling fallback started");
    sink.emit(TransportEventKind::Open);

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut paused = false;

    loop {
        tokio::select! {
            biased;
            command = control.recv() => match command {
                Some(PollControl::Pause) => {
                    debug!(topic = %topic, "Polling paused");
                    paused = true;
                }
                Some(PollControl::Resume) => {
                    debug!(topic = %topic, "Polling resumed");
                    paused = false;
                    ticker.reset_immediately();
                }
                None => return,
            },
            _ = ticker.tick(), if !paused => {
                if !poll_once(topic, period, source.as_ref(), &sink).await {
                    return;
                }
            }
        }
    }
}

/// Fetches one snapshot, giving up after `budget`.
async fn fetch_within(budget: Duration, source: &dyn SnapshotSource) -> Result<Value, ChannelError> {
    timeout(budget, source.fetch())
        .await
        .unwrap_or_else(|_| Err(ChannelError::Timeout))
}

/// One poll tick. Returns false once nobody is listening any more.
async fn poll_once(
    topic: ChannelTopic,
    budget: Duration,
    source: &dyn SnapshotSource,
    sink: &EventSink,
) -> bool {
    POLL_COUNTER.increment(1);

    let body = match fetch_within(budget, source).await {
        Ok(body) => body,
        Err(e) => {
            POLL_FAILURE_COUNTER.increment(1);
            warn!(topic = %topic, "Snapshot request failed: {}", e);
            return !sink.is_closed();
        }
    };

    match topic.adapt_snapshot(body) {
        Ok(message) => sink.emit(TransportEventKind::Message(message)),
        Err(e) => {
            POLL_FAILURE_COUNTER.increment(1);
            warn!(topic = %topic, "Unusable snapshot: {}", e);
            !sink.is_closed()
        }
    }
}
