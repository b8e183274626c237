#![allow(dead_code)]

use async_trait::async_trait;
use rs_livechannel::{
    ChannelError,
    config::Config,
    events::{ClientEvent, EventReceiver},
    transport::{
        EventSink, PollingTransport, SnapshotSource, Transport, TransportEventKind,
        TransportFactory,
    },
    types::{ChannelTopic, InboundMessage, MessageKind, OutboundMessage, TransportKind},
};
use serde_json::{Value, json};
use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

/// What the next push connection attempt does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushBehavior {
    /// Connection refused: an abnormal close right away.
    Fail,
    Open,
}

pub struct ScriptedPush {
    behavior: PushBehavior,
    auto_pong: bool,
    open: Arc<AtomicBool>,
    sink: Option<EventSink>,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    sinks: Arc<Mutex<Vec<EventSink>>>,
    closes: Arc<Mutex<Vec<u16>>>,
}

impl Transport for ScriptedPush {
    fn kind(&self) -> TransportKind {
        TransportKind::Push
    }

    fn start(&mut self, sink: EventSink) {
        self.sinks.lock().unwrap().push(sink.clone());
        match self.behavior {
            PushBehavior::Fail => {
                sink.emit(TransportEventKind::Close {
                    code: 1006,
                    reason: "connection refused".to_string(),
                });
            }
            PushBehavior::Open => {
                self.open.store(true, Ordering::SeqCst);
                sink.emit(TransportEventKind::Open);
            }
        }
        self.sink = Some(sink);
    }

    fn close(&mut self, code: u16) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.closes.lock().unwrap().push(code);
        }
    }

    fn send(&mut self, message: &OutboundMessage) -> bool {
        if !self.open.load(Ordering::SeqCst) {
            return false;
        }
        self.sent.lock().unwrap().push(message.clone());
        if self.auto_pong
            && message.message_type == "ping"
            && let Some(sink) = &self.sink
        {
            sink.emit(TransportEventKind::Message(InboundMessage {
                kind: MessageKind::Pong,
                data: None,
                message: None,
            }));
        }
        true
    }
}

/// Returns a canned market snapshot on every poll.
pub struct StaticSnapshots {
    pub fetches: AtomicUsize,
    body: Value,
}

impl StaticSnapshots {
    pub fn market() -> Self {
        Self {
            fetches: AtomicUsize::new(0),
            body: json!({
                "success": true,
                "cryptocurrencies": [
                    {"symbol": "BTC", "name": "Bitcoin", "current_price": "64250.50", "price_change_24h": -1.2},
                    {"symbol": "ETH", "name": "Ethereum", "current_price": 3100.0, "price_change_24h": 2.4}
                ]
            }),
        }
    }
}

#[async_trait]
impl SnapshotSource for StaticSnapshots {
    async fn fetch(&self) -> Result<Value, ChannelError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.body.clone())
    }
}

pub struct ScriptedTransports {
    script: Mutex<VecDeque<PushBehavior>>,
    fallback: PushBehavior,
    auto_pong: bool,
    poll_period: Duration,
    pub snapshots: Arc<StaticSnapshots>,
    pub push_attempts: AtomicUsize,
    pub pull_starts: AtomicUsize,
    pub sent: Arc<Mutex<Vec<OutboundMessage>>>,
    pub sinks: Arc<Mutex<Vec<EventSink>>>,
    /// Close codes sent on connections that were open.
    pub closes: Arc<Mutex<Vec<u16>>>,
}

impl ScriptedTransports {
    /// Push attempts follow `script`, then repeat `fallback` forever.
    pub fn new(script: &[PushBehavior], fallback: PushBehavior) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            fallback,
            auto_pong: false,
            poll_period: Duration::from_secs(10),
            snapshots: Arc::new(StaticSnapshots::market()),
            push_attempts: AtomicUsize::new(0),
            pull_starts: AtomicUsize::new(0),
            sent: Arc::new(Mutex::new(Vec::new())),
            sinks: Arc::new(Mutex::new(Vec::new())),
            closes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_auto_pong(mut self) -> Self {
        self.auto_pong = true;
        self
    }

    pub fn push_attempts(&self) -> usize {
        self.push_attempts.load(Ordering::SeqCst)
    }

    pub fn sent_types(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.message_type.clone())
            .collect()
    }

    pub fn close_codes(&self) -> Vec<u16> {
        self.closes.lock().unwrap().clone()
    }

    pub fn latest_sink(&self) -> EventSink {
        self.sinks.lock().unwrap().last().cloned().unwrap()
    }
}

impl TransportFactory for ScriptedTransports {
    fn push(&self) -> Box<dyn Transport> {
        self.push_attempts.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);
        Box::new(ScriptedPush {
            behavior,
            auto_pong: self.auto_pong,
            open: Arc::new(AtomicBool::new(false)),
            sink: None,
            sent: self.sent.clone(),
            sinks: self.sinks.clone(),
            closes: self.closes.clone(),
        })
    }

    fn pull(&self) -> Box<dyn Transport> {
        self.pull_starts.fetch_add(1, Ordering::SeqCst);
        Box::new(PollingTransport::new(
            ChannelTopic::Market,
            self.poll_period,
            self.snapshots.clone(),
        ))
    }
}

/// 1s initial delay doubling to 30s, ceiling of 3 push failures, 30s/10s heartbeat.
pub fn test_config() -> Config {
    let mut config = Config::for_origin("http://127.0.0.1:8000", ChannelTopic::Market).unwrap();
    config.polling.interval = Duration::from_secs(10);
    config
}

/// Waits (in paused time) for the first event matching `pred`.
pub async fn next_event<F>(events: &mut EventReceiver, mut pred: F) -> ClientEvent
where
    F: FnMut(&ClientEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(3_600), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Lets the channel task drain whatever it has already been handed.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
