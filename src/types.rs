/// file: src/types.rs
/// description: wire messages, topics and connection states shared by transports, controller and dispatcher
use crate::error::ChannelError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, fmt, str::FromStr};

// Prices arrive as JSON numbers or as decimal strings depending on the endpoint
mod number_or_string {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Number(value) => Ok(value),
            Raw::Text(text) => text.trim().parse::<f64>().map_err(serde::de::Error::custom),
        }
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Number(value)) => Ok(Some(value)),
            Some(Raw::Text(text)) => text
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// WebSocket close code for a client-initiated, orderly shutdown.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Close code used when the heartbeat declares the socket dead.
pub const CLOSE_HEARTBEAT_TIMEOUT: u16 = 4000;

/// Data feed a client is bound to for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelTopic {
    Market,
    Portfolio,
    Withdrawals,
    Dashboard,
}

impl ChannelTopic {
    pub const ALL: [ChannelTopic; 4] = [
        ChannelTopic::Market,
        ChannelTopic::Portfolio,
        ChannelTopic::Withdrawals,
        ChannelTopic::Dashboard,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelTopic::Market => "market",
            ChannelTopic::Portfolio => "portfolio",
            ChannelTopic::Withdrawals => "withdrawals",
            ChannelTopic::Dashboard => "dashboard",
        }
    }

    /// Path of the push endpoint, relative to the page origin.
    pub fn push_path(self) -> &'static str {
        match self {
            ChannelTopic::Market => "/ws/market/",
            ChannelTopic::Portfolio => "/ws/portfolio/",
            ChannelTopic::Withdrawals => "/ws/withdrawals/",
            ChannelTopic::Dashboard => "/ws/dashboard/",
        }
    }

    /// Path of the snapshot endpoint polled in degraded mode.
    pub fn snapshot_path(self) -> &'static str {
        match self {
            ChannelTopic::Market => "/api/market-data/",
            ChannelTopic::Portfolio => "/api/portfolio/",
            ChannelTopic::Withdrawals => "/api/withdrawals/status/",
            ChannelTopic::Dashboard => "/api/dashboard/summary/",
        }
    }

    /// Translate a snapshot response body into the message the push endpoint
    /// would have delivered for the same data.
    pub fn adapt_snapshot(self, body: Value) -> Result<InboundMessage, ChannelError> {
        let envelope: SnapshotEnvelope = serde_json::from_value(body)?;
        if !envelope.success {
            return Err(ChannelError::SnapshotRejected {
                message: envelope
                    .message
                    .unwrap_or_else(|| "success flag was false".to_string()),
            });
        }

        let mut payload = envelope.payload;
        let (kind, data) = match self {
            ChannelTopic::Market => {
                let quotes = payload
                    .remove("cryptocurrencies")
                    .unwrap_or_else(|| Value::Array(Vec::new()));
                let mut data = Map::new();
                data.insert("cryptocurrencies".to_string(), quotes);
                (MessageKind::PriceUpdate, Value::Object(data))
            }
            ChannelTopic::Portfolio => {
                let data = payload
                    .remove("portfolio")
                    .unwrap_or(Value::Object(payload));
                (MessageKind::PortfolioUpdate, data)
            }
            ChannelTopic::Withdrawals => {
                let withdrawals = payload
                    .remove("withdrawals")
                    .unwrap_or_else(|| Value::Array(Vec::new()));
                let mut data = Map::new();
                data.insert("withdrawals".to_string(), withdrawals);
                (MessageKind::StatusUpdate, Value::Object(data))
            }
            ChannelTopic::Dashboard => (MessageKind::BalanceUpdate, Value::Object(payload)),
        };

        Ok(InboundMessage {
            kind,
            data: Some(data),
            message: None,
        })
    }
}

impl fmt::Display for ChannelTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelTopic {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChannelTopic::ALL
            .into_iter()
            .find(|topic| topic.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ChannelError::UnknownTopic(s.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Push transport abandoned; data is refreshed by polling.
    Degraded,
    Closed,
}

impl ConnectionState {
    pub fn is_live(self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Degraded)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Closed => "closed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Push,
    Pull,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Push => f.write_str("push"),
            TransportKind::Pull => f.write_str("pull"),
        }
    }
}

/// Discriminator of an inbound message. Unrecognised values are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    MarketData,
    PriceUpdate,
    ChartData,
    PortfolioUpdate,
    BalanceUpdate,
    StatusUpdate,
    Pong,
    Error,
    Unknown(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::MarketData => "market_data",
            MessageKind::PriceUpdate => "price_update",
            MessageKind::ChartData => "chart_data",
            MessageKind::PortfolioUpdate => "portfolio_update",
            MessageKind::BalanceUpdate => "balance_update",
            MessageKind::StatusUpdate => "status_update",
            MessageKind::Pong => "pong",
            MessageKind::Error => "error",
            MessageKind::Unknown(other) => other,
        }
    }
}

impl From<String> for MessageKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "market_data" => MessageKind::MarketData,
            "price_update" => MessageKind::PriceUpdate,
            "chart_data" => MessageKind::ChartData,
            "portfolio_update" => MessageKind::PortfolioUpdate,
            "balance_update" => MessageKind::BalanceUpdate,
            "status_update" => MessageKind::StatusUpdate,
            "pong" => MessageKind::Pong,
            "error" => MessageKind::Error,
            _ => MessageKind::Unknown(value),
        }
    }
}

impl From<MessageKind> for String {
    fn from(value: MessageKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-to-client message: `{type, data?, message?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl InboundMessage {
    pub fn new(kind: MessageKind, data: Value) -> Self {
        Self {
            kind,
            data: Some(data),
            message: None,
        }
    }

    pub fn is_pong(&self) -> bool {
        self.kind == MessageKind::Pong
    }

    /// Deserialize the `data` body into a page-specific type.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, ChannelError> {
        let data = self.data.clone().unwrap_or(Value::Null);
        Ok(serde_json::from_value(data)?)
    }
}

/// Client-to-server request, serialised as a flat object tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl OutboundMessage {
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn ping() -> Self {
        Self::new("ping")
    }

    pub fn subscribe(subscription: &Subscription) -> Self {
        subscription.fill(Self::new(subscription.message_type("subscribe")))
    }

    pub fn unsubscribe(subscription: &Subscription) -> Self {
        subscription.fill(Self::new(subscription.message_type("unsubscribe")))
    }

    pub fn to_json(&self) -> Result<String, ChannelError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A server-side stream the page wants, re-issued after every successful connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub channel: String,
    pub params: BTreeMap<String, String>,
}

impl Subscription {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// `{symbol, timeframe}` chart subscription used by the market pages.
    pub fn chart(symbol: &str, timeframe: &str) -> Self {
        Self::new("chart")
            .with_param("symbol", symbol.to_ascii_uppercase())
            .with_param("timeframe", timeframe)
    }

    fn message_type(&self, verb: &str) -> String {
        if self.channel.is_empty() {
            verb.to_string()
        } else {
            format!("{verb}_{}", self.channel)
        }
    }

    fn fill(&self, mut message: OutboundMessage) -> OutboundMessage {
        for (key, value) in &self.params {
            message
                .fields
                .insert(key.clone(), Value::String(value.clone()));
        }
        message
    }
}

/// One row of the market snapshot / price update payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoQuote {
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(alias = "current_price", deserialize_with = "number_or_string::deserialize")]
    pub price: f64,
    #[serde(
        default,
        alias = "change_24h",
        alias = "price_change_percentage_24h",
        deserialize_with = "number_or_string::deserialize_option"
    )]
    pub price_change_24h: Option<f64>,
}

/// Pulls the quote list out of a `price_update` / `market_data` body.
pub fn quotes_from(message: &InboundMessage) -> Result<Vec<CryptoQuote>, ChannelError> {
    #[derive(Deserialize)]
    struct QuoteList {
        #[serde(default)]
        cryptocurrencies: Vec<CryptoQuote>,
    }

    match &message.data {
        Some(Value::Array(_)) => message.data_as::<Vec<CryptoQuote>>(),
        Some(_) => Ok(message.data_as::<QuoteList>()?.cryptocurrencies),
        None => Ok(Vec::new()),
    }
}
