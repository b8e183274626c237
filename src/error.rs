use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("WebSocket connection error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Unsupported origin scheme '{scheme}', expected http or https")]
    UnsupportedScheme { scheme: String },

    #[error("Origin has no host: {0}")]
    InvalidOrigin(String),

    #[error("Unknown channel topic: {0}")]
    UnknownTopic(String),

    #[error("Snapshot rejected by server: {message}")]
    SnapshotRejected { message: String },

    #[error("Channel client is no longer running")]
    ClientStopped,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Metrics server error: {0}")]
    MetricsError(String),
}
