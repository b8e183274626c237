use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "rs-livechannel",
    about = "real-time brokerage data channel with websocket push and polling fallback",
    version
)]
pub struct Args {
    /// Origin of the brokerage site; ws/wss and the snapshot URL are derived from it
    #[arg(short, long, default_value = "http://127.0.0.1:8000")]
    pub origin: String,

    /// Data topic to follow (market, portfolio, withdrawals, dashboard)
    #[arg(short, long, default_value = "market")]
    pub topic: String,

    /// Subscribe to chart data for this symbol (e.g., BTC, ETH)
    #[arg(short, long)]
    pub symbol: Option<String>,

    /// Chart timeframe used with --symbol
    #[arg(long, default_value = "1d")]
    pub timeframe: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Output logs in JSON format
    #[arg(long)]
    pub json_logs: bool,

    /// Enable metrics server
    #[arg(long)]
    pub metrics: bool,

    /// Metrics server port
    #[arg(long, default_value = "9090")]
    pub metrics_port: u16,

    /// WebSocket connect timeout in seconds
    #[arg(long, default_value = "10")]
    pub timeout: u64,

    /// First reconnection delay in milliseconds
    #[arg(long, default_value = "1000")]
    pub initial_backoff_ms: u64,

    /// Growth factor applied to the reconnection delay after each failure
    #[arg(long, default_value = "2.0")]
    pub backoff_multiplier: f64,

    /// Upper bound on the reconnection delay in seconds
    #[arg(long, default_value = "30")]
    pub max_backoff: u64,

    /// Consecutive push failures tolerated before switching to polling for good
    #[arg(long, default_value = "3")]
    pub max_push_failures: u32,

    /// Seconds between heartbeat pings
    #[arg(long, default_value = "30")]
    pub heartbeat_interval: u64,

    /// Seconds to wait for a pong before declaring the socket dead
    #[arg(long, default_value = "10")]
    pub heartbeat_timeout: u64,

    /// Disable application-level ping/pong
    #[arg(long)]
    pub no_heartbeat: bool,

    /// Seconds between snapshot requests in polling mode
    #[arg(long, default_value = "10")]
    pub poll_interval: u64,

    /// Outbound messages kept while disconnected
    #[arg(long, default_value = "50")]
    pub queue_capacity: usize,

    /// Fiat currency used to render prices
    #[arg(long, default_value = "USD")]
    pub currency: String,

    /// Disable colored output (useful for piping to files)
    #[arg(long)]
    pub no_color: bool,

    /// Quiet mode - only data updates and errors
    #[arg(long)]
    pub quiet: bool,
}
