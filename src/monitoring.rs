use crate::{client_state::ChannelStats, error::ChannelError};
use anyhow::Result;
use metrics::{Counter, Gauge, counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, sync::LazyLock};
use tracing::{error, info};

// Global metrics
pub static MESSAGES_RECEIVED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("livechannel_messages_received_total"));
pub static MALFORMED_FRAME_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("livechannel_malformed_frames_total"));
pub static HANDLER_FAILURE_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("livechannel_handler_failures_total"));
pub static RECONNECT_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("livechannel_reconnects_total"));
pub static FALLBACK_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("livechannel_polling_fallbacks_total"));
pub static POLL_COUNTER: LazyLock<Counter> = LazyLock::new(|| counter!("livechannel_polls_total"));
pub static POLL_FAILURE_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("livechannel_poll_failures_total"));
pub static QUEUE_DROP_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("livechannel_outbound_dropped_total"));
pub static CONNECTED_GAUGE: LazyLock<Gauge> = LazyLock::new(|| gauge!("livechannel_connected"));

pub async fn setup_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    let builder = PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", "rs-livechannel")
        .add_global_label("version", env!("CARGO_PKG_VERSION"));

    match builder.install() {
        Ok(_handle) => {
            info!(
                "Prometheus metrics server started on http://{}/metrics",
                addr
            );

            MESSAGES_RECEIVED_COUNTER.absolute(0);
            MALFORMED_FRAME_COUNTER.absolute(0);
            HANDLER_FAILURE_COUNTER.absolute(0);
            RECONNECT_COUNTER.absolute(0);
            FALLBACK_COUNTER.absolute(0);
            POLL_COUNTER.absolute(0);
            POLL_FAILURE_COUNTER.absolute(0);
            QUEUE_DROP_COUNTER.absolute(0);
            CONNECTED_GAUGE.set(0.0);

            Ok(())
        }
        Err(e) => {
            error!("Failed to start metrics server: {}", e);
            Err(ChannelError::MetricsError(e.to_string()).into())
        }
    }
}

#[derive(Debug)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub topic: String,
    pub state: String,
    pub transport: Option<String>,
    pub last_message_time: Option<chrono::DateTime<chrono::Utc>>,
    pub total_messages: u64,
    pub malformed_frames: u64,
    pub reconnect_count: u64,
    pub queued_messages: usize,
    pub uptime: chrono::Duration,
}

impl HealthStatus {
    /// Connected or degraded counts as healthy: in both cases the page receives data.
    pub fn from_stats(stats: &ChannelStats) -> Self {
        let uptime = chrono::Duration::from_std(stats.started_at.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());

        Self {
            is_healthy: stats.state.is_live(),
            topic: stats.topic.to_string(),
            state: stats.state.to_string(),
            transport: stats.transport.map(|t| t.to_string()),
            last_message_time: stats.last_message_at,
            total_messages: stats.messages(),
            malformed_frames: stats
                .malformed_frames
                .load(std::sync::atomic::Ordering::Relaxed),
            reconnect_count: u64::from(stats.reconnects()),
            queued_messages: stats.queued,
            uptime,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": if self.is_healthy { "healthy" } else { "unhealthy" },
            "topic": self.topic,
            "state": self.state,
            "transport": self.transport,
            "last_message_time": self.last_message_time,
            "total_messages": self.total_messages,
            "malformed_frames": self.malformed_frames,
            "reconnect_count": self.reconnect_count,
            "queued_messages": self.queued_messages,
            "uptime_seconds": self.uptime.num_seconds(),
            "timestamp": chrono::Utc::now()
        })
    }
}
