/// file: src/config.rs
/// description: channel configuration, endpoint derivation from the page origin and CLI mapping
use crate::{
    backoff::BackoffSchedule,
    cli::Args,
    controller::DEFAULT_MAX_PUSH_FAILURES,
    error::ChannelError,
    queue::DEFAULT_QUEUE_CAPACITY,
    types::{ChannelTopic, Subscription},
};
use anyhow::Result;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub channel: ChannelConfig,
    pub backoff: BackoffSchedule,
    pub heartbeat: HeartbeatConfig,
    pub polling: PollingConfig,
    pub queue: QueueConfig,
    pub metrics: MetricsConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub origin: Url,
    pub topic: ChannelTopic,
    pub push_url: Url,
    pub poll_url: Url,
    pub connect_timeout: Duration,
    pub max_push_failures: u32,
    /// Subscriptions issued on every successful connect.
    pub subscriptions: Vec<Subscription>,
}

#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub interval: Duration,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub capacity: usize,
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub colored: bool,
    pub quiet: bool,
    pub currency: String,
}

/// Push endpoint for `path` on the same host as `origin`: https pages get wss, http pages get ws.
pub fn push_endpoint(origin: &Url, path: &str) -> Result<Url, ChannelError> {
    let scheme = match origin.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(ChannelError::UnsupportedScheme {
                scheme: other.to_string(),
            });
        }
    };
    if origin.host_str().is_none() {
        return Err(ChannelError::InvalidOrigin(origin.to_string()));
    }

    let mut url = origin.join(path)?;
    url.set_scheme(scheme)
        .map_err(|_| ChannelError::InvalidOrigin(origin.to_string()))?;
    Ok(url)
}

pub fn snapshot_endpoint(origin: &Url, path: &str) -> Result<Url, ChannelError> {
    if !matches!(origin.scheme(), "http" | "https") {
        return Err(ChannelError::UnsupportedScheme {
            scheme: origin.scheme().to_string(),
        });
    }
    if origin.host_str().is_none() {
        return Err(ChannelError::InvalidOrigin(origin.to_string()));
    }
    Ok(origin.join(path)?)
}

impl Config {
    /// Library defaults for a page served from `origin`.
    pub fn for_origin(origin: &str, topic: ChannelTopic) -> Result<Self, ChannelError> {
        let origin = Url::parse(origin)?;
        let push_url = push_endpoint(&origin, topic.push_path())?;
        let poll_url = snapshot_endpoint(&origin, topic.snapshot_path())?;

        Ok(Config {
            channel: ChannelConfig {
                origin,
                topic,
                push_url,
                poll_url,
                connect_timeout: Duration::from_secs(10),
                max_push_failures: DEFAULT_MAX_PUSH_FAILURES,
                subscriptions: Vec::new(),
            },
            backoff: BackoffSchedule::default(),
            heartbeat: HeartbeatConfig {
                enabled: true,
                interval: Duration::from_secs(30),
                timeout: Duration::from_secs(10),
            },
            polling: PollingConfig {
                interval: Duration::from_secs(10),
                request_timeout: Duration::from_secs(10),
            },
            queue: QueueConfig {
                capacity: DEFAULT_QUEUE_CAPACITY,
            },
            metrics: MetricsConfig {
                enabled: false,
                port: 9090,
            },
            ui: UiConfig {
                colored: true,
                quiet: false,
                currency: "USD".to_string(),
            },
        })
    }

    pub fn from_args(args: &Args) -> Result<Self> {
        let topic: ChannelTopic = args.topic.parse()?;
        let mut config = Config::for_origin(&args.origin, topic)?;

        config.channel.connect_timeout = Duration::from_secs(args.timeout.max(1));
        config.channel.max_push_failures = args.max_push_failures;
        if let Some(symbol) = &args.symbol {
            config
                .channel
                .subscriptions
                .push(Subscription::chart(symbol, &args.timeframe));
        }

        config.backoff = BackoffSchedule::new(
            Duration::from_millis(args.initial_backoff_ms),
            args.backoff_multiplier,
            Duration::from_secs(args.max_backoff),
        );
        config.heartbeat = HeartbeatConfig {
            enabled: !args.no_heartbeat,
            interval: Duration::from_secs(args.heartbeat_interval),
            timeout: Duration::from_secs(args.heartbeat_timeout),
        };
        config.polling = PollingConfig {
            interval: Duration::from_secs(args.poll_interval),
            request_timeout: Duration::from_secs(args.poll_interval),
        };
        config.queue.capacity = args.queue_capacity;
        config.metrics = MetricsConfig {
            enabled: args.metrics,
            port: args.metrics_port,
        };
        config.ui = UiConfig {
            colored: !args.no_color,
            quiet: args.quiet,
            currency: args.currency.to_ascii_uppercase(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.heartbeat.enabled && self.heartbeat.timeout >= self.heartbeat.interval {
            return Err(ChannelError::InvalidConfig(format!(
                "heartbeat timeout ({:?}) must be shorter than the interval ({:?})",
                self.heartbeat.timeout, self.heartbeat.interval
            )));
        }
        if self.polling.interval.is_zero() {
            return Err(ChannelError::InvalidConfig(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.queue.capacity == 0 {
            return Err(ChannelError::InvalidConfig(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
