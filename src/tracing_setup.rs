// file: src/tracing_setup.rs
// description: logging initialisation; stderr only so page output on stdout stays clean

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

// transport internals log every frame at debug
const DEPENDENCY_DIRECTIVES: &[&str] = &[
    "tungstenite=warn",
    "tokio_tungstenite=warn",
    "hyper_util=warn",
    "reqwest=warn",
];

/// `RUST_LOG` wins when set; otherwise `log_level` applies to this crate only.
pub fn build_filter(log_level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut directives = vec![format!("rs_livechannel={log_level}")];
    directives.extend(DEPENDENCY_DIRECTIVES.iter().map(|d| d.to_string()));

    EnvFilter::try_new(directives.join(","))
        .unwrap_or_else(|_| EnvFilter::new("rs_livechannel=info"))
}

pub fn setup_tracing(log_level: &str, json_logs: bool) -> Result<()> {
    let fmt_layer = if json_logs {
        fmt::layer()
            .json()
            .with_current_span(false)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(build_filter(log_level))
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
