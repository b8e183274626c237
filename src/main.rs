use anyhow::Result;
use clap::Parser;
use rs_livechannel::{
    cli::Args,
    client::ChannelClient,
    config::Config,
    dispatcher::Dispatcher,
    events::create_event_channel,
    monitoring::setup_metrics,
    tracing_setup::setup_tracing,
    types::{ConnectionState, MessageKind, quotes_from},
    ui::{UIController, UIOptions, render_balances, render_portfolio, render_quotes},
};
use std::sync::Arc;
use tracing::{error, info, warn};

fn page_handlers(currency: &str, colored: bool, quiet: bool) -> Dispatcher {
    let prices_currency = currency.to_string();
    let market_currency = currency.to_string();
    let portfolio_currency = currency.to_string();
    let balance_currency = currency.to_string();

    Dispatcher::new()
        .on(MessageKind::PriceUpdate, move |msg| {
            let quotes = quotes_from(msg)?;
            if !quiet {
                println!("{}", render_quotes(&quotes, &prices_currency, colored));
            }
            Ok(())
        })
        .on(MessageKind::MarketData, move |msg| {
            let quotes = quotes_from(msg)?;
            if !quiet {
                println!("{}", render_quotes(&quotes, &market_currency, colored));
            }
            Ok(())
        })
        .on(MessageKind::PortfolioUpdate, move |msg| {
            if let Some(data) = &msg.data
                && !quiet
            {
                println!("{}", render_portfolio(data, &portfolio_currency));
            }
            Ok(())
        })
        .on(MessageKind::BalanceUpdate, move |msg| {
            if let Some(data) = &msg.data
                && !quiet
            {
                println!("{}", render_balances(data, &balance_currency));
            }
            Ok(())
        })
        .on(MessageKind::StatusUpdate, |msg| {
            info!(data = ?msg.data, "Status update");
            Ok(())
        })
        .on(MessageKind::ChartData, |msg| {
            let points = msg
                .data
                .as_ref()
                .and_then(|d| d.as_array())
                .map(Vec::len)
                .unwrap_or(0);
            info!(points, "Chart data received");
            Ok(())
        })
        .on(MessageKind::Error, |msg| {
            warn!(message = ?msg.message, "Server error message");
            Ok(())
        })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_tracing(&args.log_level, args.json_logs)?;

    // both reqwest and tungstenite pull in rustls; pick the provider once
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!("Starting live data channel v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::from_args(&args)?);

    if config.metrics.enabled {
        setup_metrics(config.metrics.port).await?;
        info!("Metrics server started on port {}", config.metrics.port);
    }

    let dispatcher = page_handlers(&config.ui.currency, config.ui.colored, config.ui.quiet);
    let (event_tx, event_rx) = create_event_channel();
    let (handle, channel_task) = ChannelClient::new(config.clone(), dispatcher)?
        .with_events(event_tx)
        .spawn();

    let mut ui = UIController::new(
        event_rx,
        UIOptions {
            colored: config.ui.colored,
            quiet: config.ui.quiet,
        },
    );
    let ui_task = tokio::spawn(async move { ui.run().await });

    handle.start()?;
    info!("Channel started. Press Ctrl+C to shutdown...");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
            handle.stop();
        }
        _ = handle.wait_for_state(ConnectionState::Closed) => {
            info!("Server closed the channel");
        }
    }

    if let Err(e) = channel_task.await {
        error!("Channel task failed: {}", e);
    }
    if let Err(e) = ui_task.await {
        error!("UI task failed: {}", e);
    }

    info!("Channel stopped successfully");
    Ok(())
}
