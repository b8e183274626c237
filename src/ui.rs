/// file: src/ui.rs
/// description: terminal presentation of channel status events and page updates
use crate::{
    events::{ClientEvent, EventReceiver},
    formatter::{
        Colors, Direction, currency_symbol, format_crypto_amount, format_currency,
        format_percentage,
    },
    types::{ConnectionState, CryptoQuote},
};
use serde_json::Value;
use tracing::{debug, info};

pub struct UIController {
    event_receiver: EventReceiver,
    colored: bool,
    quiet_mode: bool,
    topic: String,
}

pub struct UIOptions {
    pub colored: bool,
    pub quiet: bool,
}

impl UIController {
    pub fn new(event_receiver: EventReceiver, options: UIOptions) -> Self {
        Self {
            event_receiver,
            colored: options.colored,
            quiet_mode: options.quiet,
            topic: String::new(),
        }
    }

    pub async fn run(&mut self) {
        while let Some(event) = self.event_receiver.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }
    }

    /// Returns false once the channel has stopped.
    fn handle_event(&mut self, event: ClientEvent) -> bool {
        match event {
            ClientEvent::Starting { topic } => {
                info!(%topic, "Channel starting");
                self.topic = topic.to_string();
                self.print_startup_banner();
            }
            ClientEvent::Connecting { url, attempt } => {
                let detail = if attempt == 0 {
                    url
                } else {
                    format!("{url} (after {attempt} failed attempts)")
                };
                self.print_connection_status("CONNECTING", &detail);
            }
            ClientEvent::Connected {
                connection_id,
                transport,
            } => {
                self.print_connection_status(
                    "CONNECTED",
                    &format!("{transport} transport, ID: {connection_id}"),
                );
            }
            ClientEvent::StateChanged { from, to } => {
                debug!(%from, %to, "State changed");
                if to == ConnectionState::Disconnected && from == ConnectionState::Connected {
                    self.print_connection_status("DISCONNECTED", "Connection lost");
                }
            }
            ClientEvent::SubscriptionSent { message } => {
                self.print_subscription_info(&message);
            }
            ClientEvent::Reconnecting { attempt, delay } => {
                self.print_reconnect_info(delay.as_secs_f64(), attempt);
            }
            ClientEvent::Degraded { poll_url } => {
                self.print_connection_status(
                    "DEGRADED",
                    &format!("Live updates unavailable, refreshing from {poll_url}"),
                );
            }
            ClientEvent::HeartbeatTimeout => {
                self.print_error("HEARTBEAT", "No pong received, dropping connection");
            }
            ClientEvent::MalformedFrame { reason } => {
                debug!("Malformed frame: {}", reason);
            }
            ClientEvent::ServerError { message } => {
                self.print_error("SERVER ERROR", &message);
            }
            ClientEvent::HandlerFailed { kind, reason } => {
                self.print_error("HANDLER FAILED", &format!("{kind}: {reason}"));
            }
            ClientEvent::QueueOverflow { dropped_type } => {
                debug!(dropped_type = %dropped_type, "Outbound queue overflow");
            }
            ClientEvent::Stopped => {
                self.print_connection_status("STOPPED", "Channel closed");
                return false;
            }
        }

        true
    }

    fn paint(&self, color: &str, text: &str) -> String {
        paint(self.colored, color, text)
    }

    fn print_startup_banner(&self) {
        if self.quiet_mode {
            return;
        }

        let rule = "═".repeat(78);
        println!();
        println!("{}", self.paint(Colors::BRIGHT_CYAN, &format!("╔{rule}╗")));
        println!(
            "{}",
            self.paint(
                Colors::BRIGHT_CYAN,
                &format!("║{:^78}║", "LIVE DATA CHANNEL")
            )
        );
        println!("{}", self.paint(Colors::BRIGHT_CYAN, &format!("╠{rule}╣")));
        println!(
            "{}",
            self.paint(
                Colors::BRIGHT_CYAN,
                &format!(
                    "║ Version: {:<8} │ Topic: {:<12} │ Status: {:<29}║",
                    env!("CARGO_PKG_VERSION"),
                    self.topic,
                    "INITIALIZING"
                )
            )
        );
        println!("{}", self.paint(Colors::BRIGHT_CYAN, &format!("╚{rule}╝")));
        println!();
    }

    fn print_connection_status(&self, status: &str, message: &str) {
        if self.quiet_mode {
            return;
        }

        let (color, symbol) = match status {
            "CONNECTING" => (Colors::BRIGHT_YELLOW, "*"),
            "CONNECTED" => (Colors::BRIGHT_GREEN, "+"),
            "DEGRADED" => (Colors::BRIGHT_BLUE, "~"),
            "DISCONNECTED" => (Colors::BRIGHT_RED, "X"),
            "STOPPED" => (Colors::BRIGHT_MAGENTA, "!"),
            _ => (Colors::WHITE, "-"),
        };

        println!(
            "{} {} {}",
            self.paint(color, &format!("[{status}]")),
            symbol,
            message
        );
    }

    fn print_subscription_info(&self, message: &str) {
        if self.quiet_mode {
            return;
        }
        println!(
            "{} > {}",
            self.paint(Colors::BRIGHT_MAGENTA, "[SUBSCRIBED]"),
            self.paint(Colors::DIM, message)
        );
    }

    fn print_error(&self, error_type: &str, message: &str) {
        println!(
            "{} ! {}",
            self.paint(Colors::BRIGHT_RED, &format!("[{error_type}]")),
            self.paint(Colors::RED, message)
        );
    }

    fn print_reconnect_info(&self, delay_secs: f64, attempt: u32) {
        if self.quiet_mode {
            return;
        }
        println!(
            "{} > Attempt {} in {:.1}s...",
            self.paint(Colors::BRIGHT_YELLOW, "[RECONNECTING]"),
            attempt,
            delay_secs
        );
    }
}

fn paint(colored: bool, color: &str, text: &str) -> String {
    if colored {
        format!("{}{}{}{}", Colors::BOLD, color, text, Colors::RESET)
    } else {
        text.to_string()
    }
}

/// One line per quote: symbol, price and 24h change.
pub fn render_quotes(quotes: &[CryptoQuote], currency: &str, colored: bool) -> String {
    quotes
        .iter()
        .map(|quote| {
            let change = match quote.price_change_24h {
                Some(change) => {
                    let text = format_percentage(change);
                    if colored {
                        format!("{}{}{}", Direction::of(change).color(), text, Colors::RESET)
                    } else {
                        text
                    }
                }
                None => "N/A".to_string(),
            };
            format!(
                "{:<8} {:>16}  {}",
                quote.symbol.to_ascii_uppercase(),
                format_currency(quote.price, currency),
                change
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Balance map keyed by asset; fiat entries render as money, the rest as crypto.
pub fn render_balances(data: &Value, currency: &str) -> String {
    let Some(balances) = data.get("balances").unwrap_or(data).as_object() else {
        return String::new();
    };

    let mut lines: Vec<String> = balances
        .iter()
        .filter_map(|(asset, amount)| {
            let amount = number(amount)?;
            let rendered = if currency_symbol(asset).is_some() || asset.eq_ignore_ascii_case(currency)
            {
                format_currency(amount, asset)
            } else {
                format_crypto_amount(amount, asset, true)
            };
            Some(format!("{:<8} {}", asset.to_ascii_uppercase(), rendered))
        })
        .collect();
    lines.sort();
    lines.join("\n")
}

/// Total value line followed by one line per holding.
pub fn render_portfolio(data: &Value, currency: &str) -> String {
    let portfolio = data.get("portfolio").unwrap_or(data);
    let mut lines = Vec::new();

    if let Some(total) = portfolio.get("total_value").and_then(number) {
        lines.push(format!("Total    {}", format_currency(total, currency)));
    }

    for holding in portfolio
        .get("holdings")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let Some(symbol) = holding.get("symbol").and_then(Value::as_str) else {
            continue;
        };
        let quantity = holding
            .get("quantity")
            .or_else(|| holding.get("amount"))
            .and_then(number)
            .unwrap_or(0.0);
        let mut line = format!(
            "{:<8} {}",
            symbol.to_ascii_uppercase(),
            format_crypto_amount(quantity, symbol, true)
        );
        if let Some(value) = holding.get("value").and_then(number) {
            line.push_str(&format!("  ({})", format_currency(value, currency)));
        }
        lines.push(line);
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_quotes_plain() {
        let quotes = vec![
            CryptoQuote {
                symbol: "btc".to_string(),
                name: Some("Bitcoin".to_string()),
                price: 64_250.5,
                price_change_24h: Some(-3.456),
            },
            CryptoQuote {
                symbol: "ETH".to_string(),
                name: None,
                price: 3_100.0,
                price_change_24h: None,
            },
        ];

        let out = render_quotes(&quotes, "USD", false);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("BTC"));
        assert!(lines[0].contains("$64,250.50"));
        assert!(lines[0].contains("▼ -3.46%"));
        assert!(lines[1].ends_with("N/A"));
        assert!(!out.contains('\x1b'));
    }

    #[test]
    fn test_render_quotes_colours_change() {
        let quotes = vec![CryptoQuote {
            symbol: "SOL".to_string(),
            name: None,
            price: 150.0,
            price_change_24h: Some(1.0),
        }];
        assert!(render_quotes(&quotes, "USD", true).contains(Colors::BRIGHT_GREEN));
    }

    #[test]
    fn test_render_balances_mixes_fiat_and_crypto() {
        let out = render_balances(&json!({"balances": {"USD": 1500.5, "BTC": "0.25"}}), "USD");
        assert_eq!(out, "BTC      0.25 BTC\nUSD      $1,500.50");
    }

    #[test]
    fn test_render_portfolio() {
        let data = json!({
            "portfolio": {
                "total_value": 12000,
                "holdings": [
                    {"symbol": "eth", "quantity": 2.5, "value": 7750},
                    {"name": "missing symbol"}
                ]
            }
        });
        let out = render_portfolio(&data, "USD");
        assert_eq!(out, "Total    $12,000.00\nETH      2.5 ETH  ($7,750.00)");
    }
}
