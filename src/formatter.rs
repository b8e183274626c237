use chrono::{DateTime, TimeZone, Utc};
use std::fmt::Display;

// ANSI color codes
pub struct Colors;

impl Colors {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BOLD: &'static str = "\x1b[1m";
    pub const DIM: &'static str = "\x1b[2m";

    pub const RED: &'static str = "\x1b[31m";
    pub const GREEN: &'static str = "\x1b[32m";
    pub const YELLOW: &'static str = "\x1b[33m";
    pub const WHITE: &'static str = "\x1b[37m";
    pub const GRAY: &'static str = "\x1b[90m";

    pub const BRIGHT_RED: &'static str = "\x1b[91m";
    pub const BRIGHT_GREEN: &'static str = "\x1b[92m";
    pub const BRIGHT_YELLOW: &'static str = "\x1b[93m";
    pub const BRIGHT_BLUE: &'static str = "\x1b[94m";
    pub const BRIGHT_MAGENTA: &'static str = "\x1b[95m";
    pub const BRIGHT_CYAN: &'static str = "\x1b[96m";
}

/// Digit grouping and decimal mark for rendered numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberLocale {
    pub group_separator: char,
    pub decimal_separator: char,
}

impl NumberLocale {
    pub const EN_US: NumberLocale = NumberLocale {
        group_separator: ',',
        decimal_separator: '.',
    };
    pub const DE_DE: NumberLocale = NumberLocale {
        group_separator: '.',
        decimal_separator: ',',
    };
    pub const FR_FR: NumberLocale = NumberLocale {
        group_separator: '\u{202f}',
        decimal_separator: ',',
    };
}

impl Default for NumberLocale {
    fn default() -> Self {
        Self::EN_US
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    pub fn of(value: f64) -> Self {
        let rounded = (value * 100.0).round();
        if rounded > 0.0 {
            Direction::Up
        } else if rounded < 0.0 {
            Direction::Down
        } else {
            Direction::Flat
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Direction::Up => "▲",
            Direction::Down => "▼",
            Direction::Flat => "•",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Direction::Up => Colors::BRIGHT_GREEN,
            Direction::Down => Colors::BRIGHT_RED,
            Direction::Flat => Colors::GRAY,
        }
    }
}

pub fn currency_symbol(code: &str) -> Option<&'static str> {
    match code.to_ascii_uppercase().as_str() {
        "USD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        "JPY" => Some("¥"),
        "INR" => Some("₹"),
        "NGN" => Some("₦"),
        "KRW" => Some("₩"),
        _ => None,
    }
}

fn group_digits(digits: &str, separator: char) -> String {
    let len = digits.chars().count();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}

/// Formats `|value|` with `decimals` places and grouping; the flag says whether
/// a minus sign is warranted (values that round to zero never get one).
fn unsigned_fixed(value: f64, decimals: usize, locale: &NumberLocale) -> (bool, String) {
    let raw = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match raw.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (raw.as_str(), None),
    };

    let mut body = group_digits(int_part, locale.group_separator);
    if let Some(frac) = frac_part {
        body.push(locale.decimal_separator);
        body.push_str(frac);
    }

    let negative = value < 0.0 && raw.chars().any(|c| c.is_ascii_digit() && c != '0');
    (negative, body)
}

pub fn format_number(value: f64, decimals: usize, locale: &NumberLocale) -> String {
    if !value.is_finite() {
        return "N/A".to_string();
    }
    let (negative, body) = unsigned_fixed(value, decimals, locale);
    if negative { format!("-{body}") } else { body }
}

/// `format_currency(1234.5, "USD")` → `"$1,234.50"`.
pub fn format_currency(amount: f64, currency: &str) -> String {
    format_currency_with(amount, currency, &NumberLocale::EN_US)
}

pub fn format_currency_with(amount: f64, currency: &str, locale: &NumberLocale) -> String {
    if !amount.is_finite() {
        return "N/A".to_string();
    }
    let (negative, body) = unsigned_fixed(amount, 2, locale);
    let sign = if negative { "-" } else { "" };

    match currency_symbol(currency) {
        Some(symbol) => format!("{sign}{symbol}{body}"),
        None => format!("{sign}{} {body}", currency.to_ascii_uppercase()),
    }
}

/// Crypto quantities carry up to 8 decimals; `trim_zeros` drops insignificant ones.
pub fn format_crypto(quantity: f64, trim_zeros: bool) -> String {
    if !quantity.is_finite() {
        return "N/A".to_string();
    }
    let formatted = format_number(quantity, 8, &NumberLocale::EN_US);
    if !trim_zeros {
        return formatted;
    }
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

pub fn format_crypto_amount(quantity: f64, symbol: &str, trim_zeros: bool) -> String {
    format!(
        "{} {}",
        format_crypto(quantity, trim_zeros),
        symbol.to_ascii_uppercase()
    )
}

/// Signed percentage with a direction marker, e.g. `"▼ -3.46%"`.
pub fn format_percentage(value: f64) -> String {
    if !value.is_finite() {
        return "N/A".to_string();
    }
    let direction = Direction::of(value);
    let (_, body) = unsigned_fixed(value, 2, &NumberLocale::EN_US);
    let sign = match direction {
        Direction::Up => "+",
        Direction::Down => "-",
        Direction::Flat => "",
    };
    format!("{} {sign}{body}%", direction.marker())
}

/// Large figures such as volume or market cap: `1.2K`, `3.4M`, `5.6B`.
pub fn format_compact(value: f64) -> String {
    if !value.is_finite() {
        return "N/A".to_string();
    }
    let abs = value.abs();
    let sign = if value < 0.0 { "-" } else { "" };
    match abs {
        a if a >= 1e12 => format!("{sign}{:.1}T", a / 1e12),
        a if a >= 1e9 => format!("{sign}{:.1}B", a / 1e9),
        a if a >= 1e6 => format!("{sign}{:.1}M", a / 1e6),
        a if a >= 1e3 => format!("{sign}{:.1}K", a / 1e3),
        _ => format_number(value, 2, &NumberLocale::EN_US),
    }
}

pub fn format_date<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    dt.format("%b %-d, %Y %H:%M").to_string()
}

pub fn format_time<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    dt.format("%H:%M:%S").to_string()
}

/// Human distance between `dt` and `now`; older than a week falls back to the absolute date.
pub fn format_relative(dt: &DateTime<Utc>, now: &DateTime<Utc>) -> String {
    let delta = now.signed_duration_since(*dt);
    let future = delta < chrono::Duration::zero();
    let secs = delta.num_seconds().unsigned_abs();

    if secs < 45 {
        return "just now".to_string();
    }

    let (value, unit) = match secs {
        s if s < 3_600 => ((s / 60).max(1), "minute"),
        s if s < 86_400 => ((s / 3_600).max(1), "hour"),
        s if s < 7 * 86_400 => ((s / 86_400).max(1), "day"),
        _ => return format_date(dt),
    };

    if value == 1 && unit == "day" {
        return if future { "tomorrow" } else { "yesterday" }.to_string();
    }

    let plural = if value == 1 { "" } else { "s" };
    if future {
        format!("in {value} {unit}{plural}")
    } else {
        format!("{value} {unit}{plural} ago")
    }
}
