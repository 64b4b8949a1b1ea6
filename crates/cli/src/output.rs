//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use expander_lib::Quantity;
use serde::Serialize;
use std::time::Duration;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No claims found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => print_json(&items),
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    if let Ok(json) = serde_json::to_string_pretty(value) {
        println!("{}", json);
    }
}

#[derive(Clone, Copy)]
enum Level {
    Success,
    Warning,
    Info,
}

fn status_line(level: Level, message: &str) {
    let marker = match level {
        Level::Success => "✓".green(),
        Level::Warning => "⚠".yellow(),
        Level::Info => "ℹ".blue(),
    };
    println!("{} {}", marker.bold(), message);
}

pub fn print_success(message: &str) {
    status_line(Level::Success, message);
}

pub fn print_warning(message: &str) {
    status_line(Level::Warning, message);
}

pub fn print_info(message: &str) {
    status_line(Level::Info, message);
}

/// Errors go to stderr
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a `label: value` line
pub fn print_field(label: &str, value: &str) {
    println!("  {:<14} {}", format!("{}:", label).bold(), value);
}

/// Binary units, largest first
const BYTE_UNITS: [(&str, i64); 4] = [
    ("Ti", 1 << 40),
    ("Gi", 1 << 30),
    ("Mi", 1 << 20),
    ("Ki", 1 << 10),
];

/// Bytes in the largest binary unit that fits
pub fn format_bytes(bytes: i64) -> String {
    BYTE_UNITS
        .iter()
        .find(|(_, size)| bytes >= *size)
        .map(|(unit, size)| format!("{:.2}{}", bytes as f64 / *size as f64, unit))
        .unwrap_or_else(|| format!("{}B", bytes))
}

/// Format a duration the way annotations spell it (`90s` → `1m30s`)
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    if total == 0 {
        return format!("{}ms", duration.as_millis());
    }

    let (hours, minutes, seconds) = (total / 3600, total / 60 % 60, total % 60);
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if seconds > 0 {
        out.push_str(&format!("{}s", seconds));
    }
    out
}

/// Format a ceiling; the maximum quantity means no ceiling
pub fn format_ceiling(ceiling: &Quantity) -> String {
    if *ceiling == Quantity::max() {
        "unbounded".to_string()
    } else {
        ceiling.to_string()
    }
}

/// Color a usage percentage against its threshold
pub fn color_usage(percent: f64, threshold: u32) -> String {
    let formatted = format!("{:.1}%", percent);
    if percent > f64::from(threshold) {
        formatted.red().to_string()
    } else if percent > f64::from(threshold) * 0.8 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}
