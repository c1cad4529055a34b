//! Structured logging for the exporter.
//!
//! Two output modes, both on stderr:
//! - Human-readable console output (ANSI colours only on a terminal)
//! - JSON lines for log shippers
//!
//! Every log line carries structured fields (`conn_id`, `addr`, `code`, ...)
//! rather than interpolated strings, so both modes stay greppable.

pub mod config;

pub use config::{LogConfig, LogFormat, LogLevel};

use std::io::IsTerminal;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

/// Crate targets the configured level applies to. Everything else stays at `warn`.
const TARGETS: &[&str] = &["ce_core", "ce_common", "clamscan_exporter"];

/// Build the filter for `config`.
///
/// An invalid `RUST_LOG` directive falls back to the configured level.
pub fn build_filter(config: &LogConfig) -> EnvFilter {
    if let Some(raw) = &config.raw_filter {
        if let Ok(filter) = EnvFilter::try_new(raw) {
            return filter;
        }
    }
    EnvFilter::new(directives(config.level))
}

fn directives(level: LogLevel) -> String {
    let mut out = String::from("warn");
    for target in TARGETS {
        out.push_str(&format!(",{target}={level}"));
    }
    out
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), TryInitError> {
    let filter = build_filter(config);

    match config.format {
        LogFormat::Human => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_names(true)
                .with_ansi(use_color());

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        LogFormat::Jsonl => {
            let json_layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .with_span_list(false)
                .with_thread_names(true);
            tracing_subscriber::registry()
                .with(filter)
                .with(json_layer)
                .try_init()
        }
    }
}

/// Whether stderr output may use ANSI colours.
pub fn use_color() -> bool {
    std::io::stderr().is_terminal()
}
