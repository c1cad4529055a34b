//! Error types for the clamscan exporter.
//!
//! Process-level failures carry:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Remediation hints for operators
//!
//! Per-connection failures (read errors, fingerprint errors) never surface
//! here; they stay inside the connection that produced them and are only
//! logged.
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Listener Bind Failed
//!   Reason: cannot bind scan listener on 0.0.0.0:9000: Address in use
//!   Fix: Pick a free port with --tcp-port, or stop the process holding it.
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for exporter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file or flag errors.
    Config,
    /// Socket setup errors (scan listener, metrics endpoint).
    Network,
    /// Metric registration and rendering errors.
    Metrics,
    /// File I/O errors.
    Io,
    /// Signal handling and other platform errors.
    Platform,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Metrics => write!(f, "metrics"),
            ErrorCategory::Io => write!(f, "io"),
            ErrorCategory::Platform => write!(f, "platform"),
        }
    }
}

/// Unified process-level error type.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error(transparent)]
    Config(#[from] ConfigError),

    // Network errors (20-29)
    #[error("cannot bind {what} on {addr}: {source}")]
    Bind {
        what: &'static str,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("metrics endpoint failed: {0}")]
    MetricsEndpoint(String),

    // Metrics errors (30-39)
    #[error("metric registration failed: {0}")]
    MetricsRegistry(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Platform errors (70-79)
    #[error("signal handler installation failed: {0}")]
    SignalHandler(String),
}

impl Error {
    /// Returns the stable error code for this error type.
    ///
    /// - 10-19: Configuration errors
    /// - 20-29: Network errors
    /// - 30-39: Metrics errors
    /// - 60-69: I/O errors
    /// - 70-79: Platform errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::Bind { .. } => 20,
            Error::MetricsEndpoint(_) => 21,
            Error::MetricsRegistry(_) => 30,
            Error::Io(_) => 60,
            Error::SignalHandler(_) => 70,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) => ErrorCategory::Config,
            Error::Bind { .. } | Error::MetricsEndpoint(_) => ErrorCategory::Network,
            Error::MetricsRegistry(_) => ErrorCategory::Metrics,
            Error::Io(_) => ErrorCategory::Io,
            Error::SignalHandler(_) => ErrorCategory::Platform,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Check the config file syntax and key names, or run without --config to use defaults."
            }
            Error::Bind { .. } => {
                "Pick a free port with --tcp-port/--http-port, or stop the process holding it."
            }
            Error::MetricsEndpoint(_) => {
                "Check --http-bind and --http-port; the metrics endpoint must be able to listen."
            }
            Error::MetricsRegistry(_) => "Internal error while registering metrics. Please report it.",
            Error::Io(_) => "Check file permissions and that referenced paths exist.",
            Error::SignalHandler(_) => {
                "Another component already installed a signal handler; run the exporter standalone."
            }
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::Bind { .. } => "Listener Bind Failed",
            Error::MetricsEndpoint(_) => "Metrics Endpoint Failed",
            Error::MetricsRegistry(_) => "Metrics Registry Error",
            Error::Io(_) => "I/O Error",
            Error::SignalHandler(_) => "Signal Handler Error",
        }
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn bind_error() -> Error {
        Error::Bind {
            what: "scan listener",
            addr: "0.0.0.0:9000".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "Address in use"),
        }
    }

    #[test]
    fn test_error_code() {
        assert_eq!(bind_error().code(), 20);
        assert_eq!(Error::MetricsEndpoint("x".into()).code(), 21);
        assert_eq!(Error::MetricsRegistry("dup".into()).code(), 30);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(bind_error().category(), ErrorCategory::Network);
        assert_eq!(
            Error::Config(ConfigError::NotFound {
                path: PathBuf::from("/nope.toml")
            })
            .category(),
            ErrorCategory::Config
        );
        assert_eq!(
            Error::SignalHandler("busy".into()).category(),
            ErrorCategory::Platform
        );
    }

    #[test]
    fn test_bind_error_message_names_address() {
        let msg = bind_error().to_string();
        assert!(msg.contains("scan listener"));
        assert!(msg.contains("0.0.0.0:9000"));
    }

    #[test]
    fn test_format_error_human() {
        let formatted = format_error_human(&bind_error(), false);
        assert!(formatted.contains("Listener Bind Failed"));
        assert!(formatted.contains("Reason: cannot bind scan listener"));
        assert!(formatted.contains("--tcp-port"));
        assert!(!formatted.contains("\x1b["));
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Config.to_string(), "config");
        assert_eq!(ErrorCategory::Network.to_string(), "network");
    }
}
