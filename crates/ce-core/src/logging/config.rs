//! Logging configuration.
//!
//! Sources, lowest precedence first:
//! - `RUST_LOG` (used verbatim unless something below sets the level)
//! - `CE_LOG`, `CE_LOG_FORMAT`
//! - CLI flags (`-v`/`-q`, `--log-format`)

use serde::{Deserialize, Serialize};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable console format (default).
    #[default]
    Human,
    /// One JSON object per line.
    Jsonl,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "console" | "pretty" => Ok(LogFormat::Human),
            "jsonl" | "json" => Ok(LogFormat::Jsonl),
            _ => Err(format!("unknown log format: {}", s)),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Human => write!(f, "human"),
            LogFormat::Jsonl => write!(f, "jsonl"),
        }
    }
}

/// Log level filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Completely silent.
    Off,
}

impl LogLevel {
    /// One step more verbose, saturating at `Trace`.
    pub fn louder(self) -> Self {
        match self {
            LogLevel::Off => LogLevel::Error,
            LogLevel::Error => LogLevel::Warn,
            LogLevel::Warn => LogLevel::Info,
            LogLevel::Info => LogLevel::Debug,
            LogLevel::Debug | LogLevel::Trace => LogLevel::Trace,
        }
    }

    /// One step quieter, saturating at `Off`.
    pub fn quieter(self) -> Self {
        match self {
            LogLevel::Trace => LogLevel::Debug,
            LogLevel::Debug => LogLevel::Info,
            LogLevel::Info => LogLevel::Warn,
            LogLevel::Warn => LogLevel::Error,
            LogLevel::Error | LogLevel::Off => LogLevel::Off,
        }
    }

    /// Apply `-v`/`-q` counts to a base level.
    pub fn adjusted(self, verbose: u8, quiet: u8) -> Self {
        let mut level = self;
        for _ in 0..verbose {
            level = level.louder();
        }
        for _ in 0..quiet {
            level = level.quieter();
        }
        level
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" | "none" | "quiet" => Ok(LogLevel::Off),
            _ => Err(format!("unknown log level: {}", s)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Off => write!(f, "off"),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// `RUST_LOG` directive to install verbatim. Cleared when `CE_LOG` or
    /// `-v`/`-q` pick the level.
    pub raw_filter: Option<String>,
}

impl LogConfig {
    /// Create config from the process environment and CLI flags.
    pub fn from_env(verbose: u8, quiet: u8, cli_format: Option<LogFormat>) -> Self {
        Self::from_lookup(verbose, quiet, cli_format, |key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(
        verbose: u8,
        quiet: u8,
        cli_format: Option<LogFormat>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut config = LogConfig::default();

        if let Some(level) = lookup("CE_LOG").and_then(|v| v.parse::<LogLevel>().ok()) {
            config.level = level;
        } else if let Some(val) = lookup("RUST_LOG").filter(|v| !v.trim().is_empty()) {
            if val.contains("trace") {
                config.level = LogLevel::Trace;
            } else if val.contains("debug") {
                config.level = LogLevel::Debug;
            } else if val.contains("warn") {
                config.level = LogLevel::Warn;
            } else if val.contains("error") {
                config.level = LogLevel::Error;
            }
            config.raw_filter = Some(val);
        }

        if let Some(format) = lookup("CE_LOG_FORMAT").and_then(|v| v.parse::<LogFormat>().ok()) {
            config.format = format;
        }

        if verbose > 0 || quiet > 0 {
            config.level = config.level.adjusted(verbose, quiet);
            config.raw_filter = None;
        }
        if let Some(format) = cli_format {
            config.format = format;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("human".parse::<LogFormat>().unwrap(), LogFormat::Human);
        assert_eq!("jsonl".parse::<LogFormat>().unwrap(), LogFormat::Jsonl);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Jsonl);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("quiet".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_verbosity_adjustment() {
        assert_eq!(LogLevel::Info.adjusted(1, 0), LogLevel::Debug);
        assert_eq!(LogLevel::Info.adjusted(5, 0), LogLevel::Trace);
        assert_eq!(LogLevel::Info.adjusted(0, 2), LogLevel::Error);
        assert_eq!(LogLevel::Info.adjusted(0, 9), LogLevel::Off);
        assert_eq!(LogLevel::Info.adjusted(1, 1), LogLevel::Info);
    }

    #[test]
    fn test_defaults_without_env() {
        let config = LogConfig::from_lookup(0, 0, None, env(&[]));
        assert_eq!(config, LogConfig::default());
        assert_eq!(config.raw_filter, None);
    }

    #[test]
    fn test_ce_log_beats_rust_log() {
        let config = LogConfig::from_lookup(
            0,
            0,
            None,
            env(&[("CE_LOG", "warn"), ("RUST_LOG", "ce_core=trace")]),
        );
        assert_eq!(config.level, LogLevel::Warn);
        assert_eq!(config.raw_filter, None);

        let config = LogConfig::from_lookup(0, 0, None, env(&[("RUST_LOG", "ce_core=debug")]));
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.raw_filter.as_deref(), Some("ce_core=debug"));
    }

    #[test]
    fn test_cli_overrides_env() {
        let config = LogConfig::from_lookup(
            0,
            3,
            Some(LogFormat::Human),
            env(&[("CE_LOG", "trace"), ("CE_LOG_FORMAT", "jsonl")]),
        );
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Human);
    }

    #[test]
    fn test_quiet_flag_beats_rust_log() {
        let config = LogConfig::from_lookup(0, 2, None, env(&[("RUST_LOG", "debug")]));
        assert_eq!(config.level, LogLevel::Warn);
        assert_eq!(config.raw_filter, None);

        let config = LogConfig::from_lookup(1, 0, None, env(&[("RUST_LOG", "warn")]));
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.raw_filter, None);
    }

    #[test]
    fn test_env_format() {
        let config = LogConfig::from_lookup(0, 0, None, env(&[("CE_LOG_FORMAT", "json")]));
        assert_eq!(config.format, LogFormat::Jsonl);
    }
}
