//! Exporter configuration.
//!
//! Resolution order is CLI flag > environment variable > config file >
//! built-in default. Flags and environment variables are folded together by
//! the CLI layer and arrive here as a [`ConfigOverrides`]; this module owns
//! the file format and the defaults.
//!
//! ```toml
//! fingerprint = true
//! shutdown_grace_secs = 10
//!
//! [listen]
//! bind = "0.0.0.0"
//! tcp_port = 9000
//!
//! [metrics]
//! bind = "0.0.0.0"
//! port = 9967
//! path = "/metrics"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default port for clamscan netcat connections.
pub const DEFAULT_TCP_PORT: u16 = 9000;

/// Default port for Prometheus scrapes.
pub const DEFAULT_HTTP_PORT: u16 = 9967;

/// Default scrape path.
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Default time in-flight connections get to finish after a shutdown signal.
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

const DEFAULT_BIND: &str = "0.0.0.0";

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Where the scan listener accepts clamscan output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListenConfig {
    /// Bind address (default: 0.0.0.0).
    pub bind: String,
    /// TCP port (default: 9000).
    pub tcp_port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            tcp_port: DEFAULT_TCP_PORT,
        }
    }
}

impl ListenConfig {
    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn addr(&self) -> String {
        join_host_port(&self.bind, self.tcp_port)
    }
}

/// Where Prometheus scrapes the exporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsEndpointConfig {
    /// Bind address (default: 0.0.0.0).
    pub bind: String,
    /// HTTP port (default: 9967).
    pub port: u16,
    /// URL path (default: /metrics).
    pub path: String,
}

impl Default for MetricsEndpointConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_HTTP_PORT,
            path: DEFAULT_METRICS_PATH.to_string(),
        }
    }
}

impl MetricsEndpointConfig {
    /// `host:port` string for the HTTP server.
    pub fn addr(&self) -> String {
        join_host_port(&self.bind, self.port)
    }
}

/// Complete exporter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExporterConfig {
    pub listen: ListenConfig,
    pub metrics: MetricsEndpointConfig,
    /// Compute SHA-256 digests of infected files.
    pub fingerprint: bool,
    /// Seconds in-flight connections get to finish on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            metrics: MetricsEndpointConfig::default(),
            fingerprint: true,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
        }
    }
}

/// Values supplied on the command line or through the environment.
///
/// `None` means "not given"; the file or default value is kept.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind: Option<String>,
    pub tcp_port: Option<u16>,
    pub http_bind: Option<String>,
    pub http_port: Option<u16>,
    pub metrics_path: Option<String>,
    pub no_fingerprint: bool,
    pub shutdown_grace_secs: Option<u64>,
}

impl ExporterConfig {
    /// Parse a config document.
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read and parse a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Layer overrides on top of this config.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(bind) = overrides.bind {
            self.listen.bind = bind;
        }
        if let Some(port) = overrides.tcp_port {
            self.listen.tcp_port = port;
        }
        if let Some(bind) = overrides.http_bind {
            self.metrics.bind = bind;
        }
        if let Some(port) = overrides.http_port {
            self.metrics.port = port;
        }
        if let Some(path) = overrides.metrics_path {
            self.metrics.path = path;
        }
        if overrides.no_fingerprint {
            self.fingerprint = false;
        }
        if let Some(secs) = overrides.shutdown_grace_secs {
            self.shutdown_grace_secs = secs;
        }
        self
    }

    /// Semantic checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.metrics.path.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "metrics.path",
                message: format!("must start with '/', got {:?}", self.metrics.path),
            });
        }
        if self.shutdown_grace_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "shutdown_grace_secs",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Bracket bare IPv6 hosts so the result parses as a socket address.
fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Resolve the effective configuration: optional file, then overrides, then validation.
pub fn load_config(
    path: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<ExporterConfig, ConfigError> {
    let base = match path {
        Some(path) => ExporterConfig::from_file(path)?,
        None => ExporterConfig::default(),
    };
    let config = base.with_overrides(overrides);
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ExporterConfig::default();
        assert_eq!(config.listen.addr(), "0.0.0.0:9000");
        assert_eq!(config.metrics.addr(), "0.0.0.0:9967");
        assert_eq!(config.metrics.path, "/metrics");
        assert!(config.fingerprint);
        assert_eq!(config.shutdown_grace(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ipv6_hosts_are_bracketed() {
        assert_eq!(join_host_port("::", 9000), "[::]:9000");
        assert_eq!(join_host_port("[::1]", 9967), "[::1]:9967");
        assert_eq!(join_host_port("localhost", 9000), "localhost:9000");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ExporterConfig::from_toml_str(
            "[listen]\ntcp_port = 9100\n",
            Path::new("inline.toml"),
        )
        .unwrap();
        assert_eq!(config.listen.tcp_port, 9100);
        assert_eq!(config.listen.bind, "0.0.0.0");
        assert_eq!(config.metrics.port, DEFAULT_HTTP_PORT);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ExporterConfig::from_toml_str("tcp_prot = 1\n", Path::new("bad.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_overrides_beat_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "fingerprint = true\n[metrics]\nport = 1234\npath = \"/scrape\""
        )
        .unwrap();

        let config = load_config(
            Some(file.path()),
            ConfigOverrides {
                http_port: Some(4321),
                no_fingerprint: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(config.metrics.port, 4321);
        assert_eq!(config.metrics.path, "/scrape");
        assert!(!config.fingerprint);
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(
            Some(Path::new("/definitely/not/here.toml")),
            ConfigOverrides::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_validation_rejects_relative_path() {
        let err = load_config(
            None,
            ConfigOverrides {
                metrics_path: Some("metrics".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "metrics.path",
                ..
            }
        ));
    }

    #[test]
    fn test_validation_rejects_zero_grace() {
        let err = load_config(
            None,
            ConfigOverrides {
                shutdown_grace_secs: Some(0),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("shutdown_grace_secs"));
    }

    #[test]
    fn test_max_grace_accepted() {
        let config = load_config(
            None,
            ConfigOverrides {
                shutdown_grace_secs: Some(u64::MAX),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(config.shutdown_grace(), Duration::from_secs(u64::MAX));
    }
}
