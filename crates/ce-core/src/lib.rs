//! clamscan exporter library
//!
//! Turns clamscan output streamed over TCP into Prometheus metrics:
//! - Line classification and per-run aggregation
//! - SHA-256 fingerprints of infected files
//! - Per-connection handlers and the TCP listener
//! - The metrics sink and its scrape endpoint
//! - Logging setup and exit codes
//!
//! The binary entry point is in `main.rs`.

pub mod aggregate;
pub mod classify;
pub mod exit_codes;
pub mod fingerprint;
pub mod handler;
pub mod listener;
pub mod logging;
pub mod metrics;

// Test utilities for integration tests and fuzz targets
#[cfg(any(test, feature = "test-utils"))]
pub mod memory_sink;

pub use aggregate::{RunAggregate, RunSnapshot};
pub use classify::{classify, Classification};
pub use fingerprint::{FingerprintError, Fingerprinter, Sha256Fingerprinter};
pub use handler::{ConnectionHandler, RunPhase, RunReport};
pub use listener::{HandlerContext, ListenerError, ScanListener, ShutdownReport};
pub use metrics::{ExporterMetrics, FileLabels, MetricsServer, MetricsSink};

#[cfg(any(test, feature = "test-utils"))]
pub use memory_sink::MemorySink;
