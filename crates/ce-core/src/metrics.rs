//! Metrics sink and the Prometheus scrape endpoint.
//!
//! Connection handlers write into a [`MetricsSink`] handed to them at
//! construction; nothing reaches for a global registry. The production sink
//! is [`ExporterMetrics`], served over HTTP by [`MetricsServer`].
//!
//! ## Metrics
//!
//! **Gauges:**
//! - `clamscan_files{code,virus,path,sha256sum}`: files per result code for
//!   the latest run, and `1` per infection (`code="FOUND"`)
//! - `clamscan_exporter_build_info`: version
//!
//! **Counters:**
//! - `clamscan_connections_total`: scan runs accepted
//! - `clamscan_lines_total{kind}`: lines by classification
//! - `clamscan_read_errors_total`: runs cut short by a read error
//! - `clamscan_fingerprint_errors_total`: digests that could not be computed
//!
//! **Histograms:**
//! - `clamscan_duration_seconds`: wall-clock duration of a scan run

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::handler::RunReport;

/// Code label used for infection series.
pub const FOUND_CODE: &str = "FOUND";

/// Label values of one `clamscan_files` series.
///
/// Result-code series leave `virus`, `path` and `sha256sum` empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLabels<'a> {
    pub code: &'a str,
    pub virus: &'a str,
    pub path: &'a str,
    pub sha256sum: &'a str,
}

impl<'a> FileLabels<'a> {
    pub fn result(code: &'a str) -> Self {
        Self {
            code,
            virus: "",
            path: "",
            sha256sum: "",
        }
    }

    pub fn found(virus: &'a str, path: &'a str, sha256sum: &'a str) -> Self {
        Self {
            code: FOUND_CODE,
            virus,
            path,
            sha256sum,
        }
    }

    fn values(&self) -> [&'a str; 4] {
        [self.code, self.virus, self.path, self.sha256sum]
    }
}

/// Thread-safe labeled store the connection handlers publish into.
///
/// `set_files` has last-write-wins semantics per label combination and
/// nothing is ever deleted.
pub trait MetricsSink: Send + Sync {
    fn set_files(&self, labels: &FileLabels<'_>, value: f64);

    fn observe_run_duration(&self, seconds: f64);

    fn record_connection(&self) {}

    /// Called once per connection, after publication.
    fn record_run(&self, _report: &RunReport) {}
}

/// Prometheus registry holding every exporter metric.
///
/// All metric updates are thread-safe via atomic operations in the prometheus crate.
#[derive(Clone)]
pub struct ExporterMetrics {
    pub registry: Registry,

    pub files: GaugeVec,
    pub duration_seconds: Histogram,
    pub connections_total: IntCounter,
    pub lines_total: IntCounterVec,
    pub read_errors_total: IntCounter,
    pub fingerprint_errors_total: IntCounter,
}

impl ExporterMetrics {
    /// Create a new metrics collection and register all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let files = GaugeVec::new(
            Opts::new("clamscan_files", "The number of scanned files"),
            &["code", "virus", "path", "sha256sum"],
        )?;
        registry.register(Box::new(files.clone()))?;

        let duration_seconds = Histogram::with_opts(
            HistogramOpts::new("clamscan_duration_seconds", "duration of clamscan").buckets(vec![
                1.0, 10.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0, 14400.0,
            ]),
        )?;
        registry.register(Box::new(duration_seconds.clone()))?;

        let connections_total = IntCounter::new(
            "clamscan_connections_total",
            "Scan runs received over TCP",
        )?;
        registry.register(Box::new(connections_total.clone()))?;

        let lines_total = IntCounterVec::new(
            Opts::new("clamscan_lines_total", "Lines received by classification"),
            &["kind"],
        )?;
        registry.register(Box::new(lines_total.clone()))?;

        let read_errors_total = IntCounter::new(
            "clamscan_read_errors_total",
            "Scan runs ended by a read error instead of EOF",
        )?;
        registry.register(Box::new(read_errors_total.clone()))?;

        let fingerprint_errors_total = IntCounter::new(
            "clamscan_fingerprint_errors_total",
            "Infected files whose digest could not be computed",
        )?;
        registry.register(Box::new(fingerprint_errors_total.clone()))?;

        let build_info = IntGauge::with_opts(
            Opts::new("clamscan_exporter_build_info", "Build information")
                .const_label("version", env!("CARGO_PKG_VERSION")),
        )?;
        build_info.set(1);
        registry.register(Box::new(build_info))?;

        Ok(Self {
            registry,
            files,
            duration_seconds,
            connections_total,
            lines_total,
            read_errors_total,
            fingerprint_errors_total,
        })
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl MetricsSink for ExporterMetrics {
    fn set_files(&self, labels: &FileLabels<'_>, value: f64) {
        self.files.with_label_values(&labels.values()).set(value);
    }

    fn observe_run_duration(&self, seconds: f64) {
        self.duration_seconds.observe(seconds);
    }

    fn record_connection(&self) {
        self.connections_total.inc();
    }

    fn record_run(&self, report: &RunReport) {
        for (kind, count) in &report.lines {
            self.lines_total.with_label_values(&[kind]).inc_by(*count);
        }
        if report.read_error.is_some() {
            self.read_errors_total.inc();
        }
        self.fingerprint_errors_total
            .inc_by(report.published.fingerprint_failures as u64);
    }
}

/// Errors starting the scrape endpoint.
#[derive(Debug, Error)]
pub enum MetricsServerError {
    #[error("invalid metrics bind address {addr}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("failed to start metrics server on {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("failed to spawn metrics thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl From<MetricsServerError> for ce_common::Error {
    fn from(err: MetricsServerError) -> Self {
        match err {
            MetricsServerError::Spawn(source) => ce_common::Error::Io(source),
            other => ce_common::Error::MetricsEndpoint(other.to_string()),
        }
    }
}

/// Handle to the running metrics HTTP server.
pub struct MetricsServer {
    shutdown: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
    addr: SocketAddr,
}

impl MetricsServer {
    /// Start the metrics HTTP server on a background thread.
    ///
    /// `addr` may use port 0; [`addr`](Self::addr) reports the bound port.
    pub fn start(
        addr: &str,
        path: &str,
        metrics: ExporterMetrics,
    ) -> Result<Self, MetricsServerError> {
        let invalid = |reason: String| MetricsServerError::InvalidAddress {
            addr: addr.to_string(),
            reason,
        };
        let requested: SocketAddr = addr
            .to_socket_addrs()
            .map_err(|e| invalid(e.to_string()))?
            .next()
            .ok_or_else(|| invalid("resolved to no addresses".to_string()))?;

        let server = tiny_http::Server::http(requested).map_err(|e| MetricsServerError::Bind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
        let bound = server.server_addr().to_ip().unwrap_or(requested);

        info!(addr = %bound, path = %path, "metrics server started");

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let path = path.to_string();

        let thread = thread::Builder::new()
            .name("ce-metrics".to_string())
            .spawn(move || {
                serve_loop(server, &metrics, &shutdown_clone, &path);
            })
            .map_err(MetricsServerError::Spawn)?;

        Ok(Self {
            shutdown,
            thread: Some(thread),
            addr: bound,
        })
    }

    /// Get the bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shut down the metrics server.
    pub fn shutdown(mut self) {
        self.stop();
        info!("metrics server stopped");
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.shutdown.store(true, Ordering::SeqCst);
        // Wake the accept loop.
        let _ = std::net::TcpStream::connect(self.addr);
        let _ = thread.join();
    }
}

impl Drop for MetricsServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn text_content_type() -> Option<tiny_http::Header> {
    tiny_http::Header::from_bytes(
        &b"Content-Type"[..],
        &b"text/plain; version=0.0.4; charset=utf-8"[..],
    )
    .ok()
}

/// Accept requests, serve the metrics path and health checks, reject everything else.
/// Request path without its query string.
fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(path, _)| path)
}

fn serve_loop(
    server: tiny_http::Server,
    metrics: &ExporterMetrics,
    shutdown: &AtomicBool,
    path: &str,
) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let request = match server.recv_timeout(Duration::from_secs(1)) {
            Ok(Some(req)) => req,
            Ok(None) => continue,
            Err(e) => {
                if !shutdown.load(Ordering::SeqCst) {
                    error!(error = %e, "metrics server accept error");
                }
                break;
            }
        };

        if shutdown.load(Ordering::SeqCst) {
            let _ = request
                .respond(tiny_http::Response::from_string("shutting down").with_status_code(503));
            break;
        }

        let url = request.url().to_string();
        debug!(method = %request.method(), url = %url, "metrics scrape");
        let route = strip_query(&url);

        if route == path || route.strip_suffix('/') == Some(path) {
            match metrics.render() {
                Ok(body) => {
                    let mut response = tiny_http::Response::from_string(body);
                    if let Some(header) = text_content_type() {
                        response = response.with_header(header);
                    }
                    if let Err(e) = request.respond(response) {
                        warn!(error = %e, "failed to send metrics response");
                    }
                }
                Err(e) => {
                    error!(error = %e, "failed to render metrics");
                    let _ = request.respond(
                        tiny_http::Response::from_string(format!("error: {}", e))
                            .with_status_code(500),
                    );
                }
            }
        } else if route == "/health" || route == "/healthz" {
            let _ = request.respond(tiny_http::Response::from_string("ok"));
        } else {
            let _ = request
                .respond(tiny_http::Response::from_string("not found").with_status_code(404));
        }
    }
}
