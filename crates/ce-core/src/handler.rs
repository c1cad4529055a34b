//! Per-connection driving loop.
//!
//! A handler owns one scan run from the first byte to publication:
//!
//! ```text
//! Reading ──EOF / read error──▶ Draining ──▶ Published
//! ```
//!
//! Reading classifies and aggregates line by line. Draining records the run
//! duration. Published writes one `clamscan_files` series per distinct code
//! and one per infection, then hands the [`RunReport`] to the sink. A read
//! error ends Reading early; whatever was aggregated so far is still
//! published.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info};

use crate::aggregate::{RunAggregate, RunSnapshot};
use crate::classify::classify;
use crate::fingerprint::Fingerprinter;
use crate::metrics::{FileLabels, MetricsSink};

/// Lifecycle of a connection handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Reading,
    Draining,
    Published,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Reading => write!(f, "reading"),
            RunPhase::Draining => write!(f, "draining"),
            RunPhase::Published => write!(f, "published"),
        }
    }
}

/// What publication wrote to the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishSummary {
    pub codes: usize,
    pub infections: usize,
    pub fingerprint_failures: usize,
}

/// Outcome of one scan run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub conn_id: u64,
    pub phase: RunPhase,
    /// Lines read, by classification kind.
    pub lines: HashMap<&'static str, u64>,
    /// Set when Reading ended on an error rather than EOF.
    pub read_error: Option<String>,
    pub duration: Duration,
    pub published: PublishSummary,
}

impl RunReport {
    pub fn total_lines(&self) -> u64 {
        self.lines.values().sum()
    }
}

/// Drives a single connection.
pub struct ConnectionHandler {
    conn_id: u64,
    sink: Arc<dyn MetricsSink>,
    fingerprinter: Option<Arc<dyn Fingerprinter>>,
    phase: RunPhase,
}

impl ConnectionHandler {
    /// `fingerprinter = None` publishes infections with an empty digest.
    pub fn new(
        conn_id: u64,
        sink: Arc<dyn MetricsSink>,
        fingerprinter: Option<Arc<dyn Fingerprinter>>,
    ) -> Self {
        Self {
            conn_id,
            sink,
            fingerprinter,
            phase: RunPhase::Reading,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!(conn_id = self.conn_id, from = %self.phase, to = %phase, "run phase change");
        self.phase = phase;
    }

    /// Consume the stream until it ends, then publish the run.
    pub fn run<R: Read>(mut self, reader: R) -> RunReport {
        let started = Instant::now();
        self.sink.record_connection();

        let mut aggregate = RunAggregate::new();
        let mut lines: HashMap<&'static str, u64> = HashMap::new();
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        let read_error = loop {
            match read_line(&mut reader, &mut buf) {
                Ok(Some(line)) => {
                    let classification = classify(&line);
                    *lines.entry(classification.kind()).or_insert(0) += 1;
                    aggregate.observe(classification);
                }
                Ok(None) => break None,
                Err(e) => {
                    error!(conn_id = self.conn_id, error = %e, "reading scan output failed");
                    break Some(e.to_string());
                }
            }
        };

        self.enter(RunPhase::Draining);
        let duration = started.elapsed();
        self.sink.observe_run_duration(duration.as_secs_f64());

        let snapshot = aggregate.snapshot();
        let published = publish(
            &snapshot,
            self.sink.as_ref(),
            self.fingerprinter.as_deref(),
        );
        self.enter(RunPhase::Published);

        info!(
            conn_id = self.conn_id,
            duration_ms = duration.as_millis() as u64,
            codes = published.codes,
            infections = published.infections,
            partial = read_error.is_some(),
            "scan run published"
        );

        let report = RunReport {
            conn_id: self.conn_id,
            phase: self.phase,
            lines,
            read_error,
            duration,
            published,
        };
        self.sink.record_run(&report);
        report
    }
}

/// Read one line, without its `\n` / `\r\n` terminator.
///
/// Returns `Ok(None)` at end of stream. Invalid UTF-8 is replaced rather
/// than rejected.
fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Write a finished run into the sink.
///
/// Digest failures are logged and published with an empty `sha256sum`; they
/// never stop the remaining infections from being published.
pub fn publish(
    snapshot: &RunSnapshot,
    sink: &dyn MetricsSink,
    fingerprinter: Option<&dyn Fingerprinter>,
) -> PublishSummary {
    let mut summary = PublishSummary::default();

    for (code, count) in &snapshot.counts {
        sink.set_files(&FileLabels::result(code), *count as f64);
        summary.codes += 1;
    }

    for (virus, path) in &snapshot.infections {
        let digest = match fingerprinter {
            Some(fp) => match fp.fingerprint(Path::new(path)) {
                Ok(digest) => digest,
                Err(e) => {
                    error!(virus = %virus, error = %e, "publishing infection without digest");
                    summary.fingerprint_failures += 1;
                    String::new()
                }
            },
            None => String::new(),
        };
        sink.set_files(&FileLabels::found(virus, path, &digest), 1.0);
        summary.infections += 1;
    }

    summary
}
