//! In-memory [`MetricsSink`] for tests.
//!
//! Keeps every write and every finished [`RunReport`] so tests can assert on
//! what a run published without scraping Prometheus text. Only compiled for
//! unit tests and with the `test-utils` feature.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::handler::RunReport;
use crate::metrics::{FileLabels, MetricsSink};

/// Owned label values, the key of [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileSeries {
    pub code: String,
    pub virus: String,
    pub path: String,
    pub sha256sum: String,
}

impl From<&FileLabels<'_>> for FileSeries {
    fn from(labels: &FileLabels<'_>) -> Self {
        Self {
            code: labels.code.to_string(),
            virus: labels.virus.to_string(),
            path: labels.path.to_string(),
            sha256sum: labels.sha256sum.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    files: HashMap<FileSeries, f64>,
    set_calls: u64,
    durations: Vec<f64>,
    connections: u64,
    runs: Vec<RunReport>,
}

/// In-process sink that keeps every write for inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Current value of one series.
    pub fn value(&self, labels: &FileLabels<'_>) -> Option<f64> {
        self.with_state(|s| s.files.get(&FileSeries::from(labels)).copied())
    }

    /// Every series written so far.
    pub fn series(&self) -> HashMap<FileSeries, f64> {
        self.with_state(|s| s.files.clone())
    }

    /// Number of `set_files` calls, including overwrites.
    pub fn set_calls(&self) -> u64 {
        self.with_state(|s| s.set_calls)
    }

    pub fn durations(&self) -> Vec<f64> {
        self.with_state(|s| s.durations.clone())
    }

    pub fn connections(&self) -> u64 {
        self.with_state(|s| s.connections)
    }

    /// Reports of finished runs, in completion order.
    pub fn runs(&self) -> Vec<RunReport> {
        self.with_state(|s| s.runs.clone())
    }

    pub fn finished_runs(&self) -> usize {
        self.with_state(|s| s.runs.len())
    }

    /// Lines of `kind` over all finished runs.
    pub fn lines(&self, kind: &str) -> u64 {
        self.with_state(|s| {
            s.runs
                .iter()
                .filter_map(|r| r.lines.get(kind))
                .sum()
        })
    }

    pub fn read_errors(&self) -> usize {
        self.with_state(|s| s.runs.iter().filter(|r| r.read_error.is_some()).count())
    }

    pub fn fingerprint_errors(&self) -> usize {
        self.with_state(|s| {
            s.runs
                .iter()
                .map(|r| r.published.fingerprint_failures)
                .sum()
        })
    }
}

impl MetricsSink for MemorySink {
    fn set_files(&self, labels: &FileLabels<'_>, value: f64) {
        self.with_state(|s| {
            s.files.insert(FileSeries::from(labels), value);
            s.set_calls += 1;
        });
    }

    fn observe_run_duration(&self, seconds: f64) {
        self.with_state(|s| s.durations.push(seconds));
    }

    fn record_connection(&self) {
        self.with_state(|s| s.connections += 1);
    }

    fn record_run(&self, report: &RunReport) {
        self.with_state(|s| s.runs.push(report.clone()));
    }
}
