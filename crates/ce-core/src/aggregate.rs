//! Per-run aggregation of classified lines.
//!
//! One [`RunAggregate`] exists per connection. It has a single entry point
//! ([`RunAggregate::observe`]) and a single, consuming exit point
//! ([`RunAggregate::snapshot`]), so a run can be snapshotted exactly once.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{error, warn};

use crate::classify::Classification;

/// Final result of one scan run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSnapshot {
    /// Number of lines per result code.
    pub counts: HashMap<String, u64>,
    /// Most recent path per infection signature.
    pub infections: HashMap<String, String>,
}

impl RunSnapshot {
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty() && self.infections.is_empty()
    }
}

/// Accumulator for a single connection's lines.
#[derive(Debug, Default)]
pub struct RunAggregate {
    counts: HashMap<String, u64>,
    infections: HashMap<String, String>,
    observed_lines: u64,
    error_lines: u64,
    unclassified_lines: u64,
    long_code_warnings: u64,
}

impl RunAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one classified line into the run.
    pub fn observe(&mut self, classification: Classification) {
        self.observed_lines += 1;
        let long_code = classification.is_long_code();
        match classification {
            Classification::ResultCode { code } => {
                if let Some(count) = self.counts.get_mut(&code) {
                    *count += 1;
                    return;
                }
                if long_code {
                    warn!(code = %code, "found very long result code");
                    self.long_code_warnings += 1;
                }
                self.counts.insert(code, 1);
            }
            Classification::InfectionFound { signature, path } => {
                // Last path wins for a repeated signature.
                self.infections.insert(signature, path);
            }
            Classification::ErrorLine { raw } => {
                error!(line = %raw, "clamscan reported an error");
                self.error_lines += 1;
            }
            Classification::Unclassified => {
                self.unclassified_lines += 1;
            }
        }
    }

    /// Lines fed to [`observe`](Self::observe) so far.
    pub fn observed_lines(&self) -> u64 {
        self.observed_lines
    }

    pub fn error_lines(&self) -> u64 {
        self.error_lines
    }

    pub fn unclassified_lines(&self) -> u64 {
        self.unclassified_lines
    }

    /// Distinct over-long codes warned about in this run.
    pub fn long_code_warnings(&self) -> u64 {
        self.long_code_warnings
    }

    /// Finish the run.
    pub fn snapshot(self) -> RunSnapshot {
        RunSnapshot {
            counts: self.counts,
            infections: self.infections,
        }
    }
}
