//! Process exit codes for `clamscan-exporter`.
//!
//! Exit code ranges:
//! - 0: clean shutdown after a signal
//! - 10-19: user/environment errors (fix the flags, config or host)
//! - 20-29: internal errors

use ce_common::Error;

/// Exit codes for the exporter process.
///
/// These are a stable contract for service managers and wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Stopped by SIGINT/SIGTERM after a graceful shutdown.
    Clean = 0,

    /// Invalid command-line arguments.
    ArgsError = 10,

    /// Config file missing, unparsable or invalid.
    ConfigError = 11,

    /// A listening socket could not be bound.
    BindError = 12,

    /// Internal error (bug, please report).
    InternalError = 20,

    /// I/O error.
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Stable name, used in the final log line.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::BindError => "ERR_BIND",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Config(_) => ExitCode::ConfigError,
            Error::Bind { .. } | Error::MetricsEndpoint(_) => ExitCode::BindError,
            Error::Io(_) => ExitCode::IoError,
            Error::MetricsRegistry(_) | Error::SignalHandler(_) => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
