//! Classification of clamscan output lines.
//!
//! clamscan writes one line per scanned file in the form
//! `<path>: <status>`, where status is `OK`, `Empty file`, an error word, or
//! `<signature> FOUND`. Everything else it prints (banners, the scan summary,
//! blank lines) lacks the `": "` separator and is inert.

use serde::Serialize;

/// Separator between the path and the trailing status token.
const CODE_SEPARATOR: &str = ": ";

/// Marker clamscan appends to a signature name when a file is infected.
pub const FOUND_MARKER: &str = "FOUND";

/// Codes longer than this are reported as suspicious (usually a line that
/// is not really a scan result but happens to contain `": "`).
pub const LONG_CODE_THRESHOLD: usize = 20;

/// Error messages clamscan prints for files it could not scan.
///
/// These are matched against the whole line, never against the code, and are
/// kept out of the counters: the message text would otherwise become an
/// unbounded label value.
const ERROR_PREFIXES: &[&str] = &["Can't open file"];

const ERROR_SUFFIXES: &[&str] = &[
    "Can't open directory.",
    " Can't access file",
    " Not supported file type",
    " ERROR",
    " No such file or directory",
];

/// What a single line means for the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    /// A plain scan status such as `OK`.
    ResultCode { code: String },
    /// The scanned file matched a signature.
    InfectionFound { signature: String, path: String },
    /// clamscan reported it could not scan something.
    ErrorLine { raw: String },
    /// Not a scan-result line.
    Unclassified,
}

impl Classification {
    /// Short stable name, used as a metric label and in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Classification::ResultCode { .. } => "result",
            Classification::InfectionFound { .. } => "found",
            Classification::ErrorLine { .. } => "error",
            Classification::Unclassified => "unclassified",
        }
    }

    /// True for a result code above [`LONG_CODE_THRESHOLD`] characters.
    pub fn is_long_code(&self) -> bool {
        match self {
            Classification::ResultCode { code } => code.chars().count() > LONG_CODE_THRESHOLD,
            _ => false,
        }
    }
}

/// Classify one line of clamscan output.
///
/// The infection check runs before the error-pattern check, so a line whose
/// code ends in `FOUND` is an infection even if the line also ends like an
/// error message.
pub fn classify(line: &str) -> Classification {
    let Some(sep) = line.rfind(CODE_SEPARATOR) else {
        return Classification::Unclassified;
    };
    let code = &line[sep + CODE_SEPARATOR.len()..];

    if let Some(signature) = strip_found_marker(code) {
        return Classification::InfectionFound {
            signature: signature.to_string(),
            path: line[..sep].to_string(),
        };
    }

    if is_error_line(line) {
        return Classification::ErrorLine {
            raw: line.to_string(),
        };
    }

    Classification::ResultCode {
        code: code.to_string(),
    }
}

/// Strip `" FOUND"` (or a bare `"FOUND"`) from the end of a code.
///
/// Returns `None` when the code is not an infection marker.
fn strip_found_marker(code: &str) -> Option<&str> {
    let rest = code.strip_suffix(FOUND_MARKER)?;
    Some(rest.strip_suffix(' ').unwrap_or(rest))
}

/// Whether the whole line is one of clamscan's known error messages.
pub fn is_error_line(line: &str) -> bool {
    ERROR_PREFIXES.iter().any(|p| line.starts_with(p))
        || ERROR_SUFFIXES.iter().any(|s| line.ends_with(s))
}
