//! Error taxonomy for a report run.
//!
//! Row-level and section-level errors are recovered where they occur;
//! only [`PipelineError`] ever reaches the caller.

use std::path::PathBuf;
use thiserror::Error;

/// A raw row that cannot become a branch record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataIntegrityError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid year {0}")]
    InvalidYear(i32),

    #[error("negative `{field}` count: {value}")]
    NegativeCount { field: &'static str, value: i64 },

    #[error("`{field}` ({count}) exceeds total_branches ({total})")]
    ExceedsTotal {
        field: &'static str,
        count: i64,
        total: i64,
    },

    #[error("row for {county_state} {year} returned in the result for {expected}")]
    PairMismatch {
        county_state: String,
        year: i32,
        expected: String,
    },
}

/// Failure signalled by a narrative backend for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("request timed out")]
    Timeout,

    #[error("rate limited by provider")]
    RateLimited,

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("provider returned no text")]
    EmptyResponse,
}

impl BackendError {
    /// Transient failures are worth one more attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::Timeout
                | BackendError::RateLimited
                | BackendError::Unavailable(_)
                | BackendError::Transport(_)
        )
    }
}

/// A narrative section could not be generated.
///
/// Attached to the affected section only; the report still carries the
/// deterministic fallback text for it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NarrativeError {
    #[error("digest for `{section}` is malformed: {reason}")]
    MalformedDigest {
        section: &'static str,
        reason: String,
    },

    #[error("`{section}` rejected by narrative backend: {cause}")]
    Rejected {
        section: &'static str,
        #[source]
        cause: BackendError,
    },

    #[error("`{section}` failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        section: &'static str,
        attempts: u32,
        #[source]
        last: BackendError,
    },
}

/// Serialization of the report model failed.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{exporter} exporter failed: {message}")]
    Render {
        exporter: &'static str,
        message: String,
    },

    #[error("workbook encoding failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Terminal failure of a report run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no branch records found for {counties} in {years}")]
    EmptyDataset { counties: String, years: String },

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("run cancelled")]
    Cancelled,
}
