//! Library error type.
//!
//! The core never lets an error escape a per-item boundary (see
//! [`crate::align::scheduler`]); this type exists for the handful of
//! fallible constructors (graph freezing, index building, format parsing)
//! whose failures are either programmer errors or fatal setup errors.
//! Library code returns `Result<_, AlignError>`; only the CLI binary
//! collapses an error into a message and an exit code.

use std::path::PathBuf;

use thiserror::Error;

/// The kinds of error this crate can report, matching the error-kind
/// taxonomy used throughout the pipeline.
#[derive(Debug, Error)]
pub enum AlignError {
    #[error("malformed {kind} record at byte offset {offset} in {path}: {detail}")]
    BadFormat {
        kind: &'static str,
        path: PathBuf,
        offset: u64,
        detail: String,
    },

    #[error("unsupported GFA version {found}, require >= {required}")]
    UnsupportedVersion { found: String, required: String },

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("out of memory while {0}")]
    OutOfMemory(&'static str),

    #[error("DP traceback failed to reach the seed (band too narrow?): {0}")]
    OutOfBand(String),

    #[error("alignment score overflowed i64")]
    ScoreOverflow,

    #[error("invalid argument: {0}")]
    InvalidArgs(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AlignError>;
