//! Conversion Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A conversion error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for conversion and merge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No usable tool was found on this system; install one.
    #[display("no {_0} backend available on this system")]
    NoBackend(#[error(not(source))] &'static str),
    /// Every configured backend was tried and none produced output.
    #[display("all {_0} backends failed")]
    AllBackendsFailed(#[error(not(source))] &'static str),
    /// The tool could not be started or exited unsuccessfully.
    #[display("{_0} failed")]
    ToolFailed(#[error(not(source))] String),
    /// The tool reported success but the expected PDF is missing or invalid.
    #[display("expected output missing: {}", _0.display())]
    MissingOutput(#[error(not(source))] PathBuf),
    /// The input file does not exist.
    #[display("input not found: {}", _0.display())]
    InputNotFound(#[error(not(source))] PathBuf),
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }
}
