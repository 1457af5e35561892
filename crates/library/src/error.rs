//! Library Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Failures from the archive, conversion and storage
//! crates are raised into these kinds with `or_raise`.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies why a project (or archive) could not be processed.
///
/// ### Project Errors
/// - [`ErrorKind::MissingSource`] and [`ErrorKind::TargetExists`] abort a
///   project in strict mode only.
/// - [`ErrorKind::Conversion`] aborts in strict mode; otherwise the rule is
///   skipped.
///
/// ### Archive Errors
/// - [`ErrorKind::NoProjects`] leaves the archive in place, unprocessed.
///
/// ### Dependency Errors
/// - [`ErrorKind::Io`], [`ErrorKind::Archive`], [`ErrorKind::Storage`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The scan root doesn't exist or isn't a directory.
    #[display("not a directory: {}", _0.display())]
    RootNotFound(#[error(not(source))] PathBuf),
    /// An archive contained no project folders.
    #[display("no projects found in {}", _0.display())]
    NoProjects(#[error(not(source))] PathBuf),
    /// A required source file is absent.
    #[display("required file `{file}` missing in project {}", project.display())]
    MissingSource {
        #[error(not(source))]
        file: String,
        #[error(not(source))]
        project: PathBuf,
    },
    /// The target name is already taken in the output directory.
    #[display("target already exists: {}", _0.display())]
    TargetExists(#[error(not(source))] PathBuf),
    /// DOCX to PDF conversion failed for this source.
    #[display("could not convert {}", _0.display())]
    Conversion(#[error(not(source))] PathBuf),
    /// A filesystem operation failed.
    #[display("I/O error")]
    Io,
    /// Extracting or packing a zip archive failed.
    #[display("archive error")]
    Archive,
    /// A storage backend operation (list, read, write, delete) failed.
    #[display("storage error")]
    Storage,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io | Self::Storage)
    }
}
