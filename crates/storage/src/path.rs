//! Path validation for storage keys.
//!
//! Every path handed to a backend is relative to that backend's root. These
//! helpers reject anything that would escape the root.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a storage path and returns its normalized form.
///
/// `.` components and repeated separators are dropped, `..` pops the previous
/// component and fails if there is nothing left to pop. Null bytes and
/// Windows prefixes are rejected with [`InvalidPath`](crate::error::ErrorKind::InvalidPath),
/// as is a path that normalizes to nothing.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use bidsort_storage::validate_path;
/// assert!(validate_path("inbox/项目A.zip").is_ok());
/// assert!(validate_path("inbox/../项目A.zip").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(validate_path("inbox/./old/../项目A.zip").unwrap(), Path::new("inbox/项目A.zip"));
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Would truncate at the syscall boundary.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(original.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
    }
    Ok(components.into_iter().collect())
}
