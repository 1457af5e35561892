//! Filesystem primitives shared by routing and staging.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// `target` itself if free, otherwise the first free `"<stem> (n)<.ext>"`
/// beside it, for the smallest `n >= 1`.
pub fn unique_path(target: &Path) -> PathBuf {
    if !target.exists() {
        return target.to_path_buf();
    }
    let stem = target.file_stem().unwrap_or_default();
    let ext = target.extension();
    (1u32..)
        .map(|n| {
            let mut name = OsString::from(stem);
            name.push(format!(" ({n})"));
            if let Some(ext) = ext {
                name.push(".");
                name.push(ext);
            }
            target.with_file_name(name)
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| target.to_path_buf())
}

/// Decide where a file destined for `target` actually lands.
///
/// # Errors
/// In strict mode an occupied `target` is a
/// [`TargetExists`](ErrorKind::TargetExists) error instead of a suffixed
/// name.
pub fn destination(target: &Path, strict: bool) -> Result<PathBuf> {
    if strict && target.exists() {
        exn::bail!(ErrorKind::TargetExists(target.to_path_buf()));
    }
    Ok(unique_path(target))
}

/// Rename `from` to `to`, creating parent directories. Falls back to copy
/// and remove across filesystems.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).or_raise(|| ErrorKind::Io)?;
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!(from = %from.display(), to = %to.display(), "Cross-device move; copying instead");
            fs::copy(from, to).or_raise(|| ErrorKind::Io)?;
            fs::remove_file(from).or_raise(|| ErrorKind::Io)
        },
        Err(e) => Err(e).or_raise(|| ErrorKind::Io),
    }
}

/// Move the contents of directory `from` into `into`, then remove `from`.
///
/// Files that collide get a suffixed name; directories that collide are
/// merged recursively.
pub fn merge_dir(from: &Path, into: &Path) -> Result<()> {
    fs::create_dir_all(into).or_raise(|| ErrorKind::Io)?;
    let mut entries: Vec<_> = fs::read_dir(from)
        .or_raise(|| ErrorKind::Io)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<_>>()
        .or_raise(|| ErrorKind::Io)?;
    entries.sort();
    for item in entries {
        let Some(name) = item.file_name() else { continue };
        let target = into.join(name);
        if item.is_dir() {
            if target.is_dir() {
                merge_dir(&item, &target)?;
            } else {
                move_file(&item, &unique_path(&target))?;
            }
        } else {
            move_file(&item, &unique_path(&target))?;
        }
    }
    fs::remove_dir_all(from).or_raise(|| ErrorKind::Io)
}
