use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::instrument;
use zip::ZipArchive;

/// Extract `archive` into `dest` and return the directory to scan.
///
/// When the archive unpacks to exactly one top-level directory, that
/// directory is returned; otherwise `dest` itself. Loose top-level files do
/// not count against the single-directory rule.
#[instrument(skip_all, fields(archive = %archive.display()))]
pub fn extract(archive: &Path, dest: &Path) -> Result<PathBuf> {
    if !archive.is_file() {
        exn::bail!(ErrorKind::NotFound(archive.to_path_buf()));
    }
    let file = File::open(archive).or_raise(|| ErrorKind::Io)?;
    let mut zip = ZipArchive::new(file).or_raise(|| ErrorKind::InvalidArchive(archive.to_path_buf()))?;
    fs::create_dir_all(dest).or_raise(|| ErrorKind::Io)?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).or_raise(|| ErrorKind::InvalidArchive(archive.to_path_buf()))?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            exn::bail!(ErrorKind::UnsafeEntry(entry.name().to_string()));
        };
        let target = dest.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&target).or_raise(|| ErrorKind::Io)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).or_raise(|| ErrorKind::Io)?;
        }
        let mut out = File::create(&target).or_raise(|| ErrorKind::Io)?;
        io::copy(&mut entry, &mut out).or_raise(|| ErrorKind::Io)?;
    }
    tracing::debug!(dest = %dest.display(), entries = zip.len(), "Extracted archive");

    let mut top_level = Vec::new();
    for entry in fs::read_dir(dest).or_raise(|| ErrorKind::Io)? {
        let path = entry.or_raise(|| ErrorKind::Io)?.path();
        if path.is_dir() {
            top_level.push(path);
        }
    }
    match <[PathBuf; 1]>::try_from(top_level) {
        Ok([single]) => Ok(single),
        Err(_) => Ok(dest.to_path_buf()),
    }
}
