use crate::PDF_MAGIC;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Run a command to completion, failing on spawn errors and non-zero exits.
pub(crate) fn run(name: &str, command: &mut Command) -> Result<()> {
    tracing::trace!(tool = name, command = ?command, "Running external tool");
    let output = command.output().or_raise(|| ErrorKind::ToolFailed(name.to_string()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::debug!(tool = name, status = %output.status, stderr = %stderr.trim(), "External tool failed");
        exn::bail!(ErrorKind::ToolFailed(format!("{name} ({})", output.status)));
    }
    Ok(())
}

/// Ensure `path` exists and starts with the PDF magic bytes.
pub(crate) fn verify_pdf(path: &Path) -> Result<()> {
    let mut head = [0u8; 4];
    let mut file = std::fs::File::open(path).or_raise(|| ErrorKind::MissingOutput(path.to_path_buf()))?;
    file.read_exact(&mut head).or_raise(|| ErrorKind::MissingOutput(path.to_path_buf()))?;
    if head != PDF_MAGIC {
        exn::bail!(ErrorKind::MissingOutput(path.to_path_buf()));
    }
    Ok(())
}

/// Explicit path if given, else the first of `names` found in `PATH`.
pub(crate) fn locate(explicit: Option<&Path>, names: &[&str]) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return match path.is_file() {
            true => Some(path.to_path_buf()),
            false => {
                tracing::warn!(path = %path.display(), "Configured tool does not exist; falling back to PATH");
                names.iter().find_map(|name| which::which(name).ok())
            },
        };
    }
    names.iter().find_map(|name| which::which(name).ok())
}

/// Directory next to `target` where a tool can write without clobbering
/// anything. Removed when dropped.
pub(crate) fn scratch_dir(target: &Path) -> Result<tempfile::TempDir> {
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Io)?;
    tempfile::Builder::new().prefix(".bidsort-").tempdir_in(parent).or_raise(|| ErrorKind::Io)
}
