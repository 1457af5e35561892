//! Project discovery.

use crate::error::{ErrorKind, Result};
use crate::{MATERIALS_DIR, PROJECT_MARKER};
use exn::ResultExt;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::instrument;
use walkdir::WalkDir;

/// Find every project root at or around `root`.
///
/// A directory is a project when it has a child directory named `12`. The
/// scan root and each of its ancestors are checked directly, so pointing at a
/// folder inside a project still finds that project. Below the root, the
/// parent of every directory named `12` is a project; with `recursive` off
/// only the root's children and grandchildren are looked at.
///
/// Candidates are canonicalized, so a project reached through a symlink or a
/// `./` spelling is returned once. The result is sorted by path. Unreadable
/// directories are logged and skipped.
///
/// # Errors
/// Returns [`RootNotFound`](ErrorKind::RootNotFound) when `root` is not a
/// directory.
#[instrument(skip_all, fields(root = %root.display(), recursive = recursive))]
pub fn locate(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        exn::bail!(ErrorKind::RootNotFound(root.to_path_buf()));
    }
    let root = dunce::canonicalize(root).or_raise(|| ErrorKind::RootNotFound(root.to_path_buf()))?;
    let mut candidates: Vec<PathBuf> =
        root.ancestors().filter(|dir| dir.join(PROJECT_MARKER).is_dir()).map(Path::to_path_buf).collect();

    let mut walker = WalkDir::new(&root).min_depth(1).follow_links(true).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(2);
    }
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(path = ?e.path(), error = %e, "Skipping unreadable directory");
                continue;
            },
        };
        if entry.file_type().is_dir()
            && entry.file_name() == PROJECT_MARKER
            && let Some(parent) = entry.path().parent()
        {
            candidates.push(parent.to_path_buf());
        }
    }

    let mut projects = BTreeSet::new();
    for candidate in candidates {
        let candidate = normalize(&candidate);
        match dunce::canonicalize(candidate) {
            Ok(canonical) => {
                projects.insert(canonical);
            },
            Err(e) => tracing::warn!(path = %candidate.display(), error = %e, "Could not resolve project path"),
        }
    }
    tracing::info!(count = projects.len(), "Located projects");
    Ok(projects.into_iter().collect())
}

/// Map a `12` folder, or a `12/开评标资料` folder, to the project it belongs
/// to.
fn normalize(candidate: &Path) -> &Path {
    let parent = candidate.parent();
    if candidate.file_name().is_some_and(|name| name == MATERIALS_DIR)
        && let Some(parent) = parent
        && parent.file_name().is_some_and(|name| name == PROJECT_MARKER)
        && let Some(project) = parent.parent()
    {
        return project;
    }
    if candidate.file_name().is_some_and(|name| name == PROJECT_MARKER)
        && let Some(project) = parent
    {
        return project;
    }
    candidate
}
