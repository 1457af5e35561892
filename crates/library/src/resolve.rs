//! Where a project's documents come from and where they go.

use crate::error::{ErrorKind, Result};
use crate::{MATERIALS_DIR, OUTPUT_DIR, PROJECT_MARKER};
use std::path::{Path, PathBuf};

/// Numbered evaluation folders expected in a complete project.
pub const NUMBERED_FOLDERS: std::ops::RangeInclusive<u8> = 1..=12;

/// The resolved directory layout of one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// The project root: the directory holding `12`.
    pub root: PathBuf,
    /// `12/开评标资料` when it holds every numbered folder, otherwise `root`.
    pub base: PathBuf,
    /// Where numbered folders are looked up: `12/开评标资料` if present,
    /// otherwise `12`.
    pub numbered_base: PathBuf,
    /// Output folder that documents are routed into.
    pub output: PathBuf,
    /// `output` lives inside `base` and is merged into `root/1` afterwards.
    pub staged: bool,
    /// Numbered folders absent from `numbered_base`.
    pub missing: Vec<u8>,
}
impl Layout {
    /// The folder the output ends up in once the project is finished.
    pub fn final_output(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    /// Numbered folder `n` of the numbered base, if it exists.
    pub fn numbered(&self, n: u8) -> Option<PathBuf> {
        let dir = self.numbered_base.join(n.to_string());
        dir.is_dir().then_some(dir)
    }

    /// Directory the project's name is taken from when packing.
    pub fn name(&self) -> &str {
        self.root.file_name().and_then(|n| n.to_str()).unwrap_or_default()
    }
}

/// Resolve the layout of the project at `root`.
///
/// # Errors
/// Returns [`RootNotFound`](ErrorKind::RootNotFound) when `root` is not a
/// directory.
pub fn resolve(root: &Path) -> Result<Layout> {
    if !root.is_dir() {
        exn::bail!(ErrorKind::RootNotFound(root.to_path_buf()));
    }
    let materials = root.join(PROJECT_MARKER).join(MATERIALS_DIR);
    let has_materials = materials.is_dir();
    let numbered_base = if has_materials { materials } else { root.join(PROJECT_MARKER) };
    let missing: Vec<u8> = NUMBERED_FOLDERS.filter(|n| !numbered_base.join(n.to_string()).is_dir()).collect();

    let staged = has_materials && missing.is_empty();
    let base = if staged { numbered_base.clone() } else { root.to_path_buf() };
    let output = base.join(OUTPUT_DIR);

    if missing.is_empty() {
        tracing::debug!(base = %numbered_base.display(), "All numbered folders present");
    } else {
        tracing::warn!(base = %numbered_base.display(), missing = ?missing, "Numbered folders missing; continuing with those present");
    }
    tracing::info!(project = %root.display(), output = %output.display(), staged, "Resolved project layout");
    Ok(Layout { root: root.to_path_buf(), base, numbered_base, output, staged, missing })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;

    fn numbered(base: &Path, folders: impl IntoIterator<Item = u8>) {
        for n in folders {
            fs::create_dir_all(base.join(n.to_string())).unwrap();
        }
    }

    #[test]
    fn test_complete_materials_is_staged() {
        let temp = tempfile::tempdir().unwrap();
        let materials = temp.path().join(PROJECT_MARKER).join(MATERIALS_DIR);
        numbered(&materials, NUMBERED_FOLDERS);
        let layout = resolve(temp.path()).unwrap();
        assert!(layout.staged);
        assert_eq!(layout.base, materials);
        assert_eq!(layout.output, materials.join(OUTPUT_DIR));
        assert_eq!(layout.final_output(), temp.path().join(OUTPUT_DIR));
        assert!(layout.missing.is_empty());
    }

    #[rstest]
    #[case::materials(true)]
    #[case::bare_marker(false)]
    fn test_incomplete_uses_root(#[case] materials: bool) {
        let temp = tempfile::tempdir().unwrap();
        let mut numbered_base = temp.path().join(PROJECT_MARKER);
        if materials {
            numbered_base = numbered_base.join(MATERIALS_DIR);
        }
        numbered(&numbered_base, (1..=12).filter(|n| *n != 7));
        let layout = resolve(temp.path()).unwrap();
        assert!(!layout.staged);
        assert_eq!(layout.base, temp.path());
        assert_eq!(layout.numbered_base, numbered_base);
        assert_eq!(layout.output, temp.path().join(OUTPUT_DIR));
        assert_eq!(layout.missing, vec![7]);
    }

    #[test]
    fn test_numbered_lookup() {
        let temp = tempfile::tempdir().unwrap();
        numbered(&temp.path().join(PROJECT_MARKER), [3]);
        let layout = resolve(temp.path()).unwrap();
        assert!(layout.numbered(3).is_some());
        assert!(layout.numbered(4).is_none());
    }

    #[test]
    fn test_missing_root() {
        let temp = tempfile::tempdir().unwrap();
        let err = resolve(&temp.path().join("nope")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::RootNotFound(_)));
    }
}
