//! Removal of redundant `(n)`-suffixed copies.
//!
//! Routing never overwrites, so re-running a project or merging a staged
//! output leaves `X (1).pdf` beside `X.pdf`. Within one output folder, files
//! are grouped by base name and extension:
//!
//! - if the un-suffixed `X.ext` exists, every `X (n).ext` is removed, whether
//!   or not the content matches;
//! - otherwise only byte-identical copies are removed, keeping the lowest
//!   `n` of each distinct content.

use crate::error::{ErrorKind, Result};
use crate::has_extension;
use exn::ResultExt;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::instrument;

static SUFFIXED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?P<base>.+) \((?P<n>[1-9][0-9]*)\)$").unwrap());

/// A file's place in its duplicate group.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Member {
    /// `None` for the un-suffixed original.
    n: Option<u64>,
    path: PathBuf,
}

/// Split a file name into `(base, lowercase extension, suffix number)`.
fn parse(path: &Path) -> Option<(String, String, Option<u64>)> {
    let stem = path.file_stem()?.to_str()?;
    let ext = path.extension()?.to_str()?.to_lowercase();
    Some(match SUFFIXED.captures(stem) {
        Some(caps) => match caps["n"].parse() {
            Ok(n) => (caps["base"].to_string(), ext, Some(n)),
            Err(_) => (stem.to_string(), ext, None),
        },
        None => (stem.to_string(), ext, None),
    })
}

fn digest(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).or_raise(|| ErrorKind::Io)?;
    Ok(format!("{:x}", md5::compute(bytes)))
}

/// Paths in one group that should be removed.
fn redundant(mut members: Vec<Member>) -> Vec<PathBuf> {
    if members.iter().any(|m| m.n.is_none()) {
        return members.into_iter().filter(|m| m.n.is_some()).map(|m| m.path).collect();
    }
    if members.len() < 2 {
        return Vec::new();
    }
    members.sort_by_key(|m| m.n);
    let mut kept: HashMap<String, PathBuf> = HashMap::new();
    let mut remove = Vec::new();
    for member in members {
        match digest(&member.path) {
            Ok(hash) => match kept.get(&hash) {
                Some(original) => {
                    tracing::debug!(duplicate = %member.path.display(), kept = %original.display(), "Identical content");
                    remove.push(member.path);
                },
                None => {
                    kept.insert(hash, member.path);
                },
            },
            Err(e) => tracing::warn!(path = %member.path.display(), error = ?e, "Could not hash file; keeping it"),
        }
    }
    remove
}

/// Remove redundant duplicates among the PDFs and images directly in
/// `output`, returning the paths removed (or, in a dry run, that would be).
///
/// A missing `output` is not an error. Files that cannot be removed are
/// logged and left in place. Running it twice removes nothing the second
/// time.
#[instrument(skip_all, fields(output = %output.display(), dry_run = dry_run))]
pub fn dedup(output: &Path, dry_run: bool, image_extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !output.is_dir() {
        return Ok(Vec::new());
    }
    let pdf = ["pdf".to_string()];
    let mut groups: BTreeMap<(String, String), Vec<Member>> = BTreeMap::new();
    for entry in std::fs::read_dir(output).or_raise(|| ErrorKind::Io)? {
        let path = entry.or_raise(|| ErrorKind::Io)?.path();
        if !path.is_file() || !(has_extension(&path, &pdf) || has_extension(&path, image_extensions)) {
            continue;
        }
        if let Some((base, ext, n)) = parse(&path) {
            groups.entry((base, ext)).or_default().push(Member { n, path });
        }
    }

    let mut removed = Vec::new();
    for members in groups.into_values() {
        for path in redundant(members) {
            if dry_run {
                tracing::info!(path = %path.display(), "Would remove duplicate");
                removed.push(path);
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "Removed duplicate");
                    removed.push(path);
                },
                Err(e) => tracing::error!(path = %path.display(), error = %e, "Could not remove duplicate"),
            }
        }
    }
    removed.sort();
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{names, snapshot, write};
    use rstest::rstest;

    fn images() -> Vec<String> {
        vec!["png".to_string(), "jpg".to_string()]
    }

    #[rstest]
    #[case::identical_suffix(&[("X.pdf", "a"), ("X (1).pdf", "a")], &["X.pdf"])]
    #[case::different_suffix(&[("X.pdf", "a"), ("X (1).pdf", "b")], &["X.pdf"])]
    #[case::suffixed_only(&[("X (1).png", "a"), ("X (2).png", "a")], &["X (1).png"])]
    #[case::suffixed_distinct(&[("X (2).png", "a"), ("X (3).png", "b"), ("X (5).png", "a")], &["X (2).png", "X (3).png"])]
    #[case::extension_case(&[("X.PDF", "a"), ("X (1).pdf", "b")], &["X.PDF"])]
    #[case::different_extension(&[("X.pdf", "a"), ("X (1).png", "a")], &["X (1).png", "X.pdf"])]
    #[case::untracked_types(&[("X.docx", "a"), ("X (1).docx", "a")], &["X (1).docx", "X.docx"])]
    #[case::zero_is_not_a_suffix(&[("X (0).pdf", "a"), ("X (1).pdf", "a")], &["X (0).pdf", "X (1).pdf"])]
    fn test_dedup(#[case] files: &[(&str, &str)], #[case] expected: &[&str]) {
        let temp = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            write(temp.path().join(name), contents.as_bytes());
        }
        dedup(temp.path(), false, &images()).unwrap();
        assert_eq!(names(temp.path()), expected);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path().join("9.pdf"), b"a");
        write(temp.path().join("9 (1).pdf"), b"b");
        write(temp.path().join("seal (1).png"), b"x");
        write(temp.path().join("seal (2).png"), b"x");
        let removed = dedup(temp.path(), false, &images()).unwrap();
        assert_eq!(removed, vec![temp.path().join("9 (1).pdf"), temp.path().join("seal (2).png")]);
        let after = snapshot(temp.path());
        assert!(dedup(temp.path(), false, &images()).unwrap().is_empty());
        assert_eq!(snapshot(temp.path()), after);
    }

    #[test]
    fn test_dry_run_reports_only() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path().join("1.pdf"), b"a");
        write(temp.path().join("1 (1).pdf"), b"a");
        let removed = dedup(temp.path(), true, &images()).unwrap();
        assert_eq!(removed, vec![temp.path().join("1 (1).pdf")]);
        assert_eq!(names(temp.path()), vec!["1 (1).pdf", "1.pdf"]);
    }

    #[test]
    fn test_missing_output_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        assert!(dedup(&temp.path().join("1"), false, &images()).unwrap().is_empty());
    }

    #[rstest]
    #[case("X (12).pdf", Some(("X", 12)))]
    #[case("a (b) (3).png", Some(("a (b)", 3)))]
    #[case("X(1).pdf", None)]
    #[case("X (01).pdf", None)]
    fn test_parse(#[case] name: &str, #[case] expected: Option<(&str, u64)>) {
        let (base, _ext, n) = parse(Path::new(name)).unwrap();
        match expected {
            Some((b, num)) => assert_eq!((base.as_str(), n), (b, Some(num))),
            None => assert_eq!(n, None),
        }
    }
}
