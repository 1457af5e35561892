use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::instrument;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Pack every file beneath each output directory into `archive`.
///
/// Entries are named `<project>/<path relative to the output directory>`,
/// where `<project>` is the name of the output directory's parent (the
/// project root). Projects sharing a name get `" (n)"` appended to the later
/// labels, so no two projects share a folder. Output directories that don't
/// exist are skipped with a warning. The archive is written to a temporary file next to `archive`
/// and renamed into place once complete.
///
/// Returns the number of files written.
#[instrument(skip_all, fields(archive = %archive.display()))]
pub fn pack(outputs: &[PathBuf], archive: &Path) -> Result<usize> {
    let parent = match archive.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).or_raise(|| ErrorKind::Io)?;
    let staging = tempfile::NamedTempFile::new_in(&parent).or_raise(|| ErrorKind::Io)?;
    let mut writer = ZipWriter::new(staging.reopen().or_raise(|| ErrorKind::Io)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut written = 0;
    let mut labels = HashSet::new();
    for output in outputs {
        if !output.is_dir() {
            tracing::warn!(output = %output.display(), "Output directory missing, not packing");
            continue;
        }
        let name = output
            .parent()
            .and_then(Path::file_name)
            .ok_or_raise(|| ErrorKind::InvalidPath(output.clone()))?
            .to_string_lossy();
        let label = unique_label(&name, &mut labels);
        if label != *name {
            tracing::warn!(output = %output.display(), label = %label, "Project name already packed, renaming");
        }
        for entry in WalkDir::new(output).sort_by_file_name() {
            let entry = entry.or_raise(|| ErrorKind::Io)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(output).or_raise(|| ErrorKind::Io)?;
            let entry_name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .fold(label.clone(), |acc, part| format!("{acc}/{part}"));
            writer.start_file(entry_name, options).or_raise(|| ErrorKind::Io)?;
            let mut source = File::open(entry.path()).or_raise(|| ErrorKind::Io)?;
            io::copy(&mut source, &mut writer).or_raise(|| ErrorKind::Io)?;
            written += 1;
        }
    }
    writer.finish().or_raise(|| ErrorKind::Io)?;
    staging.persist(archive).or_raise(|| ErrorKind::Io)?;
    tracing::info!(files = written, "Packed outputs");
    Ok(written)
}

/// Claim `name`, or the first free `"name (n)"`, in `used`.
fn unique_label(name: &str, used: &mut HashSet<String>) -> String {
    let mut label = name.to_string();
    let mut n = 1;
    while used.contains(&label) {
        label = format!("{name} ({n})");
        n += 1;
    }
    used.insert(label.clone());
    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Read;
    use zip::ZipArchive;

    fn entries(archive: &Path) -> Vec<String> {
        let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
        let mut names: Vec<String> = (0..zip.len()).map(|i| zip.by_index(i).unwrap().name().to_string()).collect();
        names.sort();
        names
    }

    #[test]
    fn test_entries_are_prefixed_with_project_name() {
        let dir = tempfile::tempdir().unwrap();
        for (project, file) in [("项目A", "1.pdf"), ("项目B", "2.pdf")] {
            let output = dir.path().join(project).join("1");
            fs::create_dir_all(output.join("images")).unwrap();
            fs::write(output.join(file), project.as_bytes()).unwrap();
            fs::write(output.join("images/现场.png"), b"png").unwrap();
        }
        let outputs = vec![dir.path().join("项目A/1"), dir.path().join("项目B/1")];
        let archive = dir.path().join("out/result.zip");
        assert_eq!(pack(&outputs, &archive).unwrap(), 4);
        assert_eq!(entries(&archive), vec![
            "项目A/1.pdf".to_string(),
            "项目A/images/现场.png".to_string(),
            "项目B/2.pdf".to_string(),
            "项目B/images/现场.png".to_string(),
        ]);

        let mut zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut content = String::new();
        zip.by_name("项目B/2.pdf").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "项目B");
    }

    #[test]
    fn test_same_named_projects_get_distinct_folders() {
        let dir = tempfile::tempdir().unwrap();
        for parent in ["a", "b"] {
            let output = dir.path().join(parent).join("项目A/1");
            fs::create_dir_all(&output).unwrap();
            fs::write(output.join("1.pdf"), format!("from-{parent}")).unwrap();
        }
        let outputs = vec![dir.path().join("a/项目A/1"), dir.path().join("b/项目A/1")];
        let archive = dir.path().join("result.zip");
        assert_eq!(pack(&outputs, &archive).unwrap(), 2);
        assert_eq!(entries(&archive), vec!["项目A (1)/1.pdf".to_string(), "项目A/1.pdf".to_string()]);

        let mut zip = ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        for (entry, expected) in [("项目A/1.pdf", "from-a"), ("项目A (1)/1.pdf", "from-b")] {
            let mut content = String::new();
            zip.by_name(entry).unwrap().read_to_string(&mut content).unwrap();
            assert_eq!(content, expected);
        }
    }

    #[test]
    fn test_unique_label() {
        let mut used = HashSet::new();
        assert_eq!(unique_label("项目A", &mut used), "项目A");
        assert_eq!(unique_label("项目A", &mut used), "项目A (1)");
        assert_eq!(unique_label("项目A", &mut used), "项目A (2)");
        assert_eq!(unique_label("项目B", &mut used), "项目B");
    }

    #[test]
    fn test_output_without_project_name_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let err = pack(&[PathBuf::from("/")], &dir.path().join("result.zip")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[rstest]
    #[case::nothing(vec![])]
    #[case::missing(vec!["项目C/1"])]
    fn test_missing_outputs_yield_empty_archive(#[case] outputs: Vec<&str>) {
        let dir = tempfile::tempdir().unwrap();
        let outputs: Vec<PathBuf> = outputs.into_iter().map(|o| dir.path().join(o)).collect();
        let archive = dir.path().join("empty.zip");
        assert_eq!(pack(&outputs, &archive).unwrap(), 0);
        assert!(entries(&archive).is_empty());
    }
}
