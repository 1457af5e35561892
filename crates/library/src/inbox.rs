//! Batches of projects delivered as zip archives.
//!
//! An inbox is any [storage backend](bidsort_storage) holding zip archives
//! at its top level. Each archive not yet carrying the processed marker is
//! downloaded, extracted into a temporary directory and run through
//! [`process_all`]; the project outputs are packed into
//! `<stem><marker>.zip` and uploaded next to the original. An earlier result
//! under that name is never overwritten: the upload takes the first free
//! `<stem><marker> (n).zip` instead.

use crate::error::{Error, ErrorKind, Result};
use crate::process::{RunSummary, process_all};
use crate::Context;
use bidsort_storage::backend::{ArchiveOnlyBackend, ReadOnlyBackend};
use bidsort_storage::{BackendHandle, StorageBackend};
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

/// Marker appended to the stem of processed archives.
pub const PROCESSED_MARKER: &str = "_已处理";

#[derive(Debug, Clone)]
pub struct InboxOptions {
    /// Delete each original archive once its result has been uploaded.
    pub delete_source: bool,
    pub processed_marker: String,
}
impl Default for InboxOptions {
    fn default() -> Self {
        Self { delete_source: false, processed_marker: PROCESSED_MARKER.to_string() }
    }
}

/// The outcome of processing one archive from an inbox.
#[derive(Debug)]
pub struct ArchiveReport {
    /// Path of the archive within the inbox.
    pub archive: PathBuf,
    /// Path the result was uploaded to, if it was.
    pub uploaded: Option<PathBuf>,
    pub summary: RunSummary,
    /// Why the archive could not be fully processed.
    pub error: Option<Error>,
}
impl ArchiveReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.summary.is_success()
    }
}

/// `<stem><marker>.zip` beside `archive`.
pub fn processed_name(archive: &Path, marker: &str) -> PathBuf {
    let stem = archive.file_stem().unwrap_or_default().to_string_lossy();
    archive.with_file_name(format!("{stem}{marker}.zip"))
}

fn is_processed(archive: &Path, marker: &str) -> bool {
    archive.file_stem().is_some_and(|stem| stem.to_string_lossy().contains(marker))
}

/// Pack the outputs of a run into `archive`. Does nothing in a dry run.
pub fn package(summary: &RunSummary, archive: &Path, dry_run: bool) -> Result<usize> {
    let outputs = summary.outputs();
    if dry_run {
        tracing::info!(archive = %archive.display(), outputs = outputs.len(), "Would pack outputs");
        return Ok(0);
    }
    bidsort_archive::pack(&outputs, archive).or_raise(|| ErrorKind::Archive)
}

/// Extract a local archive, process every project in it and pack the
/// outputs into `output_zip`.
#[instrument(skip_all, fields(archive = %archive.display()))]
pub fn process_local_archive(archive: &Path, output_zip: &Path, ctx: &Context) -> Result<RunSummary> {
    let scratch = tempfile::tempdir().or_raise(|| ErrorKind::Io)?;
    let root = bidsort_archive::extract(archive, scratch.path()).or_raise(|| ErrorKind::Archive)?;
    tracing::info!(root = %root.display(), "Extracted archive");
    let summary = process_all(&root, ctx)?;
    if summary.projects.is_empty() {
        exn::bail!(ErrorKind::NoProjects(archive.to_path_buf()));
    }
    package(&summary, output_zip, ctx.dry_run)?;
    Ok(summary)
}

/// Process every unprocessed archive in `backend`, one at a time.
///
/// In a dry run the backend is wrapped in a [`ReadOnlyBackend`], archives are
/// still downloaded and processed in scratch space, and nothing is packed,
/// uploaded or deleted. A failing archive is reported and the rest carry
/// on.
///
/// # Errors
/// Only when the inbox itself cannot be listed.
#[instrument(skip_all, fields(backend = backend.name()))]
pub async fn process_inbox(backend: BackendHandle, ctx: &Context, options: &InboxOptions) -> Result<Vec<ArchiveReport>> {
    let backend: BackendHandle = if ctx.dry_run { Arc::new(ReadOnlyBackend::new(backend)) } else { backend };
    let archives: BackendHandle = Arc::new(ArchiveOnlyBackend::new(backend));
    let mut pending: Vec<PathBuf> = archives
        .list(None)
        .await
        .or_raise(|| ErrorKind::Storage)?
        .into_iter()
        .map(|info| info.path)
        .filter(|path| path.components().count() == 1)
        .filter(|path| {
            let done = is_processed(path, &options.processed_marker);
            if done {
                tracing::debug!(archive = %path.display(), "Already processed");
            }
            !done
        })
        .collect();
    pending.sort();
    tracing::info!(count = pending.len(), "Archives to process");

    let mut reports = Vec::with_capacity(pending.len());
    for archive in pending {
        let mut report = ArchiveReport { archive, uploaded: None, summary: RunSummary::default(), error: None };
        if let Err(e) = process_archive(&archives, ctx, options, &mut report).await {
            tracing::error!(archive = %report.archive.display(), error = ?e, "Archive failed");
            report.error = Some(e);
        }
        reports.push(report);
    }
    Ok(reports)
}

async fn process_archive(
    backend: &BackendHandle,
    ctx: &Context,
    options: &InboxOptions,
    report: &mut ArchiveReport,
) -> Result<()> {
    let remote = report.archive.clone();
    let scratch = tempfile::tempdir().or_raise(|| ErrorKind::Io)?;
    let data = backend.read(&remote).await.or_raise(|| ErrorKind::Storage)?;
    let local = scratch.path().join(remote.file_name().unwrap_or_default());
    tokio::fs::write(&local, &data).await.or_raise(|| ErrorKind::Io)?;
    tracing::info!(archive = %remote.display(), bytes = data.len(), "Downloaded archive");

    let root = bidsort_archive::extract(&local, &scratch.path().join("extracted")).or_raise(|| ErrorKind::Archive)?;
    report.summary = process_all(&root, ctx)?;
    if report.summary.projects.is_empty() {
        exn::bail!(ErrorKind::NoProjects(remote));
    }
    if ctx.dry_run {
        tracing::info!(archive = %remote.display(), "Would pack and upload results");
        return Ok(());
    }

    let processed = free_name(backend, &processed_name(&remote, &options.processed_marker)).await?;
    let packed = scratch.path().join(processed.file_name().unwrap_or_default());
    package(&report.summary, &packed, false)?;
    let bytes = tokio::fs::read(&packed).await.or_raise(|| ErrorKind::Io)?;
    backend.write(&processed, &bytes).await.or_raise(|| ErrorKind::Storage)?;
    tracing::info!(archive = %processed.display(), bytes = bytes.len(), "Uploaded result");
    report.uploaded = Some(processed);

    if options.delete_source {
        backend.delete(&remote).await.or_raise(|| ErrorKind::Storage)?;
        tracing::info!(archive = %remote.display(), "Deleted original archive");
    }
    Ok(())
}

/// `target`, or the first `"<stem> (n).zip"` beside it that the backend
/// doesn't hold yet.
async fn free_name(backend: &BackendHandle, target: &Path) -> Result<PathBuf> {
    let stem = target.file_stem().unwrap_or_default().to_string_lossy();
    let mut candidate = target.to_path_buf();
    let mut n = 1;
    while backend.exists(&candidate).await.or_raise(|| ErrorKind::Storage)? {
        candidate = target.with_file_name(format!("{stem} ({n}).zip"));
        n += 1;
    }
    if candidate != target {
        tracing::warn!(existing = %target.display(), upload = %candidate.display(), "Result already in inbox, keeping it");
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, snapshot, write};
    use bidsort_storage::backend::{LocalBackend, MockBackend};
    use std::fs;
    use std::io::Read;

    /// Zip bytes holding one project folder named `name`.
    fn project_zip(name: &str) -> Vec<u8> {
        let temp = tempfile::tempdir().unwrap();
        // `pack` names entries after the parent of each packed folder.
        let content = temp.path().join(name).join("content");
        write(content.join("1.pdf"), b"%PDF one");
        write(content.join("6.pdf"), b"%PDF six");
        write(content.join("8.pdf"), b"%PDF eight");
        write(content.join("7.docx"), b"docx");
        write(content.join("12/开评标资料/12/评审报告.pdf"), b"%PDF report");
        let zip = temp.path().join("out.zip");
        bidsort_archive::pack(&[content], &zip).unwrap();
        fs::read(zip).unwrap()
    }

    fn zip_entries(bytes: Vec<u8>) -> Vec<String> {
        let mut zip = zip_reader(bytes);
        let mut names: Vec<String> = (0..zip.len()).map(|i| zip.by_index(i).unwrap().name().to_string()).collect();
        names.sort();
        names
    }

    fn zip_reader(bytes: Vec<u8>) -> zip::ZipArchive<std::io::Cursor<Vec<u8>>> {
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap()
    }

    #[test]
    fn test_processed_name() {
        assert_eq!(processed_name(Path::new("in/项目A.zip"), PROCESSED_MARKER), PathBuf::from("in/项目A_已处理.zip"));
        assert!(is_processed(Path::new("项目A_已处理.zip"), PROCESSED_MARKER));
        assert!(!is_processed(Path::new("项目A.zip"), PROCESSED_MARKER));
    }

    #[tokio::test]
    async fn test_inbox_uploads_results_and_skips_processed() {
        let mock = Arc::new(MockBackend::with_files([
            ("项目A.zip", project_zip("项目A")),
            ("项目B_已处理.zip", b"PK".to_vec()),
            ("readme.txt", b"hello".to_vec()),
        ]));
        let backend: BackendHandle = mock.clone();
        let options = InboxOptions { delete_source: true, ..Default::default() };

        let reports = process_inbox(backend, &context(), &options).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_success(), "{:?}", reports[0].error);
        assert_eq!(reports[0].uploaded, Some(PathBuf::from("项目A_已处理.zip")));
        assert_eq!(
            mock.paths().await,
            vec![PathBuf::from("readme.txt"), PathBuf::from("项目A_已处理.zip"), PathBuf::from("项目B_已处理.zip")]
        );

        let uploaded = mock.read(Path::new("项目A_已处理.zip")).await.unwrap();
        let entries = zip_entries(uploaded.clone());
        assert!(entries.contains(&"项目A/4.pdf".to_string()), "{entries:?}");
        let mut report = String::new();
        zip_reader(uploaded).by_name("项目A/18评审报告.pdf").unwrap().read_to_string(&mut report).unwrap();
        assert_eq!(report, "%PDF report");
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let mock = Arc::new(MockBackend::with_files([("项目A.zip", project_zip("项目A"))]));
        let backend: BackendHandle = mock.clone();
        let mut ctx = context();
        ctx.dry_run = true;
        let options = InboxOptions { delete_source: true, ..Default::default() };

        let reports = process_inbox(backend, &ctx, &options).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].uploaded.is_none());
        assert_eq!(reports[0].summary.projects.len(), 1);
        assert_eq!(mock.paths().await, vec![PathBuf::from("项目A.zip")]);
    }

    #[tokio::test]
    async fn test_dry_run_leaves_local_inbox_unchanged() {
        let inbox = tempfile::tempdir().unwrap();
        fs::write(inbox.path().join("项目A.zip"), project_zip("项目A")).unwrap();
        fs::write(inbox.path().join("项目B_已处理.zip"), b"PK").unwrap();
        let before = snapshot(inbox.path());
        let backend: BackendHandle = Arc::new(LocalBackend::new("inbox", inbox.path()).unwrap());
        let mut ctx = context();
        ctx.dry_run = true;
        let options = InboxOptions { delete_source: true, ..Default::default() };

        let reports = process_inbox(backend, &ctx, &options).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].uploaded.is_none());
        assert_eq!(snapshot(inbox.path()), before);
    }

    #[tokio::test]
    async fn test_existing_result_is_not_overwritten() {
        let mock = Arc::new(MockBackend::with_files([
            ("项目A.zip", project_zip("项目A")),
            ("项目A_已处理.zip", b"PK earlier".to_vec()),
            ("项目A_已处理 (1).zip", b"PK earlier again".to_vec()),
        ]));
        let backend: BackendHandle = mock.clone();

        let reports = process_inbox(backend, &context(), &InboxOptions::default()).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].uploaded, Some(PathBuf::from("项目A_已处理 (2).zip")));
        assert_eq!(mock.read(Path::new("项目A_已处理.zip")).await.unwrap(), b"PK earlier");
        assert_eq!(mock.read(Path::new("项目A_已处理 (1).zip")).await.unwrap(), b"PK earlier again");
        assert!(zip_entries(mock.read(Path::new("项目A_已处理 (2).zip")).await.unwrap()).contains(&"项目A/1.pdf".to_string()));
    }

    #[tokio::test]
    async fn test_broken_archive_does_not_stop_others() {
        let mock = Arc::new(MockBackend::with_files([
            ("a-broken.zip", b"not a zip".to_vec()),
            ("b-项目.zip", project_zip("项目B")),
        ]));
        let backend: BackendHandle = mock.clone();

        let reports = process_inbox(backend, &context(), &InboxOptions::default()).await.unwrap();
        assert_eq!(reports.len(), 2);
        let broken = reports[0].error.as_ref().unwrap();
        assert!(matches!(&**broken, ErrorKind::Archive));
        assert!(reports[1].is_success());
        // Without delete_source the original stays.
        assert!(mock.paths().await.contains(&PathBuf::from("b-项目.zip")));
    }

    #[tokio::test]
    async fn test_archive_without_projects_is_not_uploaded() {
        let temp = tempfile::tempdir().unwrap();
        write(temp.path().join("stuff/content/notes.pdf"), b"%PDF");
        let zip = temp.path().join("empty.zip");
        bidsort_archive::pack(&[temp.path().join("stuff/content")], &zip).unwrap();
        let mock = Arc::new(MockBackend::with_files([("empty.zip", fs::read(zip).unwrap())]));
        let backend: BackendHandle = mock.clone();

        let options = InboxOptions { delete_source: true, ..Default::default() };
        let reports = process_inbox(backend, &context(), &options).await.unwrap();
        assert!(matches!(&**reports[0].error.as_ref().unwrap(), ErrorKind::NoProjects(_)));
        assert_eq!(mock.paths().await, vec![PathBuf::from("empty.zip")]);
    }

    #[test]
    fn test_local_archive() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("项目A.zip");
        fs::write(&archive, project_zip("项目A")).unwrap();
        let output = processed_name(&archive, PROCESSED_MARKER);
        let summary = process_local_archive(&archive, &output, &context()).unwrap();
        assert!(summary.is_success());
        assert!(zip_entries(fs::read(&output).unwrap()).contains(&"项目A/1.pdf".to_string()));
    }
}
