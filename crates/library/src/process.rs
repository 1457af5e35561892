use crate::error::{Error, ErrorKind, Result};
use crate::resolve::{Layout, resolve};
use crate::route::{Action, fs::merge_dir, route_into};
use crate::{Context, dedup, locate};
use derive_more::Display;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// How a project came out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ProjectStatus {
    #[display("success")]
    Success,
    /// Finished, but at least one step was skipped.
    #[display("partial")]
    Partial,
    /// Aborted.
    #[display("failed")]
    Failed,
}

/// The outcome of processing one project.
#[derive(Debug)]
pub struct ProjectReport {
    pub root: PathBuf,
    /// The project's final output folder (`root/1`).
    pub output: PathBuf,
    pub actions: Vec<Action>,
    pub status: ProjectStatus,
    /// Why the project failed, when it did.
    pub error: Option<Error>,
}
impl ProjectReport {
    fn failed(root: &Path, actions: Vec<Action>, error: Error) -> Self {
        tracing::error!(project = %root.display(), error = ?error, "Project failed");
        Self {
            root: root.to_path_buf(),
            output: root.join(crate::OUTPUT_DIR),
            actions,
            status: ProjectStatus::Failed,
            error: Some(error),
        }
    }

    pub fn skipped(&self) -> usize {
        self.actions.iter().filter(|a| a.is_skipped()).count()
    }
}

/// Route, merge back and dedup a single project.
///
/// Never returns an error: failures are captured in the report so that the
/// remaining projects of a run still get processed.
#[instrument(skip_all, fields(project = %root.display()))]
pub fn process_project(root: &Path, ctx: &Context) -> ProjectReport {
    let layout = match resolve(root) {
        Ok(layout) => layout,
        Err(e) => return ProjectReport::failed(root, Vec::new(), e),
    };
    let mut actions = Vec::new();
    if let Err(e) = route_into(&layout, ctx, &mut actions) {
        // A missing source is caught before anything moves. Any other
        // abort may leave documents staged, which still belong in `root/1`.
        if !matches!(&*e, ErrorKind::MissingSource { .. })
            && let Err(merge) = merge_back(&layout, ctx)
        {
            tracing::warn!(error = ?merge, "Could not merge staged output after failure");
        }
        return ProjectReport::failed(root, actions, e);
    }
    if let Err(e) = merge_back(&layout, ctx) {
        return ProjectReport::failed(root, actions, e);
    }

    let output = layout.final_output();
    match dedup(&output, ctx.dry_run, &ctx.image_extensions) {
        Ok(removed) => actions.extend(removed.into_iter().map(Action::Removed)),
        Err(e) => return ProjectReport::failed(root, actions, e),
    }

    let status = if actions.iter().any(Action::is_skipped) { ProjectStatus::Partial } else { ProjectStatus::Success };
    tracing::info!(project = %root.display(), status = %status, actions = actions.len(), "Project processed");
    ProjectReport { root: root.to_path_buf(), output, actions, status, error: None }
}

/// Move a staged output folder into `root/1`, merging with an existing one.
fn merge_back(layout: &Layout, ctx: &Context) -> Result<()> {
    let final_output = layout.final_output();
    if !layout.staged || !layout.output.is_dir() || layout.output == final_output {
        return Ok(());
    }
    if ctx.dry_run {
        tracing::info!(from = %layout.output.display(), to = %final_output.display(), "Would merge staged output");
        return Ok(());
    }
    if final_output.exists() {
        merge_dir(&layout.output, &final_output)?;
    } else {
        std::fs::rename(&layout.output, &final_output).or_raise(|| ErrorKind::Io)?;
    }
    tracing::info!(from = %layout.output.display(), to = %final_output.display(), "Merged staged output");
    Ok(())
}

/// Reports for every project of one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub projects: Vec<ProjectReport>,
}
impl RunSummary {
    pub fn count(&self, status: ProjectStatus) -> usize {
        self.projects.iter().filter(|p| p.status == status).count()
    }

    /// Final output folders of every project, for packing.
    pub fn outputs(&self) -> Vec<PathBuf> {
        self.projects.iter().map(|p| p.output.clone()).collect()
    }

    pub fn is_success(&self) -> bool {
        self.count(ProjectStatus::Failed) == 0
    }

    pub fn extend(&mut self, other: RunSummary) {
        self.projects.extend(other.projects);
    }
}

/// Locate and process every project at or below `root`, one at a time.
///
/// # Errors
/// Only when `root` itself cannot be scanned; per-project failures are in
/// the summary.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn process_all(root: &Path, ctx: &Context) -> Result<RunSummary> {
    let projects = locate(root, ctx.recursive)?;
    if projects.is_empty() {
        tracing::warn!("No project folders found (no directory contains a `12` folder)");
    }
    let summary = RunSummary { projects: projects.iter().map(|project| process_project(project, ctx)).collect() };
    tracing::info!(
        success = summary.count(ProjectStatus::Success),
        partial = summary.count(ProjectStatus::Partial),
        failed = summary.count(ProjectStatus::Failed),
        "Run complete"
    );
    Ok(summary)
}
