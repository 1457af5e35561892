//! Per-reviewer documents merged into one PDF per numbered folder.
//!
//! Each reviewer has a subfolder named after them (in Chinese) holding their
//! signed form. The first three reviewers in name order contribute their
//! first PDF, optionally followed by a summary sheet from the folder itself.

use super::{Action, SkipReason, fs, scratch_dir};
use crate::Context;
use crate::error::{ErrorKind, Result};
use crate::resolve::Layout;
use crate::sort::{Collation, first_han, sort_by_name};
use exn::ResultExt;
use std::path::{Path, PathBuf};

/// Reviewers whose documents go into each merged PDF.
pub const REVIEWERS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRule {
    /// Numbered folder holding the reviewer subfolders.
    pub folder: u8,
    pub target: &'static str,
    /// File in the numbered folder appended after the reviewer PDFs.
    pub trailer: Option<&'static str>,
}

pub const MERGE_TABLE: [MergeRule; 5] = [
    MergeRule { folder: 3, target: "9.pdf", trailer: Some("初步评审标准及记录表.pdf") },
    MergeRule { folder: 4, target: "10.pdf", trailer: Some("初步评审标准及记录表（其他情况）.pdf") },
    MergeRule { folder: 6, target: "12.pdf", trailer: None },
    MergeRule { folder: 7, target: "13.pdf", trailer: None },
    MergeRule { folder: 8, target: "14.pdf", trailer: None },
];

fn skipped(rule: &MergeRule, reason: SkipReason) -> Action {
    tracing::warn!(target_file = rule.target, reason = %reason, "Skipping merge");
    Action::Skipped { item: rule.target.to_string(), reason }
}

pub(super) fn apply(rule: &MergeRule, layout: &Layout, ctx: &Context) -> Result<Action> {
    let Some(folder) = layout.numbered(rule.folder) else {
        return Ok(skipped(rule, SkipReason::MissingFolder(rule.folder)));
    };
    let reviewers = reviewer_dirs(&folder, ctx.collation())?;
    let mut inputs = Vec::with_capacity(REVIEWERS + 1);
    for reviewer in reviewers.iter().take(REVIEWERS) {
        if let Some(pdf) = first_pdf(reviewer)? {
            inputs.push(pdf);
        }
    }
    if inputs.len() < REVIEWERS {
        return Ok(skipped(rule, SkipReason::TooFewReviewers(inputs.len())));
    }
    if let Some(trailer) = rule.trailer {
        let trailer = folder.join(trailer);
        if !trailer.is_file() {
            return Ok(skipped(rule, SkipReason::MissingSource(trailer)));
        }
        inputs.push(trailer);
    }

    let target = layout.output.join(rule.target);
    if ctx.dry_run {
        let to = fs::destination(&target, ctx.strict)?;
        tracing::info!(to = %to.display(), inputs = inputs.len(), "Would merge");
        return Ok(Action::Merged { inputs, to });
    }
    let scratch = scratch_dir(&layout.output)?;
    let produced = scratch.path().join(rule.target);
    if let Err(e) = ctx.merger.merge(&inputs, &produced) {
        tracing::warn!(error = ?e, "Merge failed");
        return Ok(skipped(rule, SkipReason::MergeFailed));
    }
    let to = fs::destination(&target, ctx.strict)?;
    fs::move_file(&produced, &to)?;
    tracing::info!(to = %to.display(), inputs = inputs.len(), "Merged");
    Ok(Action::Merged { inputs, to })
}

/// Subfolders whose name contains a Han character, in collation order.
fn reviewer_dirs(folder: &Path, collation: Collation) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = children(folder)?
        .into_iter()
        .filter(|p| p.is_dir() && p.file_name().and_then(|n| n.to_str()).and_then(first_han).is_some())
        .collect();
    sort_by_name(&mut dirs, collation, |p| p.file_name().and_then(|n| n.to_str()).unwrap_or_default());
    Ok(dirs)
}

/// The first PDF in `dir` by name.
fn first_pdf(dir: &Path) -> Result<Option<PathBuf>> {
    let pdf = ["pdf".to_string()];
    Ok(children(dir)?.into_iter().filter(|p| p.is_file() && crate::has_extension(p, &pdf)).min())
}

fn children(dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::read_dir(dir)
        .or_raise(|| ErrorKind::Io)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()
        .or_raise(|| ErrorKind::Io)
}
