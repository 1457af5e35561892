//! Routing documents into the output folder.
//!
//! Documents are gathered from the project root and the numbered folders
//! according to three fixed tables, applied in order:
//!
//! 1. [`ROUTING_TABLE`]: single files moved (or converted) to a new name.
//! 2. [`MERGE_TABLE`]: one PDF per reviewer, merged in name order.
//! 3. Images next to the project's documents, copied as-is.
//!
//! Every step is reported as an [`Action`]; in a dry run the same actions are
//! reported and nothing is touched.

pub(crate) mod fs;
mod images;
mod merge;

use crate::Context;
use crate::error::{ErrorKind, Result};
use crate::resolve::Layout;
use derive_more::Display;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use tracing::instrument;

pub use self::fs::unique_path;
pub use self::merge::{MERGE_TABLE, MergeRule};

/// Where a routing rule's source lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// A file directly in the project root.
    Root(&'static str),
    /// A file in numbered folder `n` of the numbered base.
    Numbered(u8, &'static str),
}
impl Source {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Root(name) | Self::Numbered(_, name) => name,
        }
    }

    /// Absolute source path, or `None` when the numbered folder is absent.
    pub fn path(&self, layout: &Layout) -> Option<PathBuf> {
        match *self {
            Self::Root(name) => Some(layout.root.join(name)),
            Self::Numbered(n, name) => layout.numbered(n).map(|dir| dir.join(name)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Move,
    /// DOCX converted to PDF; the source stays where it is.
    Convert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingRule {
    pub source: Source,
    pub target: &'static str,
    pub placement: Placement,
    pub required: bool,
}

const fn rule(source: Source, target: &'static str, placement: Placement, required: bool) -> RoutingRule {
    RoutingRule { source, target, placement, required }
}

/// Single-file rules, in application order.
pub const ROUTING_TABLE: [RoutingRule; 11] = [
    rule(Source::Root("1.pdf"), "1.pdf", Placement::Move, true),
    rule(Source::Root("6.pdf"), "2.pdf", Placement::Move, true),
    rule(Source::Root("8.pdf"), "5.pdf", Placement::Move, true),
    rule(Source::Root("7.docx"), "4.pdf", Placement::Convert, true),
    rule(Source::Numbered(1, "评标委员会成员签到表.pdf"), "7评标委员会成员签到表.pdf", Placement::Move, false),
    rule(Source::Numbered(2, "评标委员会声明书.pdf"), "8评标委员会声明书.pdf", Placement::Move, false),
    rule(Source::Numbered(5, "未通过初步评审等情况汇总表.pdf"), "11未通过初步评审等情况汇总表.pdf", Placement::Move, false),
    rule(Source::Numbered(9, "投标报价得分汇总表.pdf"), "15投标报价得分汇总表.pdf", Placement::Move, false),
    rule(Source::Numbered(10, "评分汇总及得分记录表.pdf"), "16评分汇总及得分记录表.pdf", Placement::Move, false),
    rule(Source::Numbered(11, "承包商排序表.pdf"), "17承包商排序表.pdf", Placement::Move, false),
    rule(Source::Numbered(12, "评审报告.pdf"), "18评审报告.pdf", Placement::Move, false),
];

/// Why a step was left out.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SkipReason {
    #[display("source missing: {}", _0.display())]
    MissingSource(PathBuf),
    #[display("numbered folder {_0} missing")]
    MissingFolder(u8),
    #[display("only {_0} reviewer folders with a PDF")]
    TooFewReviewers(usize),
    #[display("conversion failed")]
    ConversionFailed,
    #[display("merge failed")]
    MergeFailed,
}

/// One step taken (or, in a dry run, planned) for a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Moved { from: PathBuf, to: PathBuf },
    Converted { from: PathBuf, to: PathBuf },
    Merged { inputs: Vec<PathBuf>, to: PathBuf },
    Copied { from: PathBuf, to: PathBuf },
    /// Deleted as a redundant duplicate.
    Removed(PathBuf),
    Skipped { item: String, reason: SkipReason },
}
impl Action {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Check that every required source exists, before anything is touched.
///
/// # Errors
/// [`MissingSource`](ErrorKind::MissingSource) naming the first absent file.
pub fn preflight(layout: &Layout) -> Result<()> {
    for rule in ROUTING_TABLE.iter().filter(|r| r.required) {
        if !rule.source.path(layout).is_some_and(|p| p.is_file()) {
            exn::bail!(ErrorKind::MissingSource {
                file: rule.source.file_name().to_string(),
                project: layout.root.clone(),
            });
        }
    }
    Ok(())
}

/// Route one project's documents into `layout.output`.
///
/// In strict mode a missing required source aborts before any change, and a
/// taken target name or failed conversion aborts the project. Otherwise those
/// are recorded as [`Action::Skipped`] and routing continues.
pub fn route(layout: &Layout, ctx: &Context) -> Result<Vec<Action>> {
    let mut actions = Vec::new();
    route_into(layout, ctx, &mut actions)?;
    Ok(actions)
}

/// [`route`], recording into `actions` as it goes.
///
/// When routing aborts, `actions` still holds every step completed before
/// the failure.
#[instrument(skip_all, fields(project = %layout.root.display(), dry_run = ctx.dry_run))]
pub fn route_into(layout: &Layout, ctx: &Context, actions: &mut Vec<Action>) -> Result<()> {
    if ctx.strict {
        preflight(layout)?;
    }
    if !ctx.dry_run {
        std::fs::create_dir_all(&layout.output).or_raise(|| ErrorKind::Io)?;
    }
    for rule in &ROUTING_TABLE {
        actions.push(apply_rule(rule, layout, ctx)?);
    }
    for rule in &MERGE_TABLE {
        actions.push(merge::apply(rule, layout, ctx)?);
    }
    actions.extend(images::collect(layout, ctx)?);
    Ok(())
}

fn apply_rule(rule: &RoutingRule, layout: &Layout, ctx: &Context) -> Result<Action> {
    let source = match rule.source {
        Source::Root(name) => layout.root.join(name),
        Source::Numbered(n, name) => match layout.numbered(n) {
            Some(dir) => dir.join(name),
            None => {
                tracing::warn!(folder = n, target = rule.target, "Numbered folder missing; skipping");
                return Ok(Action::Skipped { item: rule.target.to_string(), reason: SkipReason::MissingFolder(n) });
            },
        },
    };
    if !source.is_file() {
        if ctx.strict && rule.required {
            exn::bail!(ErrorKind::MissingSource {
                file: rule.source.file_name().to_string(),
                project: layout.root.clone(),
            });
        }
        tracing::warn!(source = %source.display(), "Source file missing; skipping");
        return Ok(Action::Skipped { item: rule.target.to_string(), reason: SkipReason::MissingSource(source) });
    }
    let target = layout.output.join(rule.target);
    match rule.placement {
        Placement::Move => {
            let to = fs::destination(&target, ctx.strict)?;
            if !ctx.dry_run {
                fs::move_file(&source, &to)?;
            }
            tracing::info!(from = %source.display(), to = %to.display(), dry_run = ctx.dry_run, "Moved");
            Ok(Action::Moved { from: source, to })
        },
        Placement::Convert => convert(&source, &target, layout, ctx),
    }
}

fn convert(source: &Path, target: &Path, layout: &Layout, ctx: &Context) -> Result<Action> {
    if ctx.dry_run {
        let to = fs::destination(target, ctx.strict)?;
        tracing::info!(from = %source.display(), to = %to.display(), "Would convert");
        return Ok(Action::Converted { from: source.to_path_buf(), to });
    }
    let scratch = scratch_dir(&layout.output)?;
    let produced = scratch.path().join(target.file_name().unwrap_or_default());
    if let Err(e) = ctx.converter.convert(source, &produced) {
        if ctx.strict {
            return Err(e).or_raise(|| ErrorKind::Conversion(source.to_path_buf()));
        }
        tracing::warn!(source = %source.display(), error = ?e, "Conversion failed; skipping");
        return Ok(Action::Skipped {
            item: target.file_name().unwrap_or_default().to_string_lossy().into_owned(),
            reason: SkipReason::ConversionFailed,
        });
    }
    let to = fs::destination(target, ctx.strict)?;
    fs::move_file(&produced, &to)?;
    tracing::info!(from = %source.display(), to = %to.display(), "Converted");
    Ok(Action::Converted { from: source.to_path_buf(), to })
}

/// Hidden temporary directory inside the output folder, removed on drop.
pub(crate) fn scratch_dir(output: &Path) -> Result<tempfile::TempDir> {
    tempfile::Builder::new().prefix(".bidsort-").tempdir_in(output).or_raise(|| ErrorKind::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::resolve;
    use crate::testing::{BrokenConverter, context, full_project, names, snapshot, write};
    use bidsort_convert::DocumentConverter;
    use std::fs as stdfs;

    #[test]
    fn test_routing_table_targets_are_unique() {
        let mut targets: Vec<_> = ROUTING_TABLE.iter().map(|r| r.target).chain(MERGE_TABLE.iter().map(|r| r.target)).collect();
        targets.sort();
        targets.dedup();
        assert_eq!(targets.len(), ROUTING_TABLE.len() + MERGE_TABLE.len());
    }

    #[test]
    fn test_only_root_rules_are_required() {
        for rule in &ROUTING_TABLE {
            assert_eq!(rule.required, matches!(rule.source, Source::Root(_)), "{}", rule.target);
        }
    }

    #[test]
    fn test_routes_root_and_numbered_files() {
        let temp = tempfile::tempdir().unwrap();
        full_project(temp.path());
        let materials = temp.path().join("12/开评标资料");
        write(materials.join("1/评标委员会成员签到表.pdf"), b"%PDF sign-in");
        write(materials.join("12/评审报告.pdf"), b"%PDF report");
        let layout = resolve(temp.path()).unwrap();
        let ctx = context();

        let actions = route(&layout, &ctx).unwrap();
        assert_eq!(
            names(&layout.output),
            vec!["1.pdf", "18评审报告.pdf", "2.pdf", "4.pdf", "5.pdf", "7评标委员会成员签到表.pdf"]
        );
        assert_eq!(stdfs::read(layout.output.join("2.pdf")).unwrap(), b"%PDF six");
        assert!(!temp.path().join("6.pdf").exists());
        // Converted sources stay in place.
        assert!(temp.path().join("7.docx").exists());
        assert!(actions.contains(&Action::Skipped {
            item: "8评标委员会声明书.pdf".to_string(),
            reason: SkipReason::MissingSource(materials.join("2/评标委员会声明书.pdf")),
        }));
    }

    #[test]
    fn test_strict_missing_required_changes_nothing() {
        let temp = tempfile::tempdir().unwrap();
        full_project(temp.path());
        stdfs::remove_file(temp.path().join("8.pdf")).unwrap();
        let before = snapshot(temp.path());
        let layout = resolve(temp.path()).unwrap();

        let err = route(&layout, &context()).unwrap_err();
        match &*err {
            ErrorKind::MissingSource { file, .. } => assert_eq!(file, "8.pdf"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(snapshot(temp.path()), before);
        assert!(!layout.output.exists());
    }

    #[test]
    fn test_non_strict_skips_missing_required() {
        let temp = tempfile::tempdir().unwrap();
        full_project(temp.path());
        stdfs::remove_file(temp.path().join("8.pdf")).unwrap();
        let layout = resolve(temp.path()).unwrap();
        let mut ctx = context();
        ctx.strict = false;

        let actions = route(&layout, &ctx).unwrap();
        assert!(actions.iter().any(|a| matches!(a, Action::Skipped { item, .. } if item == "5.pdf")));
        assert!(layout.output.join("1.pdf").exists());
    }

    #[test]
    fn test_strict_target_collision_aborts() {
        let temp = tempfile::tempdir().unwrap();
        full_project(temp.path());
        write(temp.path().join("12/开评标资料/1/1.pdf"), b"%PDF earlier run");
        let layout = resolve(temp.path()).unwrap();
        let err = route(&layout, &context()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::TargetExists(_)));
    }

    #[test]
    fn test_non_strict_collision_suffixes() {
        let temp = tempfile::tempdir().unwrap();
        full_project(temp.path());
        write(temp.path().join("12/开评标资料/1/1.pdf"), b"%PDF earlier run");
        let layout = resolve(temp.path()).unwrap();
        let mut ctx = context();
        ctx.strict = false;
        route(&layout, &ctx).unwrap();
        assert_eq!(stdfs::read(layout.output.join("1.pdf")).unwrap(), b"%PDF earlier run");
        assert_eq!(stdfs::read(layout.output.join("1 (1).pdf")).unwrap(), b"%PDF one");
    }

    #[test]
    fn test_conversion_failure() {
        let temp = tempfile::tempdir().unwrap();
        full_project(temp.path());
        let layout = resolve(temp.path()).unwrap();
        let mut ctx = context();
        ctx.converter = DocumentConverter::new(vec![Box::new(BrokenConverter)]);

        ctx.strict = false;
        let actions = route(&layout, &ctx).unwrap();
        assert!(actions.contains(&Action::Skipped { item: "4.pdf".to_string(), reason: SkipReason::ConversionFailed }));
        assert!(!layout.output.join("4.pdf").exists());
        // No scratch directories are left behind.
        assert!(stdfs::read_dir(&layout.output).unwrap().all(|e| e.unwrap().path().is_file()));
    }

    #[test]
    fn test_strict_conversion_failure_aborts() {
        let temp = tempfile::tempdir().unwrap();
        full_project(temp.path());
        let layout = resolve(temp.path()).unwrap();
        let mut ctx = context();
        ctx.converter = DocumentConverter::new(vec![Box::new(BrokenConverter)]);
        let err = route(&layout, &ctx).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Conversion(_)));
    }

    #[test]
    fn test_aborted_route_keeps_completed_actions() {
        let temp = tempfile::tempdir().unwrap();
        full_project(temp.path());
        let layout = resolve(temp.path()).unwrap();
        let mut ctx = context();
        ctx.converter = DocumentConverter::new(vec![Box::new(BrokenConverter)]);
        let mut actions = Vec::new();
        let err = route_into(&layout, &ctx, &mut actions).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Conversion(_)));
        // The three root PDFs ahead of `7.docx` were already moved.
        assert_eq!(actions, vec![
            Action::Moved { from: temp.path().join("1.pdf"), to: layout.output.join("1.pdf") },
            Action::Moved { from: temp.path().join("6.pdf"), to: layout.output.join("2.pdf") },
            Action::Moved { from: temp.path().join("8.pdf"), to: layout.output.join("5.pdf") },
        ]);
        assert!(layout.output.join("5.pdf").is_file());
    }

    #[test]
    fn test_converter_fallback_produces_target() {
        let temp = tempfile::tempdir().unwrap();
        full_project(temp.path());
        let layout = resolve(temp.path()).unwrap();
        let mut ctx = context();
        ctx.converter =
            DocumentConverter::new(vec![Box::new(BrokenConverter), Box::new(crate::testing::FakeConverter)]);
        route(&layout, &ctx).unwrap();
        assert_eq!(stdfs::read(layout.output.join("4.pdf")).unwrap(), b"%PDF-1.7\ndocx seven");
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let temp = tempfile::tempdir().unwrap();
        full_project(temp.path());
        write(temp.path().join("12/开评标资料/2/评标委员会声明书.pdf"), b"%PDF statement");
        write(temp.path().join("seal.png"), b"png");
        let before = snapshot(temp.path());
        let layout = resolve(temp.path()).unwrap();
        let mut ctx = context();
        ctx.dry_run = true;

        let actions = route(&layout, &ctx).unwrap();
        assert_eq!(snapshot(temp.path()), before);
        assert!(!layout.output.exists());
        assert!(actions.contains(&Action::Moved {
            from: temp.path().join("6.pdf"),
            to: layout.output.join("2.pdf"),
        }));
        assert!(actions.iter().any(|a| matches!(a, Action::Converted { .. })));
        assert!(actions.iter().any(|a| matches!(a, Action::Copied { .. })));
    }
}
