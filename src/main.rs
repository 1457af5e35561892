mod cli;
mod error;
mod logging;

use crate::cli::{Cli, Source};
use crate::error::{ErrorKind, Result};
use bidsort_config::Config;
use bidsort_convert::{DocumentConverter, PdfMerger};
use bidsort_library::inbox::{ArchiveReport, InboxOptions, package, process_inbox, process_local_archive, processed_name};
use bidsort_library::{Context, ProjectStatus, RunSummary, process_all};
use bidsort_storage::BackendHandle;
use bidsort_storage::backend::LocalBackend;
use clap::Parser;
use exn::ResultExt;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbosity());
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = ?e, "{}", &*e);
            ExitCode::from(2)
        },
    }
}

/// Returns whether every project (and archive) succeeded.
fn run(cli: &Cli) -> Result<bool> {
    let mut config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    cli.apply(&mut config);
    let source = cli.source(&config)?;
    let ctx = context(&config, cli.dry_run);
    tracing::info!(source = ?source, dry_run = ctx.dry_run, strict = ctx.strict, recursive = ctx.recursive, "Starting");

    match source {
        Source::Root(root) => {
            let summary = process_all(&root, &ctx).or_raise(|| ErrorKind::Source(root.clone()))?;
            if let Some(zip) = &cli.output_zip {
                package(&summary, zip, ctx.dry_run).or_raise(|| ErrorKind::Library)?;
            }
            print_summary(&summary);
            Ok(summary.is_success())
        },
        Source::Archive(archive) => {
            let output = cli.output_zip.clone().unwrap_or_else(|| processed_name(&archive, &config.processed_marker));
            let summary =
                process_local_archive(&archive, &output, &ctx).or_raise(|| ErrorKind::Source(archive.clone()))?;
            print_summary(&summary);
            if !ctx.dry_run {
                println!("Packed results into {}", output.display());
            }
            Ok(summary.is_success())
        },
        Source::Inbox(dir) => {
            let dir = std::path::absolute(&dir).or_raise(|| ErrorKind::Source(dir.clone()))?;
            let backend = LocalBackend::new("inbox", &dir).or_raise(|| ErrorKind::Source(dir.clone()))?;
            run_inbox(cli, Arc::new(backend), &ctx, &config)
        },
        Source::WebDav { url, username, password } => run_webdav(cli, &url, username, password, &ctx, &config),
    }
}

#[cfg(feature = "webdav")]
fn run_webdav(
    cli: &Cli,
    url: &str,
    username: Option<String>,
    password: Option<String>,
    ctx: &Context,
    config: &Config,
) -> Result<bool> {
    let backend = bidsort_storage::backend::WebDavBackend::new("webdav", url, username, password)
        .or_raise(|| ErrorKind::Source(url.into()))?;
    run_inbox(cli, Arc::new(backend), ctx, config)
}

#[cfg(not(feature = "webdav"))]
fn run_webdav(
    _cli: &Cli,
    _url: &str,
    _username: Option<String>,
    _password: Option<String>,
    _ctx: &Context,
    _config: &Config,
) -> Result<bool> {
    exn::bail!(ErrorKind::Unsupported("WebDAV"))
}

fn run_inbox(cli: &Cli, backend: BackendHandle, ctx: &Context, config: &Config) -> Result<bool> {
    if let Some(warning) = cli.ignored_output_zip(config) {
        tracing::warn!("{warning}");
    }
    let options =
        InboxOptions { delete_source: config.webdav.delete_source, processed_marker: config.processed_marker.clone() };
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .or_raise(|| ErrorKind::Runtime)?;
    let reports = runtime.block_on(process_inbox(backend, ctx, &options)).or_raise(|| ErrorKind::Library)?;
    for report in &reports {
        print_archive(report);
    }
    if reports.is_empty() {
        println!("No unprocessed archives found.");
    }
    Ok(reports.iter().all(ArchiveReport::is_success))
}

fn context(config: &Config, dry_run: bool) -> Context {
    let converter = DocumentConverter::discover(config.converter.docx2pdf.as_deref(), config.converter.soffice.as_deref());
    let merger = PdfMerger::discover(config.merger.qpdf.as_deref(), config.merger.pdfunite.as_deref());
    let mut ctx = Context::new(converter, merger);
    ctx.strict = config.strict;
    ctx.recursive = config.recursive;
    ctx.dry_run = dry_run;
    ctx.image_extensions = config.image_extensions.clone();
    ctx
}

fn print_archive(report: &ArchiveReport) {
    println!("== {}", report.archive.display());
    print_summary(&report.summary);
    if let Some(uploaded) = &report.uploaded {
        println!("Uploaded {}", uploaded.display());
    }
    if let Some(error) = &report.error {
        println!("Archive failed: {}", &**error);
    }
}

fn print_summary(summary: &RunSummary) {
    for project in &summary.projects {
        println!("{:>8}  {}", project.status.to_string(), display_name(&project.root));
        if let Some(error) = &project.error {
            println!("          {}", &**error);
        }
    }
    println!(
        "{} succeeded, {} partial, {} failed",
        summary.count(ProjectStatus::Success),
        summary.count(ProjectStatus::Partial),
        summary.count(ProjectStatus::Failed),
    );
}

fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}
