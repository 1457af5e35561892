use crate::error::{ErrorKind, Result};
use bidsort_config::Config;
use clap::{ArgAction, Args, Parser};
use std::path::PathBuf;

/// Organize bid-evaluation project folders into their numbered output
/// layout.
///
/// A project is any folder containing a `12` folder. Its documents are moved,
/// converted and merged into the project's `1` folder under fixed names.
#[derive(Debug, Parser)]
#[command(name = "bidsort", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub input: Input,

    /// Pack every project's output folder into this zip.
    #[arg(long, value_name = "ZIP")]
    pub output_zip: Option<PathBuf>,

    /// Report what would be done without changing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Only look for projects in the root and its immediate subfolders.
    #[arg(long)]
    pub no_recursive: bool,

    /// Skip missing files, failed conversions and taken names instead of
    /// failing the project.
    #[arg(long)]
    pub non_strict: bool,

    /// Configuration file (TOML, YAML or JSON).
    #[arg(long, value_name = "FILE", env = "BIDSORT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub webdav: WebDavArgs,

    /// More logging; repeat for more detail.
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long)]
    pub quiet: bool,
}

/// Where the projects come from. At most one; with none given, the WebDAV
/// URL from configuration is used.
#[derive(Debug, Args)]
#[group(multiple = false)]
pub struct Input {
    /// Directory to scan for projects.
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Zip archive of projects; extracted to a temporary directory.
    #[arg(long, value_name = "ZIP")]
    pub archive: Option<PathBuf>,

    /// Directory of zip archives, each processed like `--archive`.
    #[arg(long, value_name = "DIR")]
    pub inbox: Option<PathBuf>,

    /// WebDAV folder of zip archives.
    #[arg(long, value_name = "URL")]
    pub webdav_url: Option<String>,
}

#[derive(Debug, Args)]
pub struct WebDavArgs {
    #[arg(long, value_name = "USER")]
    pub webdav_username: Option<String>,

    #[arg(long, value_name = "PASSWORD")]
    pub webdav_password: Option<String>,

    /// Delete each original archive once its result is uploaded.
    #[arg(long)]
    pub webdav_delete_source: bool,
}

/// A resolved input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Root(PathBuf),
    Archive(PathBuf),
    Inbox(PathBuf),
    WebDav { url: String, username: Option<String>, password: Option<String> },
}

impl Cli {
    /// `-q` is -1, each `-v` adds one.
    pub fn verbosity(&self) -> i8 {
        if self.quiet { -1 } else { i8::try_from(self.verbose).unwrap_or(i8::MAX) }
    }

    /// Apply command line overrides to the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if self.non_strict {
            config.strict = false;
        }
        if self.no_recursive {
            config.recursive = false;
        }
        if self.webdav.webdav_delete_source {
            config.webdav.delete_source = true;
        }
        if let Some(url) = &self.input.webdav_url {
            config.webdav.url = Some(url.clone());
        }
        if let Some(username) = &self.webdav.webdav_username {
            config.webdav.username = Some(username.clone());
        }
        if let Some(password) = &self.webdav.webdav_password {
            config.webdav.password = Some(password.clone());
        }
    }

    /// Warning for an `--output-zip` that an inbox run can't honour.
    pub fn ignored_output_zip(&self, config: &Config) -> Option<String> {
        self.output_zip.as_ref().map(|_| {
            format!(
                "--output-zip is ignored for inboxes; each archive gets its own `<name>{}.zip`",
                config.processed_marker
            )
        })
    }

    /// Pick the input, falling back to a configured WebDAV URL.
    pub fn source(&self, config: &Config) -> Result<Source> {
        let input = &self.input;
        if let Some(root) = &input.root {
            return Ok(Source::Root(root.clone()));
        }
        if let Some(archive) = &input.archive {
            return Ok(Source::Archive(archive.clone()));
        }
        if let Some(inbox) = &input.inbox {
            return Ok(Source::Inbox(inbox.clone()));
        }
        match &config.webdav.url {
            Some(url) => Ok(Source::WebDav {
                url: url.clone(),
                username: config.webdav.username.clone(),
                password: config.webdav.password.clone(),
            }),
            None => exn::bail!(ErrorKind::NoSource),
        }
    }
}
