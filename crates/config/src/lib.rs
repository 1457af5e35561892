//! Layered configuration for bidsort.
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. The user configuration file, `config.{toml,yaml,yml,json}` in the
//!    platform configuration directory (e.g. `~/.config/bidsort/`).
//! 3. An explicit file passed on the command line; its format is chosen by
//!    extension.
//! 4. `BIDSORT_*` environment variables, with `__` separating nested keys
//!    (`BIDSORT_WEBDAV__URL`, `BIDSORT_CONVERTER__SOFFICE`).
//!
//! Command-line flags are applied by the binary on top of the result.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "BIDSORT_";
const USER_CONFIG_FILES: [&str; 4] = ["config.toml", "config.yaml", "config.yml", "config.json"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Abort a project on the first missing required file, conversion
    /// failure or name collision.
    pub strict: bool,
    /// Look for projects anywhere below the root, not just one level down.
    pub recursive: bool,
    /// Extensions (no dot, case-insensitive) treated as images.
    pub image_extensions: Vec<String>,
    /// Stem suffix that marks an archive as already processed.
    pub processed_marker: String,
    pub converter: ConverterConfig,
    pub merger: MergerConfig,
    pub webdav: WebDavConfig,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            strict: true,
            recursive: true,
            image_extensions: ["png", "jpg", "jpeg", "bmp", "tif", "tiff"].map(String::from).to_vec(),
            processed_marker: "_已处理".to_string(),
            converter: ConverterConfig::default(),
            merger: MergerConfig::default(),
            webdav: WebDavConfig::default(),
        }
    }
}

/// Explicit tool locations; unset means "search `PATH`".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub docx2pdf: Option<PathBuf>,
    pub soffice: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergerConfig {
    pub qpdf: Option<PathBuf>,
    pub pdfunite: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDavConfig {
    /// Collection holding the incoming archives.
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Delete each source archive once its processed copy is uploaded.
    pub delete_source: bool,
}

impl Config {
    /// Load from every source, see the [crate documentation](crate).
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let user_dir = ProjectDirs::from("", "", "bidsort").map(|dirs| dirs.config_dir().to_path_buf());
        Self::load_from(user_dir.as_deref(), explicit, Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn load_from(user_dir: Option<&Path>, explicit: Option<&Path>, env: Env) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(dir) = user_dir {
            for file in USER_CONFIG_FILES {
                let candidate = dir.join(file);
                if candidate.is_file() {
                    tracing::debug!(path = %candidate.display(), "Loading user configuration");
                    figment = merge_file(figment, &candidate)?;
                }
            }
        }
        if let Some(path) = explicit {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            tracing::debug!(path = %path.display(), "Loading configuration file");
            figment = merge_file(figment, path)?;
        }
        let config: Config = figment
            .merge(env)
            .extract()
            .or_raise(|| ErrorKind::Invalid("could not read configuration sources".to_string()))?;
        config.validated()
    }

    /// Normalize image extensions (lowercase, no leading dot) and reject
    /// values the organizer can't work with.
    fn validated(mut self) -> Result<Self> {
        self.image_extensions = self
            .image_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self.image_extensions.dedup();
        if self.processed_marker.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("processed_marker must not be empty".to_string()));
        }
        if let Some(url) = &self.webdav.url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            exn::bail!(ErrorKind::Invalid(format!("webdav.url must be an http(s) URL, got `{url}`")));
        }
        Ok(self)
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;

    /// An environment provider nothing in the test process sets.
    fn no_env() -> Env {
        Env::prefixed("BIDSORT_TEST_UNSET_PREFIX_").split("__")
    }

    #[test]
    fn test_defaults() {
        let config = Config::load_from(None, None, no_env()).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.strict);
        assert!(config.recursive);
        assert_eq!(config.processed_marker, "_已处理");
        assert!(config.image_extensions.contains(&"tiff".to_string()));
    }

    #[rstest]
    #[case::toml("custom.toml", "strict = false\n[webdav]\nurl = \"https://dav.example.com/bids/\"\ndelete_source = true\n")]
    #[case::yaml("custom.yaml", "strict: false\nwebdav:\n  url: https://dav.example.com/bids/\n  delete_source: true\n")]
    #[case::json("custom.json", r#"{"strict": false, "webdav": {"url": "https://dav.example.com/bids/", "delete_source": true}}"#)]
    fn test_explicit_file_formats(#[case] name: &str, #[case] contents: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        let config = Config::load_from(None, Some(&path), no_env()).unwrap();
        assert!(!config.strict);
        assert!(config.recursive);
        assert_eq!(config.webdav.url.as_deref(), Some("https://dav.example.com/bids/"));
        assert!(config.webdav.delete_source);
    }

    #[test]
    fn test_explicit_file_overrides_user_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.toml"), "recursive = false\nstrict = false\n").unwrap();
        let explicit = dir.path().join("override.yaml");
        fs::write(&explicit, "strict: true\n").unwrap();
        let config = Config::load_from(Some(dir.path()), Some(&explicit), no_env()).unwrap();
        assert!(!config.recursive);
        assert!(config.strict);
    }

    #[test]
    fn test_image_extensions_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.toml");
        fs::write(&path, "image_extensions = [\".PNG\", \"Jpg\", \"\"]\n").unwrap();
        let config = Config::load_from(None, Some(&path), no_env()).unwrap();
        assert_eq!(config.image_extensions, vec!["png".to_string(), "jpg".to_string()]);
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_from(None, Some(&dir.path().join("nope.toml")), no_env()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        fs::write(&path, "strict=false").unwrap();
        let err = Config::load_from(None, Some(&path), no_env()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
    }

    #[rstest]
    #[case::wrong_type("strict = \"sometimes\"\n")]
    #[case::empty_marker("processed_marker = \"  \"\n")]
    #[case::bad_url("[webdav]\nurl = \"ftp://example.com\"\n")]
    fn test_invalid_values(#[case] contents: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, contents).unwrap();
        let err = Config::load_from(None, Some(&path), no_env()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }
}
