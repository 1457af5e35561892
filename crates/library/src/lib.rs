//! Project discovery, routing and dedup for bid-evaluation folders.
//!
//! A *project* is any directory with a child folder named `12`. For each
//! project found under a scan root, [`process_project`] gathers the scattered
//! evaluation documents into a single output folder `1` under fixed
//! positional names, converting and merging where needed, then removes
//! redundant `(n)`-suffixed copies.
//!
//! [`process_all`] drives one scan root; [`inbox::process_inbox`] repeats it
//! for every unprocessed zip archive in a [storage backend](bidsort_storage).

pub mod dedup;
pub mod error;
pub mod inbox;
pub mod locate;
mod process;
pub mod resolve;
pub mod route;
pub mod sort;

pub use crate::dedup::dedup;
pub use crate::locate::locate;
pub use crate::process::{ProjectReport, ProjectStatus, RunSummary, process_all, process_project};
pub use crate::resolve::{Layout, resolve};
pub use crate::route::{Action, SkipReason};
pub use crate::sort::{Collation, sort_names};

use bidsort_convert::{DocumentConverter, PdfMerger};

/// Name of the folder that marks a directory as a project root.
pub const PROJECT_MARKER: &str = "12";
/// Folder under `12` holding the numbered evaluation folders.
pub const MATERIALS_DIR: &str = "开评标资料";
/// Name of the output folder, relative to the project root.
pub const OUTPUT_DIR: &str = "1";

/// Optional features detected once at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Pinyin initials are available for sorting reviewer names.
    pub pinyin: bool,
}
impl Capabilities {
    pub fn detect() -> Self {
        Self { pinyin: cfg!(feature = "pinyin") }
    }

    pub fn collation(&self) -> Collation {
        if self.pinyin { Collation::Pinyin } else { Collation::Lexicographic }
    }
}

/// Everything a run needs besides the paths it operates on.
pub struct Context {
    /// Abort a project on a missing required source, a taken target name or
    /// a failed conversion.
    pub strict: bool,
    /// Report planned mutations without performing any.
    pub dry_run: bool,
    /// Search the whole subtree for projects rather than one level down.
    pub recursive: bool,
    /// Lowercase extensions (without dot) treated as images.
    pub image_extensions: Vec<String>,
    pub converter: DocumentConverter,
    pub merger: PdfMerger,
    pub capabilities: Capabilities,
}
impl Context {
    /// A strict, recursive context with the given tools.
    pub fn new(converter: DocumentConverter, merger: PdfMerger) -> Self {
        let capabilities = Capabilities::detect();
        if !capabilities.pinyin {
            tracing::warn!("Pinyin support not compiled in; reviewer names sort by code point");
        }
        if !converter.is_available() {
            tracing::warn!("No DOCX converter found; 7.docx cannot be converted");
        }
        if !merger.is_available() {
            tracing::warn!("No PDF merger found; reviewer documents cannot be merged");
        }
        Self {
            strict: true,
            dry_run: false,
            recursive: true,
            image_extensions: ["png", "jpg", "jpeg", "bmp", "tif", "tiff"].map(String::from).to_vec(),
            converter,
            merger,
            capabilities,
        }
    }

    pub fn collation(&self) -> Collation {
        self.capabilities.collation()
    }

    /// Whether `path` has one of the configured image extensions.
    pub fn is_image(&self, path: &std::path::Path) -> bool {
        has_extension(path, &self.image_extensions)
    }
}

/// Case-insensitive extension check against a list of lowercase extensions.
pub(crate) fn has_extension(path: &std::path::Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the unit tests.

    use super::*;
    use bidsort_convert::error::{ErrorKind as ConvertErrorKind, Result as ConvertResult};
    use bidsort_convert::{ConvertBackend, MergeBackend};
    use exn::ResultExt;
    use std::fs;
    use std::path::{Path, PathBuf};

    /// Writes a minimal PDF named after the input.
    pub struct FakeConverter;
    impl ConvertBackend for FakeConverter {
        fn name(&self) -> &str {
            "fake-converter"
        }

        fn convert_into(&self, docx: &Path, out_dir: &Path) -> ConvertResult<()> {
            let mut name = docx.file_stem().unwrap_or_default().to_os_string();
            name.push(".pdf");
            let body = fs::read(docx).or_raise(|| ConvertErrorKind::Io)?;
            let mut pdf = b"%PDF-1.7\n".to_vec();
            pdf.extend(body);
            fs::write(out_dir.join(name), pdf).or_raise(|| ConvertErrorKind::Io)
        }
    }

    /// Always fails.
    pub struct BrokenConverter;
    impl ConvertBackend for BrokenConverter {
        fn name(&self) -> &str {
            "broken-converter"
        }

        fn convert_into(&self, _docx: &Path, _out_dir: &Path) -> ConvertResult<()> {
            exn::bail!(ConvertErrorKind::ToolFailed("broken-converter".to_string()))
        }
    }

    /// Concatenates the inputs byte for byte behind a PDF header.
    pub struct FakeMerger;
    impl MergeBackend for FakeMerger {
        fn name(&self) -> &str {
            "fake-merger"
        }

        fn merge_into(&self, inputs: &[PathBuf], output: &Path) -> ConvertResult<()> {
            let mut pdf = b"%PDF-1.7\n".to_vec();
            for input in inputs {
                pdf.extend(fs::read(input).or_raise(|| ConvertErrorKind::Io)?);
            }
            fs::write(output, pdf).or_raise(|| ConvertErrorKind::Io)
        }
    }

    /// Context with working fake tools and lexicographic collation.
    pub fn context() -> Context {
        let mut ctx = Context::new(
            DocumentConverter::new(vec![Box::new(FakeConverter)]),
            PdfMerger::new(vec![Box::new(FakeMerger)]),
        );
        ctx.capabilities = Capabilities { pinyin: false };
        ctx
    }

    pub fn write(path: impl AsRef<Path>, contents: &[u8]) {
        let path = path.as_ref();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// A project with every numbered folder under `12/开评标资料` and all
    /// required root sources.
    pub fn full_project(root: &Path) {
        for n in 1..=12 {
            fs::create_dir_all(root.join(PROJECT_MARKER).join(MATERIALS_DIR).join(n.to_string())).unwrap();
        }
        write(root.join("1.pdf"), b"%PDF one");
        write(root.join("6.pdf"), b"%PDF six");
        write(root.join("8.pdf"), b"%PDF eight");
        write(root.join("7.docx"), b"docx seven");
    }

    /// Every file below `dir`, relative, with contents; sorted.
    pub fn snapshot(dir: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        let mut files: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| (e.path().strip_prefix(dir).unwrap().to_path_buf(), fs::read(e.path()).unwrap()))
            .collect();
        files.sort();
        files
    }

    /// Names of the files directly in `dir`, sorted.
    pub fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
