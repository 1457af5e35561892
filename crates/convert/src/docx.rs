use crate::error::{ErrorKind, Result};
use crate::tool::{locate, run, scratch_dir, verify_pdf};
use exn::{OptionExt, ResultExt};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::instrument;

const LIBREOFFICE_FLATPAK: &str = "org.libreoffice.LibreOffice";

/// One way of turning a `.docx` into a PDF.
pub trait ConvertBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Convert `docx`, writing `<stem>.pdf` into `out_dir`.
    fn convert_into(&self, docx: &Path, out_dir: &Path) -> Result<()>;
}

/// The `docx2pdf` command line tool (Word automation on Windows/macOS).
pub struct Docx2Pdf {
    path: PathBuf,
}
impl Docx2Pdf {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn discover(explicit: Option<&Path>) -> Option<Self> {
        locate(explicit, &["docx2pdf"]).map(Self::new)
    }
}
impl ConvertBackend for Docx2Pdf {
    fn name(&self) -> &str {
        "docx2pdf"
    }

    fn convert_into(&self, docx: &Path, out_dir: &Path) -> Result<()> {
        let target = out_dir.join(pdf_name(docx)?);
        run(self.name(), Command::new(&self.path).arg(docx).arg(target))
    }
}

/// LibreOffice in headless mode.
pub enum LibreOffice {
    /// A directly executable `soffice`/`libreoffice` binary.
    Binary { path: PathBuf },
    /// The Flatpak-installed application.
    Flatpak { flatpak: PathBuf, app_id: String },
}
impl LibreOffice {
    pub fn discover(explicit: Option<&Path>) -> Option<Self> {
        if let Some(path) = locate(explicit, &["soffice", "libreoffice"]) {
            return Some(Self::Binary { path });
        }
        tracing::info!("LibreOffice executable not found in PATH");
        let Ok(flatpak) = which::which("flatpak") else {
            tracing::info!("Flatpak not found; skipping containerized LibreOffice check");
            return None;
        };
        tracing::trace!(flatpak = %flatpak.display(), "Discovered Flatpak on system; searching installed apps");
        Command::new(&flatpak)
            .args(["info", LIBREOFFICE_FLATPAK])
            .output()
            .is_ok_and(|o| o.status.success())
            .then(|| Self::Flatpak { flatpak, app_id: LIBREOFFICE_FLATPAK.to_string() })
    }
}
impl ConvertBackend for LibreOffice {
    fn name(&self) -> &str {
        match self {
            Self::Binary { .. } => "soffice",
            Self::Flatpak { .. } => "libreoffice-flatpak",
        }
    }

    fn convert_into(&self, docx: &Path, out_dir: &Path) -> Result<()> {
        let mut command = match self {
            Self::Binary { path } => Command::new(path),
            Self::Flatpak { flatpak, app_id } => {
                let mut command = Command::new(flatpak);
                command.args(["run", "--command=soffice"]);
                // The sandbox only sees paths that are granted explicitly.
                command.arg(filesystem_grant(out_dir, false));
                if let Some(parent) = docx.parent() {
                    command.arg(filesystem_grant(parent, true));
                }
                command.arg(app_id);
                command
            },
        };
        command.args(["--headless", "--convert-to", "pdf", "--outdir"]).arg(out_dir).arg(docx);
        run(self.name(), &mut command)
    }
}

fn filesystem_grant(path: &Path, read_only: bool) -> OsString {
    let mut grant = OsString::from("--filesystem=");
    grant.push(path);
    if read_only {
        grant.push(":ro");
    }
    grant
}

/// File name the tools give their output: the input's stem plus `.pdf`.
fn pdf_name(docx: &Path) -> Result<OsString> {
    let mut name = docx.file_stem().ok_or_raise(|| ErrorKind::InputNotFound(docx.to_path_buf()))?.to_os_string();
    name.push(".pdf");
    Ok(name)
}

/// DOCX to PDF conversion with ordered backend fallback.
pub struct DocumentConverter {
    backends: Vec<Box<dyn ConvertBackend>>,
}
impl DocumentConverter {
    /// Use exactly these backends, in this order.
    pub fn new(backends: Vec<Box<dyn ConvertBackend>>) -> Self {
        Self { backends }
    }

    /// Probe the system once: `docx2pdf` first, then LibreOffice. Explicit
    /// paths take the place of a `PATH` lookup for that tool.
    pub fn discover(docx2pdf: Option<&Path>, soffice: Option<&Path>) -> Self {
        let mut backends: Vec<Box<dyn ConvertBackend>> = Vec::new();
        if let Some(backend) = Docx2Pdf::discover(docx2pdf) {
            backends.push(Box::new(backend));
        }
        if let Some(backend) = LibreOffice::discover(soffice) {
            backends.push(Box::new(backend));
        }
        let names: Vec<&str> = backends.iter().map(|b| b.name()).collect();
        tracing::debug!(backends = ?names, "Discovered DOCX converters");
        Self { backends }
    }

    pub fn is_available(&self) -> bool {
        !self.backends.is_empty()
    }

    /// Convert `docx` into a PDF at `pdf`, overwriting it.
    ///
    /// Each backend writes into its own scratch directory beside `pdf`; only
    /// a verified PDF is moved into place. Scratch directories are removed
    /// whether or not the backend succeeded.
    #[instrument(skip_all, fields(docx = %docx.display()))]
    pub fn convert(&self, docx: &Path, pdf: &Path) -> Result<()> {
        if !docx.is_file() {
            exn::bail!(ErrorKind::InputNotFound(docx.to_path_buf()));
        }
        if self.backends.is_empty() {
            exn::bail!(ErrorKind::NoBackend("DOCX converter"));
        }
        let name = pdf_name(docx)?;
        for backend in &self.backends {
            let scratch = scratch_dir(pdf)?;
            let produced = scratch.path().join(&name);
            match backend.convert_into(docx, scratch.path()).and_then(|()| verify_pdf(&produced)) {
                Ok(()) => {
                    std::fs::rename(&produced, pdf).or_raise(|| ErrorKind::Io)?;
                    tracing::info!(backend = backend.name(), pdf = %pdf.display(), "Converted document");
                    return Ok(());
                },
                Err(e) => tracing::warn!(backend = backend.name(), error = ?e, "Conversion backend failed"),
            }
        }
        exn::bail!(ErrorKind::AllBackendsFailed("DOCX converter"))
    }
}
