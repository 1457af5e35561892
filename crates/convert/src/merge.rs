use crate::error::{ErrorKind, Result};
use crate::tool::{locate, run, scratch_dir, verify_pdf};
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::instrument;

/// One way of concatenating PDFs.
pub trait MergeBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Concatenate `inputs` in order into a new file at `output`.
    fn merge_into(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;
}

/// `qpdf --empty --pages <inputs> -- <output>`
pub struct Qpdf {
    path: PathBuf,
}
impl Qpdf {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn discover(explicit: Option<&Path>) -> Option<Self> {
        locate(explicit, &["qpdf"]).map(Self::new)
    }
}
impl MergeBackend for Qpdf {
    fn name(&self) -> &str {
        "qpdf"
    }

    fn merge_into(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let mut command = Command::new(&self.path);
        command.args(["--empty", "--pages"]).args(inputs).arg("--").arg(output);
        run(self.name(), &mut command)
    }
}

/// `pdfunite <inputs> <output>` from poppler-utils.
pub struct Pdfunite {
    path: PathBuf,
}
impl Pdfunite {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn discover(explicit: Option<&Path>) -> Option<Self> {
        locate(explicit, &["pdfunite"]).map(Self::new)
    }
}
impl MergeBackend for Pdfunite {
    fn name(&self) -> &str {
        "pdfunite"
    }

    fn merge_into(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let mut command = Command::new(&self.path);
        command.args(inputs).arg(output);
        run(self.name(), &mut command)
    }
}

/// PDF concatenation with ordered backend fallback.
pub struct PdfMerger {
    backends: Vec<Box<dyn MergeBackend>>,
}
impl PdfMerger {
    pub fn new(backends: Vec<Box<dyn MergeBackend>>) -> Self {
        Self { backends }
    }

    /// Probe the system once: `qpdf` first, then `pdfunite`.
    pub fn discover(qpdf: Option<&Path>, pdfunite: Option<&Path>) -> Self {
        let mut backends: Vec<Box<dyn MergeBackend>> = Vec::new();
        if let Some(backend) = Qpdf::discover(qpdf) {
            backends.push(Box::new(backend));
        }
        if let Some(backend) = Pdfunite::discover(pdfunite) {
            backends.push(Box::new(backend));
        }
        let names: Vec<&str> = backends.iter().map(|b| b.name()).collect();
        tracing::debug!(backends = ?names, "Discovered PDF mergers");
        Self { backends }
    }

    pub fn is_available(&self) -> bool {
        !self.backends.is_empty()
    }

    /// Merge `inputs`, in order, into `pdf` (overwriting it).
    #[instrument(skip_all, fields(pdf = %pdf.display(), inputs = inputs.len()))]
    pub fn merge(&self, inputs: &[PathBuf], pdf: &Path) -> Result<()> {
        if let Some(missing) = inputs.iter().find(|input| !input.is_file()) {
            exn::bail!(ErrorKind::InputNotFound(missing.clone()));
        }
        if self.backends.is_empty() {
            exn::bail!(ErrorKind::NoBackend("PDF merger"));
        }
        for backend in &self.backends {
            let scratch = scratch_dir(pdf)?;
            let produced = scratch.path().join("merged.pdf");
            match backend.merge_into(inputs, &produced).and_then(|()| verify_pdf(&produced)) {
                Ok(()) => {
                    std::fs::rename(&produced, pdf).or_raise(|| ErrorKind::Io)?;
                    tracing::info!(backend = backend.name(), "Merged PDFs");
                    return Ok(());
                },
                Err(e) => tracing::warn!(backend = backend.name(), error = ?e, "Merge backend failed"),
            }
        }
        exn::bail!(ErrorKind::AllBackendsFailed("PDF merger"))
    }
}
