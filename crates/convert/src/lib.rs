//! External-tool adapters for documents.
//!
//! [`DocumentConverter`] turns a `.docx` into a PDF and [`PdfMerger`] joins
//! several PDFs into one. Both hold an ordered list of backends, discovered
//! once from the system (or supplied explicitly), and try them in sequence
//! until one produces a valid PDF.

mod docx;
pub mod error;
mod merge;
mod tool;

pub use crate::docx::{ConvertBackend, DocumentConverter, Docx2Pdf, LibreOffice};
pub use crate::merge::{MergeBackend, PdfMerger, Pdfunite, Qpdf};

/// Leading bytes of every PDF file.
const PDF_MAGIC: &[u8] = b"%PDF";
