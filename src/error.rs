use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Configuration could not be loaded or is invalid.
    #[display("configuration error")]
    Config,
    /// No input was selected, on the command line or in configuration.
    #[display("no input given: pass --root, --archive, --inbox or --webdav-url")]
    NoSource,
    /// The binary was built without the feature a source needs.
    #[display("{_0} support was not compiled in")]
    Unsupported(#[error(not(source))] &'static str),
    #[display("could not open {}", _0.display())]
    Source(#[error(not(source))] PathBuf),
    #[display("could not start the async runtime")]
    Runtime,
    #[display("processing failed")]
    Library,
}
