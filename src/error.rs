//! Error types for fillpdf.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for fillpdf operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while producing a document.
#[derive(Error, Debug)]
pub enum Error {
    /// The template path does not resolve to a file.
    #[error("Template not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    /// The template bytes are not a PDF with an interactive form.
    #[error("Corrupt template: {0}")]
    TemplateCorrupt(String),

    /// The form tree is broken in a way that prevents filling.
    #[error("Form fill error: {0}")]
    FieldFill(String),

    /// The external flattening tool did not produce output.
    #[error("Flattening failed: {0}")]
    Flatten(String),

    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A field failed validation before the pipeline started.
    #[error("Invalid field: {0}")]
    InvalidField(String),

    /// An export job is malformed (bad output name or directory).
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// A font program could not be read or parsed.
    #[error("Font error: {0}")]
    Font(String),

    /// An image could not be read or decoded.
    #[error("Image error: {0}")]
    Image(String),
}

/// Coarse classification of an [`Error`], reported to callers alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TemplateNotFound,
    TemplateCorrupt,
    FieldFillError,
    FlattenFailure,
    IOError,
    InvalidInput,
}

impl Error {
    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TemplateNotFound(_) => ErrorKind::TemplateNotFound,
            Error::TemplateCorrupt(_) => ErrorKind::TemplateCorrupt,
            Error::FieldFill(_) => ErrorKind::FieldFillError,
            Error::Flatten(_) => ErrorKind::FlattenFailure,
            Error::Io(_) => ErrorKind::IOError,
            Error::InvalidField(_)
            | Error::InvalidJob(_)
            | Error::Font(_)
            | Error::Image(_) => ErrorKind::InvalidInput,
        }
    }

    /// Whether the pipeline must stop on this error.
    ///
    /// Only flattening failures are recoverable.
    pub fn is_fatal(&self) -> bool {
        self.kind() != ErrorKind::FlattenFailure
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::TemplateNotFound => "TemplateNotFound",
            ErrorKind::TemplateCorrupt => "TemplateCorrupt",
            ErrorKind::FieldFillError => "FieldFillError",
            ErrorKind::FlattenFailure => "FlattenFailure",
            ErrorKind::IOError => "IOError",
            ErrorKind::InvalidInput => "InvalidInput",
        };
        f.write_str(name)
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            lopdf::Error::Decryption(_) => Error::TemplateCorrupt("document is encrypted".into()),
            _ => Error::TemplateCorrupt(err.to_string()),
        }
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io(err.error)
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}
