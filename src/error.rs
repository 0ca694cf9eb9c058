//! Error types for folio operations.

use thiserror::Error;

/// Errors that can occur while opening or parsing an EPUB container.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid EPUB: {0}")]
    InvalidEpub(String),

    #[error("Missing required entry: {0}")]
    MissingEntry(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Memory ceiling of {0} bytes exceeded while inflating archive")]
    MemoryCeiling(u64),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type Result<T> = std::result::Result<T, Error>;
