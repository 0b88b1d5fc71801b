use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Read or write failure on the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The container could not be opened as a zip archive.
    #[error("corrupt package: {0}")]
    PackageCorrupt(String),

    /// A part the operation cannot do without is absent.
    #[error("missing part: {0}")]
    MissingPart(String),

    /// A part failed to parse, or its content violates a structural rule
    /// (for example a cycle in the style based-on chain).
    #[error("malformed markup in {part} at {position}: {message}")]
    MalformedMarkup {
        part: String,
        position: String,
        message: String,
    },

    /// Restoration altered the document content; nothing is written.
    #[error("restoration changed the document content ({})", .changed.join(", "))]
    ContentChanged { changed: Vec<&'static str> },
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => Error::Io(io),
            other => Error::PackageCorrupt(other.to_string()),
        }
    }
}
