use std::{io, path::PathBuf};
use thiserror::Error;

pub type MultipartResult<T> = Result<T, MultipartError>;

#[derive(Debug, Error)]
pub enum MultipartError {
    #[error("Malformed multipart Content-Type '{content_type}': {reason}")]
    MalformedContentType {
        content_type: String,
        reason: &'static str,
    },
    #[error("Multipart body ended before the closing boundary")]
    Truncated,
    #[error("Headers of multipart part {index} are malformed: {line}")]
    MalformedHeaders { index: usize, line: String },
    #[error("Headers of multipart part {index} exceed {limit} bytes")]
    HeadersTooLarge { index: usize, limit: usize },
    #[error("Failed to read multipart body: {0}")]
    Read(#[source] io::Error),
    #[error("Failed to create output directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("Failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("Failed to write zip entry {name}: {source}")]
    Zip {
        name: String,
        source: zip::result::ZipError,
    },
    #[error("Failed to write extraction report: {0}")]
    Report(#[source] io::Error),
}

impl MultipartError {
    /// Classify a failed body read. A premature end of stream is `Truncated`.
    pub fn from_read(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            MultipartError::Truncated
        } else {
            MultipartError::Read(err)
        }
    }
}
