use crate::{context::ContextError, multipart::MultipartError, orthanc::ClientError};
use std::{io, path::PathBuf};
use thiserror::Error;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error("Prompt failed: {0}")]
    Prompt(#[from] inquire::InquireError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to read {}: {source}", path.display())]
    Input { path: PathBuf, source: io::Error },
    #[error("Failed to write {}: {source}", path.display())]
    Output { path: PathBuf, source: io::Error },
    #[error("Failed to write to stdout: {0}")]
    Stdout(#[source] io::Error),
    #[error("{0}")]
    Usage(String),
}
