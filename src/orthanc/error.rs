use std::{io, path::PathBuf};
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(
        "Orthanc URL is not set for context '{0}'. Run `orthanc config set-context {0} --url <url>`"
    )]
    MissingUrl(String),
    #[error("Invalid Orthanc URL '{0}': expected http:// or https://")]
    InvalidUrl(String),
    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("Request {method} {url} failed: {source}")]
    Transport {
        method: String,
        url: String,
        source: reqwest::Error,
    },
    #[error("Orthanc returned HTTP {status} for {method} {url}: {message}")]
    Status {
        status: u16,
        method: String,
        url: String,
        message: String,
    },
    #[error("Failed to decode response from {url}: {source}")]
    Decode { url: String, source: reqwest::Error },
    #[error("Failed to read {}: {source}", path.display())]
    File { path: PathBuf, source: io::Error },
}
