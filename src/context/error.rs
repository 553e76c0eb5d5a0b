use std::path::PathBuf;
use thiserror::Error;

pub type ContextResult<T> = Result<T, ContextError>;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Unable to determine home directory for the configuration file")]
    MissingConfigDir,
    #[error("Context name cannot be empty")]
    EmptyName,
    #[error("Context '{0}' already exists")]
    DuplicateContext(String),
    #[error("Context '{0}' not found")]
    UnknownContext(String),
    #[error(
        "No context selected. Create one with `orthanc config set-context <name> --url <url>`"
    )]
    NoContextSelected,
    #[error("Cannot delete current context '{0}' (switch to another context first)")]
    DeleteCurrent(String),
    #[error("Invalid configuration key '{key}' (valid keys: {valid})")]
    InvalidKey { key: String, valid: String },
    #[error("Invalid boolean value for {key}: '{value}' (use true or false)")]
    InvalidBool { key: String, value: String },
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write config file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error(transparent)]
    Serialize(#[from] serde_yaml::Error),
}
