pub mod cmd;
pub mod context;
pub mod error;
pub mod logging;
pub mod multipart;
pub mod orthanc;
pub mod output;

pub use error::{CliError, CliResult};
