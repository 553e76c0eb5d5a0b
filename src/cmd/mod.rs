pub mod config;
pub mod dicomweb;
pub mod modalities;
pub mod resources;
pub mod servers;
pub mod system;
pub mod tools;

use crate::{
    context::ConfigStore,
    error::{CliError, CliResult},
    orthanc::{OrthancClient, ResourceKind},
    output::Output,
};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "orthanc",
    version,
    about = "command-line client for Orthanc DICOM servers",
    long_about = "Manage Orthanc connection contexts and work with patients, studies, \
                  series, instances, modalities and DICOMweb from the terminal."
)]
pub struct Cli {
    /// Config file (default: ~/.orthanc-cli.yaml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage connection contexts and settings
    #[command(subcommand)]
    Config(config::ConfigCommand),
    /// Show Orthanc system information
    System,
    /// Work with patients
    #[command(subcommand)]
    Patients(resources::ResourceCommand),
    /// Work with studies
    #[command(subcommand)]
    Studies(resources::StudyCommand),
    /// Work with series
    #[command(subcommand)]
    Series(resources::SeriesCommand),
    /// Work with instances
    #[command(subcommand)]
    Instances(resources::InstanceCommand),
    /// Work with DICOM modalities
    #[command(subcommand)]
    Modalities(modalities::ModalityCommand),
    /// Work with DICOMweb servers
    #[command(subcommand)]
    Servers(servers::ServerCommand),
    /// Server maintenance tools
    #[command(subcommand)]
    Tools(tools::ToolCommand),
    /// DICOMweb retrieval and search
    #[command(subcommand)]
    Dicomweb(dicomweb::DicomwebCommand),
}

/// Route a parsed command. Config commands only touch the store; the rest
/// get a client built from the resolved current context.
pub fn run(command: Command, store: &mut ConfigStore, output: Output) -> CliResult<()> {
    match command {
        Command::Config(action) => config::handle(action, store, output),
        Command::System => system::handle(&connect(store)?, output),
        Command::Patients(action) => {
            resources::handle(&connect(store)?, ResourceKind::Patients, action, output)
        }
        Command::Studies(action) => resources::handle_studies(&connect(store)?, action, output),
        Command::Series(action) => resources::handle_series(&connect(store)?, action, output),
        Command::Instances(action) => resources::handle_instances(&connect(store)?, action, output),
        Command::Modalities(action) => modalities::handle(&connect(store)?, action, output),
        Command::Servers(action) => servers::handle(&connect(store)?, action, output),
        Command::Tools(action) => tools::handle(&connect(store)?, action, output),
        Command::Dicomweb(action) => dicomweb::handle(&connect(store)?, action, output),
    }
}

fn connect(store: &ConfigStore) -> CliResult<OrthancClient> {
    let context = store.current_context()?;
    debug!(context = %context.name, "using context");
    Ok(OrthancClient::new(&context)?)
}

/// Ask before a destructive action unless `--force` was given.
pub(crate) fn confirm(message: &str, skip: bool) -> CliResult<bool> {
    if skip {
        return Ok(true);
    }
    Ok(inquire::Confirm::new(message)
        .with_default(false)
        .prompt()?)
}

/// Parse a `KEY=VALUE` argument; the key must not be empty.
pub(crate) fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_owned(), value.to_owned()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

/// Load a JSON object from `path`, as given to `--file`.
pub(crate) fn read_json_object(path: &Path) -> CliResult<Map<String, Value>> {
    let raw = fs::read_to_string(path).map_err(|source| CliError::Input {
        path: path.to_path_buf(),
        source,
    })?;
    match serde_json::from_str(&raw)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(CliError::Usage(format!(
            "{} must contain a JSON object",
            path.display()
        ))),
    }
}

/// Copy every field `patch` serializes onto `base`, replacing existing ones.
pub(crate) fn overlay<T: Serialize>(base: &mut Map<String, Value>, patch: &T) -> CliResult<()> {
    if let Value::Object(fields) = serde_json::to_value(patch)? {
        base.extend(fields);
    }
    Ok(())
}

/// `true` when `key` holds something other than null or an empty string.
pub(crate) fn has_field(fields: &Map<String, Value>, key: &str) -> bool {
    match fields.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.is_empty(),
        Some(_) => true,
    }
}
