use super::{confirm, has_field, overlay, parse_key_value, read_json_object};
use crate::{
    error::{CliError, CliResult},
    orthanc::{
        ClientError, ModalityConfig, ModalityQuery, OrthancClient, ResourceLevel, RetrieveRequest,
        StoreRequest,
    },
    output::{Output, success, warning},
};
use clap::{Args, Subcommand, builder::BoolishValueParser};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, path::PathBuf};
use tabled::{Table, Tabled, settings::Style};

#[derive(Subcommand)]
pub enum ModalityCommand {
    /// List configured DICOM modalities
    #[command(alias = "ls")]
    List {
        /// Show each modality's configuration
        #[arg(long)]
        expand: bool,
    },
    /// Show one modality's configuration
    Get { name: String },
    /// Send a C-ECHO to a modality
    Echo { name: String },
    /// Create or replace a modality
    Create(ModalityArgs),
    /// Change some fields of an existing modality
    Update(ModalityArgs),
    /// Delete a modality
    #[command(alias = "rm")]
    Remove {
        name: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        force: bool,
    },
    /// Query a modality (C-FIND)
    Find(FindArgs),
    /// Ask a modality to send resources to an AET (C-MOVE)
    Move(MoveArgs),
    /// Fetch resources from a modality into Orthanc (C-GET)
    Retrieve(TransferArgs),
    /// Send local resources to a modality (C-STORE)
    Store(StoreArgs),
}

#[derive(Args, Debug)]
pub struct ModalityArgs {
    pub name: String,
    /// JSON file with the modality configuration; flags override its fields
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Application Entity Title of the remote modality
    #[arg(long)]
    pub aet: Option<String>,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub manufacturer: Option<String>,
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub allow_echo: Option<bool>,
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub allow_find: Option<bool>,
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub allow_get: Option<bool>,
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub allow_move: Option<bool>,
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub allow_store: Option<bool>,
    /// DICOM timeout in seconds
    #[arg(long)]
    pub timeout: Option<u32>,
}

impl ModalityArgs {
    fn config(&self) -> ModalityConfig {
        ModalityConfig {
            aet: self.aet.clone(),
            host: self.host.clone(),
            port: self.port,
            manufacturer: self.manufacturer.clone(),
            allow_echo: self.allow_echo,
            allow_find: self.allow_find,
            allow_get: self.allow_get,
            allow_move: self.allow_move,
            allow_store: self.allow_store,
            timeout: self.timeout,
        }
    }
}

#[derive(Args, Debug)]
pub struct FindArgs {
    pub name: String,
    #[arg(long, value_enum, ignore_case = true, default_value_t = ResourceLevel::Study)]
    pub level: ResourceLevel,
    /// DICOM tag to query, e.g. PatientID=123 or StudyDate= (repeatable)
    #[arg(long = "tag", value_name = "TAG=VALUE", value_parser = parse_key_value)]
    pub tags: Vec<(String, String)>,
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub normalize: Option<bool>,
    #[arg(long)]
    pub timeout: Option<u32>,
}

/// Options shared by C-MOVE and C-GET.
#[derive(Args, Debug)]
pub struct TransferArgs {
    pub name: String,
    #[arg(long, value_enum, ignore_case = true, default_value_t = ResourceLevel::Study)]
    pub level: ResourceLevel,
    /// Identifying tag of the resource, e.g. StudyInstanceUID=1.2.3 (repeatable)
    #[arg(
        long = "resource",
        value_name = "TAG=VALUE",
        required = true,
        value_parser = parse_key_value
    )]
    pub resources: Vec<(String, String)>,
    #[arg(long)]
    pub timeout: Option<u32>,
    /// Ignore errors on individual resources
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub permissive: Option<bool>,
    /// Run as an Orthanc job and return its ID
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub asynchronous: Option<bool>,
}

impl TransferArgs {
    fn request(&self) -> RetrieveRequest {
        let identifiers: BTreeMap<String, String> = self.resources.iter().cloned().collect();
        RetrieveRequest {
            level: self.level,
            resources: vec![identifiers],
            target_aet: None,
            priority: None,
            timeout: self.timeout,
            permissive: self.permissive,
            asynchronous: self.asynchronous,
        }
    }
}

#[derive(Args, Debug)]
pub struct MoveArgs {
    #[command(flatten)]
    pub transfer: TransferArgs,
    /// AET that receives the resources (default: this Orthanc)
    #[arg(long)]
    pub target_aet: Option<String>,
    #[arg(long)]
    pub priority: Option<i32>,
}

impl MoveArgs {
    fn request(&self) -> RetrieveRequest {
        RetrieveRequest {
            target_aet: self.target_aet.clone(),
            priority: self.priority,
            ..self.transfer.request()
        }
    }
}

#[derive(Args, Debug)]
pub struct StoreArgs {
    pub name: String,
    /// Orthanc IDs of the patients, studies, series or instances to send
    #[arg(required = true)]
    pub resources: Vec<String>,
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub synchronous: Option<bool>,
    #[arg(long)]
    pub local_aet: Option<String>,
    /// Called AET, when it differs from the configured one
    #[arg(long)]
    pub remote_aet: Option<String>,
    #[arg(long)]
    pub timeout: Option<u32>,
    #[arg(long)]
    pub move_originator_aet: Option<String>,
    #[arg(long)]
    pub move_originator_id: Option<u16>,
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub permissive: Option<bool>,
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub storage_commitment: Option<bool>,
}

impl From<StoreArgs> for StoreRequest {
    fn from(args: StoreArgs) -> Self {
        StoreRequest {
            resources: args.resources,
            synchronous: args.synchronous,
            local_aet: args.local_aet,
            called_aet: args.remote_aet,
            timeout: args.timeout,
            move_originator_aet: args.move_originator_aet,
            move_originator_id: args.move_originator_id,
            permissive: args.permissive,
            storage_commitment: args.storage_commitment,
        }
    }
}

#[derive(Tabled)]
struct ModalityRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "AET")]
    aet: String,
    #[tabled(rename = "HOST")]
    host: String,
    #[tabled(rename = "PORT")]
    port: String,
    #[tabled(rename = "MANUFACTURER")]
    manufacturer: String,
}

impl ModalityRow {
    fn from_config(name: &str, config: &Value) -> Self {
        Self {
            name: name.to_owned(),
            aet: text(config, "AET"),
            host: text(config, "Host"),
            port: text(config, "Port"),
            manufacturer: text(config, "Manufacturer"),
        }
    }
}

pub fn handle(client: &OrthancClient, action: ModalityCommand, output: Output) -> CliResult<()> {
    match action {
        ModalityCommand::List { expand } => {
            let modalities = client.modalities(expand)?;
            if output.is_json() {
                return output.json(&modalities);
            }

            match &modalities {
                Value::Object(map) if map.is_empty() => println!("No modalities configured."),
                Value::Object(map) => {
                    let rows = map
                        .iter()
                        .map(|(name, config)| ModalityRow::from_config(name, config));
                    println!("{}", Table::new(rows).with(Style::blank()));
                }
                Value::Array(names) if names.is_empty() => println!("No modalities configured."),
                Value::Array(names) => {
                    for name in names.iter().filter_map(Value::as_str) {
                        println!("{name}");
                    }
                }
                other => println!("{other}"),
            }
            Ok(())
        }
        ModalityCommand::Get { name } => {
            let config = client.modality(&name)?;
            if output.is_json() {
                return output.json(&config);
            }

            println!("Modality: {name}");
            for (label, key) in [
                ("AET", "AET"),
                ("Host", "Host"),
                ("Port", "Port"),
                ("Manufacturer", "Manufacturer"),
            ] {
                let value = text(&config, key);
                if !value.is_empty() {
                    println!("{label}: {value}");
                }
            }

            println!("\nPermissions:");
            for operation in ["Echo", "Find", "Get", "Move", "Store"] {
                let allowed = config
                    .get(format!("Allow{operation}"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                println!("  Allow {operation}: {allowed}");
            }

            let timeout = config
                .get("Timeout")
                .and_then(Value::as_u64)
                .filter(|t| *t > 0);
            if let Some(timeout) = timeout {
                println!("\nTimeout: {timeout} seconds");
            }
            Ok(())
        }
        ModalityCommand::Echo { name } => {
            println!("Performing C-ECHO to modality: {name}");
            match client.echo_modality(&name) {
                Ok(()) => {
                    success(&format!("C-ECHO successful, modality '{name}' is responding."));
                    Ok(())
                }
                Err(err @ ClientError::Status { .. }) => {
                    warning(&format!("C-ECHO failed, modality '{name}' is not reachable."));
                    Err(err.into())
                }
                Err(err) => Err(err.into()),
            }
        }
        ModalityCommand::Create(args) => {
            let config = modality_config(Map::new(), &args)?;
            save(client, &args.name, config, output)
        }
        ModalityCommand::Update(args) => {
            let stored = match client.modality(&args.name)? {
                Value::Object(fields) => fields,
                _ => Map::new(),
            };
            let config = modality_config(stored, &args)?;
            save(client, &args.name, config, output)
        }
        ModalityCommand::Remove { name, force } => {
            if !force {
                warning(&format!(
                    "You are about to delete modality '{name}'. This cannot be undone."
                ));
            }
            if !confirm(&format!("Delete modality {name}?"), force)? {
                println!("Operation cancelled");
                return Ok(());
            }
            client.remove_modality(&name)?;
            success(&format!("Deleted modality {name}"));
            Ok(())
        }
        ModalityCommand::Find(args) => find(client, args, output),
        ModalityCommand::Move(args) => {
            let request = args.request();
            let result = client.move_from_modality(&args.transfer.name, &request)?;
            report_transfer("C-MOVE", &args.transfer.name, &result, output)
        }
        ModalityCommand::Retrieve(args) => {
            let result = client.get_from_modality(&args.name, &args.request())?;
            report_transfer("C-GET", &args.name, &result, output)
        }
        ModalityCommand::Store(args) => {
            let name = args.name.clone();
            let request = StoreRequest::from(args);
            let result = client.store_to_modality(&name, &request)?;
            report_transfer("C-STORE", &name, &result, output)
        }
    }
}

/// Layer `--file` and then the flags over `base`, and check the result is
/// a complete modality.
fn modality_config(mut base: Map<String, Value>, args: &ModalityArgs) -> CliResult<Value> {
    if let Some(file) = &args.file {
        base.extend(read_json_object(file)?);
    }
    overlay(&mut base, &args.config())?;

    let missing: Vec<_> = ["AET", "Host", "Port"]
        .into_iter()
        .filter(|key| !has_field(&base, key))
        .collect();
    if !missing.is_empty() {
        return Err(CliError::Usage(format!(
            "modality '{}' needs {} (from --file or --aet/--host/--port)",
            args.name,
            missing.join(", ")
        )));
    }
    Ok(Value::Object(base))
}

fn save(client: &OrthancClient, name: &str, config: Value, output: Output) -> CliResult<()> {
    client.save_modality(name, &config)?;
    if output.is_json() {
        return output.json(&config);
    }

    success(&format!("Saved modality {name}"));
    for key in ["AET", "Host", "Port"] {
        println!("{key}: {}", text(&config, key));
    }
    Ok(())
}

fn find(client: &OrthancClient, args: FindArgs, output: Output) -> CliResult<()> {
    let query = ModalityQuery {
        level: args.level,
        query: args.tags.into_iter().collect(),
        normalize: args.normalize,
        timeout: args.timeout,
    };
    let answers = client.query_modality(&args.name, &query)?;

    if output.is_json() {
        return output.json(&answers);
    }

    println!("C-FIND on modality {} at level {:?}", args.name, query.level);
    if answers.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s):", answers.len());
    for (position, answer) in answers.iter().enumerate() {
        println!("\nResult {}:", position + 1);
        if let Value::Object(fields) = answer {
            for key in fields.keys() {
                println!("  {key}: {}", text(answer, key));
            }
        }
    }
    Ok(())
}

fn report_transfer(operation: &str, name: &str, result: &Value, output: Output) -> CliResult<()> {
    if output.is_json() {
        return output.json(result);
    }

    success(&format!("{operation} with modality {name} completed"));
    for line in transfer_lines(result) {
        println!("{line}");
    }
    Ok(())
}

/// Summary of a DIMSE transfer; asynchronous runs only report the job.
fn transfer_lines(result: &Value) -> Vec<String> {
    [
        ("Description", "Description"),
        ("Local AET", "LocalAet"),
        ("Remote AET", "RemoteAet"),
        ("Target AET", "TargetAet"),
        ("Job ID", "ID"),
        ("Job Path", "Path"),
    ]
    .into_iter()
    .filter_map(|(label, key)| {
        let value = text(result, key);
        (!value.is_empty()).then(|| format!("{label}: {value}"))
    })
    .collect()
}

/// String form of a scalar config field; empty when absent.
pub(crate) fn text(config: &Value, key: &str) -> String {
    match config.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
