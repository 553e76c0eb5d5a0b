use super::{confirm, has_field, modalities::text, overlay, read_json_object};
use crate::{
    error::{CliError, CliResult},
    orthanc::{DicomWebServerConfig, OrthancClient},
    output::{Output, success, warning},
};
use clap::{Args, Subcommand, builder::BoolishValueParser};
use serde_json::{Map, Value};
use std::path::PathBuf;

const DETAIL_FIELDS: [&str; 3] = [
    "HasDelete",
    "ChunkedTransfers",
    "HasWadoRsUniversalTransferSyntax",
];

#[derive(Subcommand)]
pub enum ServerCommand {
    /// List DICOMweb servers known to Orthanc
    #[command(alias = "ls")]
    List {
        /// Show each server's configuration
        #[arg(long)]
        expand: bool,
    },
    /// Show one DICOMweb server
    Get { name: String },
    /// Register or replace a DICOMweb server
    Create(ServerArgs),
    /// Change some fields of a registered DICOMweb server
    Update(ServerArgs),
    /// Forget a DICOMweb server
    #[command(alias = "rm")]
    Remove {
        name: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    pub name: String,
    /// JSON file with the server configuration; flags override its fields
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Base URL of the remote DICOMweb service
    #[arg(long)]
    pub url: Option<String>,
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub has_delete: Option<bool>,
    /// Set to false for Orthanc 1.5.6 and older
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub chunked_transfers: Option<bool>,
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub has_wado_rs_universal_transfer_syntax: Option<bool>,
}

impl ServerArgs {
    fn config(&self) -> DicomWebServerConfig {
        DicomWebServerConfig {
            url: self.url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            has_delete: self.has_delete,
            chunked_transfers: self.chunked_transfers,
            has_wado_rs_universal_transfer_syntax: self.has_wado_rs_universal_transfer_syntax,
        }
    }
}

pub fn handle(client: &OrthancClient, action: ServerCommand, output: Output) -> CliResult<()> {
    match action {
        ServerCommand::List { expand } => {
            let servers = client.dicomweb_servers(expand)?;
            if output.is_json() {
                return output.json(&servers);
            }

            match &servers {
                Value::Object(map) if !map.is_empty() => {
                    for (name, server) in map {
                        println!("Server: {name}");
                        for line in server_lines(server) {
                            println!("  {line}");
                        }
                    }
                }
                Value::Array(names) if !names.is_empty() => {
                    for name in names.iter().filter_map(Value::as_str) {
                        println!("{name}");
                    }
                }
                _ => println!("No DICOMweb servers configured"),
            }
            Ok(())
        }
        ServerCommand::Get { name } => {
            let server = registered(client, &name)?;
            if output.is_json() {
                return output.json(&server);
            }

            println!("Server: {name}");
            for line in server_lines(&server) {
                println!("{line}");
            }
            Ok(())
        }
        ServerCommand::Create(args) => {
            let config = server_config(Map::new(), &args, false)?;
            save(client, &args.name, config)
        }
        ServerCommand::Update(args) => {
            let listed = match registered(client, &args.name)? {
                Value::Object(fields) => fields,
                _ => Map::new(),
            };
            let config = server_config(listed, &args, true)?;
            save(client, &args.name, config)
        }
        ServerCommand::Remove { name, force } => {
            if !force {
                warning(&format!(
                    "You are about to delete DICOMweb server '{name}'. This cannot be undone."
                ));
            }
            if !confirm(&format!("Delete DICOMweb server {name}?"), force)? {
                println!("Operation cancelled");
                return Ok(());
            }
            client.remove_dicomweb_server(&name)?;
            success(&format!("Deleted DICOMweb server {name}"));
            Ok(())
        }
    }
}

/// The listed configuration of one server.
fn registered(client: &OrthancClient, name: &str) -> CliResult<Value> {
    let mut servers = client.dicomweb_servers(true)?;
    servers
        .get_mut(name)
        .map(Value::take)
        .ok_or_else(|| CliError::Usage(format!("DICOMweb server '{name}' not found")))
}

/// Layer `--file` and the flags over `base` and check a URL is present.
///
/// Orthanc never lists stored passwords, so an update of a server that has a
/// username must repeat the password or it would be cleared.
fn server_config(
    mut base: Map<String, Value>,
    args: &ServerArgs,
    updating: bool,
) -> CliResult<Value> {
    if let Some(file) = &args.file {
        base.extend(read_json_object(file)?);
    }
    overlay(&mut base, &args.config())?;

    if !has_field(&base, "Url") {
        return Err(CliError::Usage(format!(
            "DICOMweb server '{}' needs a URL (from --file or --url)",
            args.name
        )));
    }
    if updating && has_field(&base, "Username") && !has_field(&base, "Password") {
        return Err(CliError::Usage(format!(
            "DICOMweb server '{}' has a username; pass --password again to keep it",
            args.name
        )));
    }
    Ok(Value::Object(base))
}

fn save(client: &OrthancClient, name: &str, config: Value) -> CliResult<()> {
    client.save_dicomweb_server(name, &config)?;
    success(&format!("Saved DICOMweb server {name}"));
    println!("URL: {}", text(&config, "Url"));
    let username = text(&config, "Username");
    if !username.is_empty() {
        println!("Username: {username}");
    }
    Ok(())
}

fn server_lines(server: &Value) -> Vec<String> {
    let mut lines = vec![format!("URL: {}", text(server, "Url"))];

    let username = text(server, "Username");
    if !username.is_empty() {
        lines.push(format!("Username: {username}"));
    }
    for field in DETAIL_FIELDS {
        let value = text(server, field);
        if !value.is_empty() {
            lines.push(format!("{field}: {value}"));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::{Cli, Command};
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn server_args(args: &[&str]) -> ServerArgs {
        let argv = ["orthanc", "servers"].into_iter().chain(args.iter().copied());
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Servers(ServerCommand::Create(args) | ServerCommand::Update(args)) => args,
            _ => panic!("expected servers create or update"),
        }
    }

    #[test]
    fn server_lines_skip_empty_fields() {
        let server = json!({
            "Url": "https://pacs.example.com/dicom-web/",
            "Username": "",
            "HasDelete": "1"
        });
        assert_eq!(
            server_lines(&server),
            vec!["URL: https://pacs.example.com/dicom-web/", "HasDelete: 1"]
        );
    }

    #[test]
    fn create_keeps_explicit_false() {
        let args = server_args(&[
            "create",
            "remote",
            "--url",
            "https://pacs/dicom-web/",
            "--chunked-transfers=false",
        ]);
        assert_eq!(
            server_config(Map::new(), &args, false).unwrap(),
            json!({ "Url": "https://pacs/dicom-web/", "ChunkedTransfers": false })
        );
    }

    #[test]
    fn create_needs_a_url() {
        let args = server_args(&["create", "remote", "--has-delete"]);
        assert!(matches!(
            server_config(Map::new(), &args, false),
            Err(CliError::Usage(_))
        ));
    }

    #[test]
    fn update_with_username_needs_the_password() {
        let listed = json!({ "Url": "https://pacs/", "Username": "alice", "HasDelete": "0" });
        let listed = listed.as_object().cloned().unwrap();

        let args = server_args(&["update", "remote", "--has-delete"]);
        assert!(matches!(
            server_config(listed.clone(), &args, true),
            Err(CliError::Usage(message)) if message.contains("--password")
        ));

        let args = server_args(&["update", "remote", "--has-delete", "--password", "pw"]);
        assert_eq!(
            server_config(listed, &args, true).unwrap(),
            json!({
                "Url": "https://pacs/",
                "Username": "alice",
                "Password": "pw",
                "HasDelete": true
            })
        );
    }
}
