use super::confirm;
use crate::{
    context::{
        ConfigKey, ConfigStore, ContextError, ContextUpdate, PASSWORD_MASK, write_starter,
    },
    error::CliResult,
    output::{Output, success},
};
use clap::{Args, Subcommand, builder::BoolishValueParser};
use serde::Serialize;
use std::path::PathBuf;
use tabled::{Table, Tabled, settings::Style};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Write a starter configuration file
    Init {
        /// Where to write it (default: the active config path)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Overwrite an existing file without asking
        #[arg(long)]
        force: bool,
    },
    /// Create a context or update some of its fields
    SetContext(SetContextArgs),
    /// Make a context current
    UseContext { name: String },
    /// Rename a context
    RenameContext { from: String, to: String },
    /// Delete a context that is not current
    DeleteContext { name: String },
    /// List contexts
    #[command(alias = "ls")]
    GetContexts,
    /// Print the current context name
    CurrentContext,
    /// Set a configuration value (orthanc.* keys apply to the current context)
    Set { key: String, value: String },
    /// Print a configuration value
    Get { key: String },
    /// Print the whole configuration
    View {
        /// Show passwords instead of masking them
        #[arg(long)]
        show_password: bool,
    },
}

#[derive(Args)]
pub struct SetContextArgs {
    pub name: String,
    /// Orthanc base URL, e.g. http://localhost:8042
    #[arg(long)]
    pub url: Option<String>,
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
    /// Skip TLS certificate verification
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub insecure: Option<bool>,
    /// Also make it the current context
    #[arg(long = "use")]
    pub make_current: bool,
}

#[derive(Tabled)]
struct ContextRow {
    #[tabled(rename = "CURRENT")]
    current: &'static str,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "USERNAME")]
    username: String,
    #[tabled(rename = "INSECURE")]
    insecure: bool,
}

#[derive(Serialize)]
struct ContextListing<'a> {
    name: &'a str,
    current: bool,
    url: &'a str,
    username: &'a str,
    insecure: bool,
}

pub fn handle(action: ConfigCommand, store: &mut ConfigStore, output: Output) -> CliResult<()> {
    match action {
        ConfigCommand::Init { output: path, force } => {
            let path = path.unwrap_or_else(|| store.path().to_path_buf());
            if path.exists() {
                let message = format!("{} already exists. Overwrite?", path.display());
                if !confirm(&message, force)? {
                    println!("Aborted.");
                    return Ok(());
                }
            }
            write_starter(&path)?;
            success(&format!("Wrote starter configuration to {}", path.display()));
        }
        ConfigCommand::SetContext(args) => {
            let update = ContextUpdate {
                url: args.url,
                username: args.username,
                password: args.password,
                insecure: args.insecure,
            };
            let outcome = store.set_context(&args.name, update, args.make_current)?;
            store.save()?;

            let verb = if outcome.created { "Created" } else { "Updated" };
            success(&format!("{verb} context '{}'.", args.name));
            if outcome.made_current {
                println!("Current context set to '{}'.", args.name);
            }
        }
        ConfigCommand::UseContext { name } => {
            store.use_context(&name)?;
            store.save()?;
            success(&format!("Current context set to '{name}'."));
        }
        ConfigCommand::RenameContext { from, to } => {
            store.rename_context(&from, &to)?;
            store.save()?;
            success(&format!("Renamed context '{from}' -> '{to}'."));
        }
        ConfigCommand::DeleteContext { name } => {
            store.delete_context(&name)?;
            store.save()?;
            success(&format!("Deleted context '{name}'."));
        }
        ConfigCommand::GetContexts => list_contexts(store, output)?,
        ConfigCommand::CurrentContext => match store.current_name() {
            Some(name) => println!("{name}"),
            None => return Err(ContextError::NoContextSelected.into()),
        },
        ConfigCommand::Set { key, value } => {
            let key = parse_key(&key)?;
            store.set_value(key, &value)?;
            store.save()?;
            let shown = if key.is_secret() { PASSWORD_MASK } else { value.as_str() };
            success(&format!("Set {} = {shown}", key.as_str()));
        }
        ConfigCommand::Get { key } => {
            let key = parse_key(&key)?;
            match store.get_value(key)? {
                Some(_) if key.is_secret() => println!("{PASSWORD_MASK}"),
                Some(value) => println!("{value}"),
                None => println!("{} is not set", key.as_str()),
            }
        }
        ConfigCommand::View { show_password } => {
            let document = if show_password {
                store.document().clone()
            } else {
                store.document().masked()
            };

            if output.is_json() {
                output.json(&document)?;
            } else {
                let text = serde_yaml::to_string(&document).map_err(ContextError::from)?;
                println!("# {}", store.path().display());
                print!("{text}");
            }
        }
    }

    Ok(())
}

fn parse_key(raw: &str) -> CliResult<ConfigKey> {
    ConfigKey::parse(raw).ok_or_else(|| {
        ContextError::InvalidKey {
            key: raw.to_string(),
            valid: ConfigKey::valid_keys(),
        }
        .into()
    })
}

fn list_contexts(store: &ConfigStore, output: Output) -> CliResult<()> {
    let contexts = store.list();

    if output.is_json() {
        let listing: Vec<_> = contexts
            .iter()
            .map(|(ctx, current)| ContextListing {
                name: &ctx.name,
                current: *current,
                url: &ctx.settings.url,
                username: &ctx.settings.username,
                insecure: ctx.settings.insecure,
            })
            .collect();
        return output.json(&listing);
    }

    if contexts.is_empty() {
        println!("No contexts configured. Run `orthanc config init` to create one.");
        return Ok(());
    }

    let rows = contexts.into_iter().map(|(ctx, current)| ContextRow {
        current: if current { "*" } else { "" },
        name: ctx.name,
        url: ctx.settings.url,
        username: ctx.settings.username,
        insecure: ctx.settings.insecure,
    });
    println!("{}", Table::new(rows).with(Style::blank()));
    Ok(())
}
