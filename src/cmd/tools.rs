use super::{confirm, parse_key_value, resources::resource_lines};
use crate::{
    error::CliResult,
    orthanc::{FindRequest, LabelsConstraint, LogLevel, OrthancClient, ResourceLevel},
    output::{Output, success, warning},
};
use clap::{Args, Subcommand};
use serde_json::{Value, json};

#[derive(Subcommand)]
pub enum ToolCommand {
    /// Show or change the server log level
    LogLevel {
        #[command(subcommand)]
        action: Option<LogLevelCommand>,
    },
    /// Hot-restart Orthanc and reload its configuration
    Reset {
        /// Do not ask for confirmation
        #[arg(short, long)]
        force: bool,
    },
    /// Stop the Orthanc server
    Shutdown {
        /// Do not ask for confirmation
        #[arg(short, long)]
        force: bool,
    },
    /// Search the local Orthanc database
    Find(FindArgs),
}

#[derive(Args, Debug)]
pub struct FindArgs {
    #[arg(long, value_enum, ignore_case = true, default_value_t = ResourceLevel::Study)]
    pub level: ResourceLevel,
    /// DICOM tag to match, e.g. PatientName=DOE* (repeatable)
    #[arg(long = "tag", value_name = "TAG=VALUE", value_parser = parse_key_value)]
    pub tags: Vec<(String, String)>,
    /// Return full resources instead of IDs
    #[arg(long)]
    pub expand: bool,
    #[arg(long)]
    pub limit: Option<u64>,
    /// Skip the first N results
    #[arg(long)]
    pub since: Option<u64>,
    /// Extra tag to include in expanded results (repeatable)
    #[arg(long = "requested-tag", value_name = "TAG")]
    pub requested_tags: Vec<String>,
    /// Label the resources must carry (repeatable)
    #[arg(long = "label")]
    pub labels: Vec<String>,
    #[arg(long, value_enum, ignore_case = true, requires = "labels")]
    pub labels_constraint: Option<LabelsConstraint>,
}

impl From<FindArgs> for FindRequest {
    fn from(args: FindArgs) -> Self {
        FindRequest {
            level: args.level,
            query: args.tags.into_iter().collect(),
            expand: args.expand,
            limit: args.limit,
            since: args.since,
            requested_tags: args.requested_tags,
            labels: args.labels,
            labels_constraint: args.labels_constraint,
        }
    }
}

#[derive(Subcommand, Default)]
pub enum LogLevelCommand {
    #[default]
    Get,
    Set {
        #[arg(value_enum)]
        level: LogLevel,
    },
}

pub fn handle(client: &OrthancClient, action: ToolCommand, output: Output) -> CliResult<()> {
    match action {
        ToolCommand::LogLevel { action } => match action.unwrap_or_default() {
            LogLevelCommand::Get => {
                let level = client.log_level()?;
                if output.is_json() {
                    return output.json(&json!({ "level": level }));
                }
                println!("Current log level: {level}");
                if let Some(known) = LogLevel::parse(&level) {
                    println!("  ({})", known.describe());
                }
                Ok(())
            }
            LogLevelCommand::Set { level } => {
                client.set_log_level(level)?;
                success(&format!("Log level set to: {}", level.as_str()));
                println!("  ({})", level.describe());
                println!(
                    "\nThis lasts until the server restarts; \
                     edit the Orthanc configuration to keep it."
                );
                Ok(())
            }
        },
        ToolCommand::Reset { force } => {
            if !force {
                warning("This hot-restarts Orthanc; ongoing operations are interrupted.");
            }
            if !confirm("Reset the Orthanc server?", force)? {
                println!("Reset cancelled.");
                return Ok(());
            }
            client.reset()?;
            success("Orthanc server has been reset and its configuration reloaded.");
            Ok(())
        }
        ToolCommand::Shutdown { force } => {
            if !force {
                warning("This stops Orthanc; it must be restarted manually.");
            }
            if !confirm("Shut down the Orthanc server?", force)? {
                println!("Shutdown cancelled.");
                return Ok(());
            }
            client.shutdown()?;
            success("Orthanc server shutdown initiated.");
            Ok(())
        }
        ToolCommand::Find(args) => find(client, args, output),
    }
}

fn find(client: &OrthancClient, args: FindArgs, output: Output) -> CliResult<()> {
    let request = FindRequest::from(args);
    let results = client.find(&request)?;

    if output.is_json() {
        return output.json(&results);
    }

    println!("Level: {:?}", request.level);
    for (tag, value) in &request.query {
        println!("  {tag}: {value}");
    }
    println!();

    for line in find_lines(request.level, &results) {
        println!("{line}");
    }
    Ok(())
}

fn find_lines(level: ResourceLevel, results: &[Value]) -> Vec<String> {
    if results.is_empty() {
        return vec!["No results found.".to_string()];
    }

    let mut lines = vec![format!("Found {} result(s):", results.len())];
    for (position, result) in results.iter().enumerate() {
        match result {
            Value::String(id) => lines.push(format!("  {}. {id}", position + 1)),
            expanded => {
                lines.push(String::new());
                lines.push(format!("Result {}:", position + 1));
                lines.extend(
                    resource_lines(level.kind(), expanded)
                        .into_iter()
                        .map(|line| format!("  {line}")),
                );
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        find: FindArgs,
    }

    fn find_args(args: &[&str]) -> FindArgs {
        Harness::try_parse_from(std::iter::once("find").chain(args.iter().copied()))
            .unwrap()
            .find
    }

    #[test]
    fn find_defaults_to_study_level() {
        let request = FindRequest::from(find_args(&[]));
        assert_eq!(request.level, ResourceLevel::Study);
        assert!(request.query.is_empty());
        assert!(!request.expand);
    }

    #[test]
    fn find_flags_build_the_request() {
        let request = FindRequest::from(find_args(&[
            "--level",
            "Series",
            "--tag",
            "Modality=CT",
            "--tag",
            "PatientName=DOE*",
            "--label",
            "teaching",
            "--labels-constraint",
            "any",
            "--limit",
            "5",
        ]));
        assert_eq!(request.level, ResourceLevel::Series);
        assert_eq!(
            request.query,
            BTreeMap::from([
                ("Modality".to_string(), "CT".to_string()),
                ("PatientName".to_string(), "DOE*".to_string()),
            ])
        );
        assert_eq!(request.labels, vec!["teaching"]);
        assert_eq!(request.labels_constraint, Some(LabelsConstraint::Any));
        assert_eq!(request.limit, Some(5));
    }

    #[test]
    fn labels_constraint_needs_a_label() {
        let result = Harness::try_parse_from(["find", "--labels-constraint", "all"]);
        assert!(result.is_err());
    }

    #[test]
    fn find_lines_number_ids() {
        let results = vec![json!("a1"), json!("b2")];
        assert_eq!(
            find_lines(ResourceLevel::Study, &results),
            vec!["Found 2 result(s):", "  1. a1", "  2. b2"]
        );
        assert_eq!(
            find_lines(ResourceLevel::Study, &[]),
            vec!["No results found."]
        );
    }

    #[test]
    fn find_lines_expand_resources() {
        let results = vec![json!({ "ID": "p1", "Type": "Patient", "Studies": ["s"] })];
        assert_eq!(
            find_lines(ResourceLevel::Patient, &results),
            vec![
                "Found 1 result(s):",
                "",
                "Result 1:",
                "  ID: p1",
                "  Type: Patient",
                "  Studies: 1",
            ]
        );
    }
}
