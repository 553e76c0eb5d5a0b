use super::confirm;
use crate::{
    error::CliResult,
    orthanc::{AnonymizeRequest, ListQuery, OrthancClient, ResourceKind},
    output::{Output, resolve_output_path, save_stream, success, warning},
};
use clap::{Args, Subcommand, builder::BoolishValueParser};
use heck::ToTitleCase;
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug, Clone, Copy)]
pub struct ListArgs {
    /// Skip the first N resources
    #[arg(long)]
    pub since: Option<u64>,
    /// Return at most N resources
    #[arg(long)]
    pub limit: Option<u64>,
    /// Fetch full details instead of IDs
    #[arg(long)]
    pub expand: bool,
}

impl From<ListArgs> for ListQuery {
    fn from(args: ListArgs) -> Self {
        ListQuery {
            since: args.since,
            limit: args.limit,
            expand: args.expand,
        }
    }
}

/// Anonymization flags; each is left to the server default unless given.
#[derive(Args, Debug, Clone, Copy)]
pub struct AnonymizeArgs {
    /// Allow modifying protected tags
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub force: Option<bool>,
    /// Keep the original resource
    #[arg(long, value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub keep_source: Option<bool>,
    /// Ignore errors on individual instances
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub permissive: Option<bool>,
}

impl From<AnonymizeArgs> for AnonymizeRequest {
    fn from(args: AnonymizeArgs) -> Self {
        AnonymizeRequest {
            force: args.force,
            keep_source: args.keep_source,
            permissive: args.permissive,
        }
    }
}

/// Commands shared by patients, studies and series.
#[derive(Subcommand)]
pub enum ResourceCommand {
    /// List resources
    #[command(alias = "ls")]
    List(ListArgs),
    /// Show one resource
    Get { id: String },
    /// Delete a resource and everything below it
    #[command(alias = "rm")]
    Remove {
        id: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        force: bool,
    },
    /// Anonymize a resource into a new one
    Anonymize {
        id: String,
        #[command(flatten)]
        flags: AnonymizeArgs,
    },
    /// Download a resource as a ZIP archive
    Archive {
        id: String,
        /// Output file or directory (default: <id>.zip)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ChildArgs {
    pub id: String,
    /// Fetch full details instead of IDs
    #[arg(long)]
    pub expand: bool,
}

#[derive(Subcommand)]
pub enum StudyCommand {
    #[command(flatten)]
    Common(ResourceCommand),
    /// List the series of a study
    ListSeries(ChildArgs),
    /// List every instance of a study
    ListInstances(ChildArgs),
}

#[derive(Subcommand)]
pub enum SeriesCommand {
    #[command(flatten)]
    Common(ResourceCommand),
    /// List the instances of a series
    ListInstances(ChildArgs),
}

#[derive(Subcommand)]
pub enum InstanceCommand {
    /// List instances
    #[command(alias = "ls")]
    List(ListArgs),
    /// Show one instance
    Get { id: String },
    /// Delete an instance
    #[command(alias = "rm")]
    Remove {
        id: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        force: bool,
    },
    /// Anonymize an instance and save the resulting DICOM file
    Anonymize {
        id: String,
        #[command(flatten)]
        flags: AnonymizeArgs,
        /// Output file or directory (default: <id>-anonymized.dcm)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Download the DICOM file of an instance
    Download {
        id: String,
        /// Output file or directory (default: <id>.dcm)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Upload a DICOM file
    Upload { file: PathBuf },
}

pub fn handle(
    client: &OrthancClient,
    kind: ResourceKind,
    action: ResourceCommand,
    output: Output,
) -> CliResult<()> {
    match action {
        ResourceCommand::List(args) => list(client, kind, args, output),
        ResourceCommand::Get { id } => get(client, kind, &id, output),
        ResourceCommand::Remove { id, force } => remove(client, kind, &id, force, output),
        ResourceCommand::Anonymize { id, flags } => {
            let response = client.anonymize(kind, &id, &flags.into())?;
            if output.is_json() {
                return output.json(&response);
            }
            success(&format!("Anonymized {} {id}", kind.singular()));
            println!("New ID: {}", response.id);
            println!("Path: {}", response.path);
            if !response.patient_id.is_empty() {
                println!("Patient ID: {}", response.patient_id);
            }
            Ok(())
        }
        ResourceCommand::Archive { id, output: target } => {
            let path = resolve_output_path(target.as_deref(), &format!("{id}.zip"))?;
            println!("Downloading {} archive: {id}", kind.singular());
            let response = client.archive(kind, &id)?;
            let length = response.content_length();
            let written = save_stream(response, length, &path)?;
            report_download(&path, written);
            Ok(())
        }
    }
}

pub fn handle_studies(
    client: &OrthancClient,
    action: StudyCommand,
    output: Output,
) -> CliResult<()> {
    let kind = ResourceKind::Studies;
    match action {
        StudyCommand::Common(action) => handle(client, kind, action, output),
        StudyCommand::ListSeries(args) => {
            list_children(client, kind, ResourceKind::Series, args, output)
        }
        StudyCommand::ListInstances(args) => {
            list_children(client, kind, ResourceKind::Instances, args, output)
        }
    }
}

pub fn handle_series(
    client: &OrthancClient,
    action: SeriesCommand,
    output: Output,
) -> CliResult<()> {
    let kind = ResourceKind::Series;
    match action {
        SeriesCommand::Common(action) => handle(client, kind, action, output),
        SeriesCommand::ListInstances(args) => {
            list_children(client, kind, ResourceKind::Instances, args, output)
        }
    }
}

pub fn handle_instances(
    client: &OrthancClient,
    action: InstanceCommand,
    output: Output,
) -> CliResult<()> {
    let kind = ResourceKind::Instances;
    match action {
        InstanceCommand::List(args) => list(client, kind, args, output),
        InstanceCommand::Get { id } => get(client, kind, &id, output),
        InstanceCommand::Remove { id, force } => remove(client, kind, &id, force, output),
        InstanceCommand::Anonymize {
            id,
            flags,
            output: target,
        } => {
            let path = resolve_output_path(target.as_deref(), &format!("{id}-anonymized.dcm"))?;
            let response = client.anonymize_instance(&id, &flags.into())?;
            let length = response.content_length();
            let written = save_stream(response, length, &path)?;
            success(&format!("Anonymized instance {id}"));
            report_download(&path, written);
            Ok(())
        }
        InstanceCommand::Download { id, output: target } => {
            let path = resolve_output_path(target.as_deref(), &format!("{id}.dcm"))?;
            println!("Downloading DICOM instance: {id}");
            let response = client.instance_file(&id)?;
            let length = response.content_length();
            let written = save_stream(response, length, &path)?;
            report_download(&path, written);
            Ok(())
        }
        InstanceCommand::Upload { file } => {
            info!(file = %file.display(), "uploading");
            let response = client.upload(&file)?;
            if output.is_json() {
                return output.json(&response);
            }
            success("DICOM file uploaded");
            println!("Instance ID: {}", response.id);
            println!("Status: {}", response.status);
            println!("Path: {}", response.path);
            for (label, id) in [
                ("Parent Patient", &response.parent_patient),
                ("Parent Study", &response.parent_study),
                ("Parent Series", &response.parent_series),
            ] {
                if !id.is_empty() {
                    println!("{label}: {id}");
                }
            }
            Ok(())
        }
    }
}

fn list(
    client: &OrthancClient,
    kind: ResourceKind,
    args: ListArgs,
    output: Output,
) -> CliResult<()> {
    let resources = client.list(kind, args.into())?;

    if output.is_json() {
        return output.json(&resources);
    }

    if resources.is_empty() {
        println!("No {kind} found.");
        return Ok(());
    }

    for resource in &resources {
        match resource {
            Value::String(id) => println!("{id}"),
            other => {
                print_resource(kind, other);
                println!();
            }
        }
    }
    Ok(())
}

fn list_children(
    client: &OrthancClient,
    parent: ResourceKind,
    child: ResourceKind,
    args: ChildArgs,
    output: Output,
) -> CliResult<()> {
    let children = client.children(parent, &args.id, child)?;

    if !args.expand {
        let ids = child_ids(&children);
        if output.is_json() {
            return output.json(&ids);
        }
        for id in ids {
            println!("{id}");
        }
        return Ok(());
    }

    if output.is_json() {
        return output.json(&children);
    }
    print_numbered(child, &children);
    Ok(())
}

fn child_ids(children: &[Value]) -> Vec<&str> {
    children
        .iter()
        .filter_map(|child| child.get("ID").and_then(Value::as_str))
        .collect()
}

/// "Found N <kind>:" followed by one indented block per resource.
fn print_numbered(kind: ResourceKind, resources: &[Value]) {
    if resources.is_empty() {
        println!("No {kind} found.");
        return;
    }

    println!("Found {} {kind}:\n", resources.len());
    let label = kind.singular().to_title_case();
    for (position, resource) in resources.iter().enumerate() {
        println!("{label} {}:", position + 1);
        for line in resource_lines(kind, resource) {
            println!("  {line}");
        }
        println!();
    }
}

fn get(client: &OrthancClient, kind: ResourceKind, id: &str, output: Output) -> CliResult<()> {
    let resource = client.resource(kind, id)?;

    if output.is_json() {
        return output.json(&resource);
    }

    print_resource(kind, &resource);
    if let Some(children) = kind
        .children_field()
        .and_then(|field| resource.get(field))
        .and_then(Value::as_array)
    {
        for child in children.iter().filter_map(Value::as_str) {
            println!("  - {child}");
        }
    }
    Ok(())
}

fn remove(
    client: &OrthancClient,
    kind: ResourceKind,
    id: &str,
    force: bool,
    output: Output,
) -> CliResult<()> {
    if !force {
        warning(&format!(
            "You are about to delete {} '{id}'. This cannot be undone.",
            kind.singular()
        ));
    }
    if !confirm(&format!("Delete {} {id}?", kind.singular()), force)? {
        println!("Operation cancelled");
        return Ok(());
    }

    let response = client.remove(kind, id)?;
    if output.is_json() {
        return output.json(&response);
    }

    success(&format!("Deleted {} {id}", kind.singular()));
    if let Some(ancestor) = response.remaining_ancestor {
        println!("Remaining ancestor: {} ({})", ancestor.id, ancestor.path);
    }
    Ok(())
}

/// Summary lines for one expanded resource.
pub(crate) fn resource_lines(kind: ResourceKind, resource: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    let field = |name: &str| resource.get(name).and_then(Value::as_str).unwrap_or("");

    lines.push(format!("ID: {}", field("ID")));
    if !field("Type").is_empty() {
        lines.push(format!("Type: {}", field("Type")));
    }

    for block in ["PatientMainDicomTags", "MainDicomTags"] {
        if let Some(tags) = resource.get(block).and_then(Value::as_object) {
            for (tag, value) in tags {
                let value = value
                    .as_str()
                    .map(str::to_owned)
                    .unwrap_or_else(|| value.to_string());
                lines.push(format!("{}: {value}", tag.to_title_case()));
            }
        }
    }

    if let Some(stable) = resource.get("IsStable").and_then(Value::as_bool) {
        lines.push(format!("Is Stable: {stable}"));
    }
    if !field("LastUpdate").is_empty() {
        lines.push(format!("Last Update: {}", field("LastUpdate")));
    }
    if let Some(children) = kind.children_field() {
        let count = resource.get(children).and_then(Value::as_array).map_or(0, Vec::len);
        lines.push(format!("{children}: {count}"));
    }
    lines
}

fn print_resource(kind: ResourceKind, resource: &Value) {
    for line in resource_lines(kind, resource) {
        println!("{line}");
    }
}

fn report_download(path: &std::path::Path, written: u64) {
    success(&format!("Saved {}", path.display()));
    println!("Size: {:.2} MB", written as f64 / (1024.0 * 1024.0));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn resource_lines_title_case_tags() {
        let study = json!({
            "ID": "27f7126f-4f66fb14-03f4081b-f9341db2-53925988",
            "Type": "Study",
            "IsStable": true,
            "LastUpdate": "20240101T120000",
            "MainDicomTags": { "StudyDate": "20240101", "AccessionNumber": "A1" },
            "PatientMainDicomTags": { "PatientName": "DOE^JOHN" },
            "Series": ["s1", "s2"]
        });

        assert_eq!(
            resource_lines(ResourceKind::Studies, &study),
            vec![
                "ID: 27f7126f-4f66fb14-03f4081b-f9341db2-53925988",
                "Type: Study",
                "Patient Name: DOE^JOHN",
                "Accession Number: A1",
                "Study Date: 20240101",
                "Is Stable: true",
                "Last Update: 20240101T120000",
                "Series: 2",
            ]
        );
    }

    #[test]
    fn child_ids_skip_entries_without_id() {
        let children = vec![
            json!({ "ID": "a" }),
            json!({ "Type": "Series" }),
            json!({ "ID": "b" }),
        ];
        assert_eq!(child_ids(&children), vec!["a", "b"]);
    }

    #[test]
    fn instances_have_no_child_count() {
        let lines = resource_lines(ResourceKind::Instances, &json!({ "ID": "i1" }));
        assert_eq!(lines, vec!["ID: i1"]);
    }
}
