use super::parse_key_value;
use crate::{
    error::{CliError, CliResult},
    multipart::{Target, extract, is_multipart, media_type},
    orthanc::{OrthancClient, RenderedOptions, WadoTarget},
    output::{Output, resolve_output_path, save_stream, write_stdout},
};
use clap::{Args, Subcommand, ValueEnum};
use heck::ToTitleCase;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use reqwest::blocking::Response;
use std::{
    io,
    path::{Path, PathBuf},
};
use tabled::{builder::Builder, settings::Style};
use tracing::{debug, info};

#[derive(Subcommand)]
pub enum DicomwebCommand {
    /// Retrieve studies, series, instances, frames or metadata (WADO-RS)
    WadoRs(WadoArgs),
    /// Search studies, series or instances (QIDO-RS)
    QidoRs(QidoArgs),
    /// Retrieve one object through WADO-URI
    Wado(WadoUriArgs),
}

#[derive(Args)]
pub struct WadoArgs {
    #[arg(long)]
    pub study_uid: String,
    #[arg(long)]
    pub series_uid: Option<String>,
    #[arg(long)]
    pub instance_uid: Option<String>,
    /// Frame numbers, e.g. 1,2,3 (needs --series-uid and --instance-uid)
    #[arg(long)]
    pub frames: Option<String>,
    /// Print metadata as JSON instead of retrieving bulk data
    #[arg(long, conflicts_with_all = ["frames", "output", "output_dir", "rendered"])]
    pub metadata: bool,
    /// Retrieve a rendered image of the instance or frames
    #[arg(long, conflicts_with = "output_dir")]
    pub rendered: bool,
    /// Media type of the rendered image, e.g. image/png
    #[arg(long, requires = "rendered")]
    pub accept: Option<String>,
    /// Lossy compression quality of the rendered image
    #[arg(long, requires = "rendered", value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,
    /// Rendered image size as WIDTH,HEIGHT
    #[arg(long, requires = "rendered")]
    pub viewport: Option<String>,
    /// Output file; multipart responses are saved as a .zip archive
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Extract each part of a multipart response into this directory
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct WadoUriArgs {
    #[arg(long)]
    pub study_uid: String,
    #[arg(long)]
    pub series_uid: String,
    /// SOP Instance UID
    #[arg(long)]
    pub object_uid: String,
    /// Requested media type, e.g. application/dicom or image/jpeg
    #[arg(long)]
    pub content_type: Option<String>,
    #[arg(long)]
    pub transfer_syntax: Option<String>,
    /// Remove patient identification from the returned object
    #[arg(long)]
    pub anonymize: bool,
    /// Frame number of a multi-frame instance
    #[arg(long)]
    pub frame: Option<u32>,
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,
    #[arg(long)]
    pub window_center: Option<String>,
    #[arg(long)]
    pub window_width: Option<String>,
    #[arg(long)]
    pub rows: Option<u32>,
    #[arg(long)]
    pub columns: Option<u32>,
    /// Region of interest as x,y,width,height
    #[arg(long)]
    pub region: Option<String>,
    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl WadoUriArgs {
    /// Query parameters after `requestType=WADO`.
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("studyUID", self.study_uid.clone()),
            ("seriesUID", self.series_uid.clone()),
            ("objectUID", self.object_uid.clone()),
        ];
        let optional = [
            ("contentType", self.content_type.clone()),
            ("transferSyntax", self.transfer_syntax.clone()),
            ("anonymize", self.anonymize.then(|| "yes".to_owned())),
            ("frameNumber", self.frame.map(|n| n.to_string())),
            ("imageQuality", self.quality.map(|n| n.to_string())),
            ("windowCenter", self.window_center.clone()),
            ("windowWidth", self.window_width.clone()),
            ("rows", self.rows.map(|n| n.to_string())),
            ("columns", self.columns.map(|n| n.to_string())),
            ("region", self.region.clone()),
        ];
        params.extend(
            optional
                .into_iter()
                .filter_map(|(key, value)| value.map(|value| (key, value))),
        );
        params
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QueryLevel {
    Studies,
    Series,
    Instances,
}

impl QueryLevel {
    fn as_str(self) -> &'static str {
        match self {
            QueryLevel::Studies => "studies",
            QueryLevel::Series => "series",
            QueryLevel::Instances => "instances",
        }
    }

    /// Attributes shown as table columns, by tag and keyword.
    fn columns(self) -> &'static [(&'static str, &'static str)] {
        match self {
            QueryLevel::Studies => &[
                ("0020000D", "StudyInstanceUID"),
                ("00100010", "PatientName"),
                ("00100020", "PatientID"),
                ("00080020", "StudyDate"),
                ("00080061", "ModalitiesInStudy"),
                ("00081030", "StudyDescription"),
            ],
            QueryLevel::Series => &[
                ("0020000E", "SeriesInstanceUID"),
                ("00080060", "Modality"),
                ("00200011", "SeriesNumber"),
                ("0008103E", "SeriesDescription"),
            ],
            QueryLevel::Instances => &[
                ("00080018", "SOPInstanceUID"),
                ("00080016", "SOPClassUID"),
                ("00200013", "InstanceNumber"),
            ],
        }
    }
}

#[derive(Args)]
pub struct QidoArgs {
    #[arg(value_enum)]
    pub level: QueryLevel,
    /// Match attribute, e.g. PatientName=DOE* (repeatable)
    #[arg(long = "filter", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub filters: Vec<(String, String)>,
    #[arg(long)]
    pub patient_id: Option<String>,
    #[arg(long)]
    pub patient_name: Option<String>,
    #[arg(long)]
    pub study_uid: Option<String>,
    #[arg(long)]
    pub study_date: Option<String>,
    #[arg(long)]
    pub modality: Option<String>,
    /// Additional attribute to return (repeatable)
    #[arg(long)]
    pub include_field: Vec<String>,
    #[arg(long)]
    pub fuzzy: bool,
    #[arg(long)]
    pub offset: Option<u64>,
    #[arg(long)]
    pub limit: Option<u64>,
}

impl QidoArgs {
    fn query(&self) -> Vec<(String, String)> {
        let mut query = self.filters.clone();
        let named = [
            ("PatientID", &self.patient_id),
            ("PatientName", &self.patient_name),
            ("StudyInstanceUID", &self.study_uid),
            ("StudyDate", &self.study_date),
            ("Modality", &self.modality),
        ];
        for (key, value) in named {
            if let Some(value) = value {
                query.push((key.to_owned(), value.clone()));
            }
        }
        for field in &self.include_field {
            query.push(("includefield".to_owned(), field.clone()));
        }
        if self.fuzzy {
            query.push(("fuzzymatching".to_owned(), "true".to_owned()));
        }
        if let Some(offset) = self.offset {
            query.push(("offset".to_owned(), offset.to_string()));
        }
        query
    }
}

pub fn handle(client: &OrthancClient, action: DicomwebCommand, output: Output) -> CliResult<()> {
    match action {
        DicomwebCommand::WadoRs(args) => wado_rs(client, args),
        DicomwebCommand::QidoRs(args) => qido_rs(client, &args, output),
        DicomwebCommand::Wado(args) => {
            let response = client.wado_uri(&args.params())?;
            let name = object_file_name(&args.object_uid, args.content_type.as_deref(), "dcm");
            write_response(response, args.output.as_deref(), &name)
        }
    }
}

/// `<uid>.<ext>` with the extension taken from the requested media type.
fn object_file_name(uid: &str, media_type: Option<&str>, fallback: &str) -> String {
    let extension = match media_type.map(str::to_ascii_lowercase).as_deref() {
        Some("image/png") => "png",
        Some("image/jpeg" | "image/jpg") => "jpg",
        Some("image/gif") => "gif",
        Some("application/dicom") => "dcm",
        _ => fallback,
    };
    format!("{uid}.{extension}")
}

/// Write a single-object response to `output`, or stdout without one. A
/// directory output receives `default_name`.
fn write_response(response: Response, output: Option<&Path>, default_name: &str) -> CliResult<()> {
    match output {
        Some(path) => {
            let path = resolve_output_path(Some(path), default_name)?;
            let length = response.content_length();
            let written = save_stream(response, length, &path)?;
            eprintln!("Written {written} bytes to {}", path.display());
        }
        None => {
            write_stdout(response)?;
        }
    }
    Ok(())
}

fn wado_target(args: &WadoArgs) -> CliResult<WadoTarget> {
    if args.frames.is_some() && (args.series_uid.is_none() || args.instance_uid.is_none()) {
        return Err(CliError::Usage(
            "--series-uid and --instance-uid are required with --frames".into(),
        ));
    }
    if args.instance_uid.is_some() && args.series_uid.is_none() {
        return Err(CliError::Usage(
            "--series-uid is required with --instance-uid".into(),
        ));
    }
    if args.rendered && (args.series_uid.is_none() || args.instance_uid.is_none()) {
        return Err(CliError::Usage(
            "--series-uid and --instance-uid are required with --rendered".into(),
        ));
    }

    Ok(WadoTarget {
        study_uid: args.study_uid.clone(),
        series_uid: args.series_uid.clone(),
        instance_uid: args.instance_uid.clone(),
        frames: args.frames.clone(),
    })
}

fn wado_rs(client: &OrthancClient, args: WadoArgs) -> CliResult<()> {
    let target = wado_target(&args)?;

    if args.metadata {
        let metadata = client.wado_rs_metadata(&target)?;
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    if args.rendered {
        let options = RenderedOptions {
            accept: args.accept.clone(),
            quality: args.quality,
            viewport: args.viewport.clone(),
        };
        let response = client.wado_rs_rendered(&target, &options)?;
        let uid = target.instance_uid.as_deref().unwrap_or(&target.study_uid);
        let name = object_file_name(uid, args.accept.as_deref(), "jpg");
        return write_response(response, args.output.as_deref(), &name);
    }

    let response = client.wado_rs(&target)?;
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_owned();
    debug!(%content_type, "WADO-RS response");

    if is_multipart(&content_type) {
        let destination = Target::select(args.output_dir.as_deref(), args.output.as_deref());
        if let (Target::Archive(path), Some(requested)) = (&destination, &args.output) {
            if path != requested {
                eprintln!("Multipart response detected, saving as: {}", path.display());
            }
        }

        let result = extract(&content_type, response, &destination, io::stdout().lock())?;
        info!(parts = result.part_count, bytes = result.total_bytes, "extraction complete");
        return Ok(());
    }

    info!(media_type = %media_type(&content_type), "single-part response");
    let default_name = format!(
        "{}.dcm",
        target.instance_uid.as_deref().unwrap_or(&target.study_uid)
    );
    let requested = match (&args.output, &args.output_dir) {
        (Some(file), _) => Some(file.clone()),
        (None, Some(dir)) => Some(dir.join("")),
        (None, None) => None,
    };

    match requested {
        Some(requested) => {
            let path = resolve_output_path(Some(&requested), &default_name)?;
            let length = response.content_length();
            let written = save_stream(response, length, &path)?;
            eprintln!("Saved {} ({written} bytes)", path.display());
        }
        None => {
            write_stdout(response)?;
        }
    }
    Ok(())
}

fn qido_rs(client: &OrthancClient, args: &QidoArgs, output: Output) -> CliResult<()> {
    let results = client.qido_rs(args.level.as_str(), &args.query(), args.limit)?;

    if output.is_json() {
        return output.json(&results);
    }

    let rows = results.as_array().map(Vec::as_slice).unwrap_or_default();
    if rows.is_empty() {
        println!("No {} found.", args.level.as_str());
        return Ok(());
    }

    println!("{}", qido_table(args.level, rows));
    println!("\n{} result(s)", rows.len());
    Ok(())
}

fn qido_table(level: QueryLevel, rows: &[Value]) -> String {
    let columns = level.columns();
    let mut builder = Builder::default();
    builder.push_record(columns.iter().map(|(_, keyword)| keyword.to_title_case()));
    for row in rows {
        builder.push_record(columns.iter().map(|(tag, _)| attribute_text(row, tag)));
    }
    builder.build().with(Style::blank()).to_string()
}

/// Render one DICOM JSON attribute; multiple values are joined with `\`.
pub(crate) fn attribute_text(dataset: &Value, tag: &str) -> String {
    let Some(values) = dataset
        .get(tag)
        .and_then(|attribute| attribute.get("Value"))
        .and_then(Value::as_array)
    else {
        return String::new();
    };

    values
        .iter()
        .map(|value| match value {
            Value::String(text) => text.clone(),
            Value::Object(name) => name
                .get("Alphabetic")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\\")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn wado(series: Option<&str>, instance: Option<&str>, frames: Option<&str>) -> WadoArgs {
        WadoArgs {
            study_uid: "1.2".into(),
            series_uid: series.map(Into::into),
            instance_uid: instance.map(Into::into),
            frames: frames.map(Into::into),
            metadata: false,
            rendered: false,
            accept: None,
            quality: None,
            viewport: None,
            output: None,
            output_dir: None,
        }
    }

    #[test]
    fn frames_need_series_and_instance() {
        assert!(matches!(
            wado_target(&wado(Some("1.2.3"), None, Some("1"))),
            Err(CliError::Usage(_))
        ));
        assert!(matches!(
            wado_target(&wado(None, Some("1.2.3.4"), None)),
            Err(CliError::Usage(_))
        ));
        let target = wado_target(&wado(Some("1.2.3"), Some("1.2.3.4"), Some("1,2"))).unwrap();
        assert_eq!(target.frames.as_deref(), Some("1,2"));
    }

    #[test]
    fn rendered_needs_series_and_instance() {
        let mut args = wado(Some("1.2.3"), None, None);
        args.rendered = true;
        assert!(matches!(wado_target(&args), Err(CliError::Usage(_))));

        args.instance_uid = Some("1.2.3.4".into());
        let target = wado_target(&args).unwrap();
        assert_eq!(
            target.rendered_path(),
            "/dicom-web/studies/1.2/series/1.2.3/instances/1.2.3.4/rendered"
        );
    }

    fn parse(args: &[&str]) -> DicomwebCommand {
        let argv = ["orthanc", "dicomweb"].into_iter().chain(args.iter().copied());
        match crate::cmd::Cli::try_parse_from(argv).map(|cli| cli.command) {
            Ok(crate::cmd::Command::Dicomweb(action)) => action,
            _ => panic!("expected a dicomweb command"),
        }
    }

    #[test]
    fn rendered_options_require_rendered() {
        let result = crate::cmd::Cli::try_parse_from([
            "orthanc",
            "dicomweb",
            "wado-rs",
            "--study-uid",
            "1.2",
            "--accept",
            "image/png",
        ]);
        assert!(result.is_err());

        let DicomwebCommand::WadoRs(args) = parse(&[
            "wado-rs",
            "--study-uid",
            "1.2",
            "--series-uid",
            "1.2.3",
            "--instance-uid",
            "1.2.3.4",
            "--rendered",
            "--accept",
            "image/png",
            "--quality",
            "80",
        ]) else {
            panic!("expected wado-rs");
        };
        assert!(args.rendered);
        assert_eq!(args.quality, Some(80));
    }

    #[test]
    fn object_names_follow_the_media_type() {
        assert_eq!(object_file_name("1.2", Some("image/PNG"), "jpg"), "1.2.png");
        assert_eq!(object_file_name("1.2", None, "jpg"), "1.2.jpg");
        assert_eq!(object_file_name("1.2", Some("application/dicom"), "jpg"), "1.2.dcm");
        assert_eq!(object_file_name("1.2", Some("text/html"), "dcm"), "1.2.dcm");
    }

    #[test]
    fn quality_is_bounded() {
        let result = crate::cmd::Cli::try_parse_from([
            "orthanc",
            "dicomweb",
            "wado",
            "--study-uid",
            "1",
            "--series-uid",
            "2",
            "--object-uid",
            "3",
            "--quality",
            "101",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn wado_uri_params_follow_the_flags() {
        let DicomwebCommand::Wado(args) = parse(&[
            "wado",
            "--study-uid",
            "1.2",
            "--series-uid",
            "1.2.3",
            "--object-uid",
            "1.2.3.4",
            "--content-type",
            "image/jpeg",
            "--anonymize",
            "--frame",
            "2",
        ]) else {
            panic!("expected wado");
        };
        assert_eq!(
            args.params(),
            vec![
                ("studyUID", "1.2".to_string()),
                ("seriesUID", "1.2.3".to_string()),
                ("objectUID", "1.2.3.4".to_string()),
                ("contentType", "image/jpeg".to_string()),
                ("anonymize", "yes".to_string()),
                ("frameNumber", "2".to_string()),
            ]
        );
    }

    #[test]
    fn attribute_text_handles_person_names_and_numbers() {
        let dataset = json!({
            "00100010": { "vr": "PN", "Value": [{ "Alphabetic": "DOE^JOHN" }] },
            "00080061": { "vr": "CS", "Value": ["CT", "MR"] },
            "00200011": { "vr": "IS", "Value": [3] },
            "00081030": { "vr": "LO" }
        });
        assert_eq!(attribute_text(&dataset, "00100010"), "DOE^JOHN");
        assert_eq!(attribute_text(&dataset, "00080061"), "CT\\MR");
        assert_eq!(attribute_text(&dataset, "00200011"), "3");
        assert_eq!(attribute_text(&dataset, "00081030"), "");
        assert_eq!(attribute_text(&dataset, "7FE00010"), "");
    }

    #[test]
    fn qido_table_has_title_case_headers() {
        let rows = vec![json!({
            "00080060": { "vr": "CS", "Value": ["CT"] },
            "0020000E": { "vr": "UI", "Value": ["1.2.3"] }
        })];
        let table = qido_table(QueryLevel::Series, &rows);
        assert!(table.contains("Modality"));
        assert!(table.contains("Series Instance"));
        assert!(table.contains("1.2.3"));
    }
}
