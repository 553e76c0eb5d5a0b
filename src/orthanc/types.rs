use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// DICOM resource levels exposed by the Orthanc REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Patients,
    Studies,
    Series,
    Instances,
}

impl ResourceKind {
    /// URI collection segment, e.g. `studies`.
    pub fn collection(self) -> &'static str {
        match self {
            ResourceKind::Patients => "patients",
            ResourceKind::Studies => "studies",
            ResourceKind::Series => "series",
            ResourceKind::Instances => "instances",
        }
    }

    pub fn singular(self) -> &'static str {
        match self {
            ResourceKind::Patients => "patient",
            ResourceKind::Studies => "study",
            ResourceKind::Series => "series",
            ResourceKind::Instances => "instance",
        }
    }

    /// Field listing child IDs in the resource JSON.
    pub fn children_field(self) -> Option<&'static str> {
        match self {
            ResourceKind::Patients => Some("Studies"),
            ResourceKind::Studies => Some("Series"),
            ResourceKind::Series => Some("Instances"),
            ResourceKind::Instances => None,
        }
    }

    pub fn uri(self, id: &str) -> String {
        format!("/{}/{}", self.collection(), id)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

/// Response of `GET /system`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SystemInfo {
    pub name: String,
    pub version: String,
    pub api_version: u32,
    pub http_port: u16,
    pub dicom_aet: String,
    pub dicom_port: u16,
    pub database_version: u32,
    pub database_backend_plugin: Option<String>,
    pub storage_area_plugin: Option<String>,
    pub maximum_storage_size: u64,
    pub plugins_enabled: bool,
    pub check_revisions: bool,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// Body of `POST /{kind}/{id}/anonymize`.
///
/// Every flag is tri-state: `None` leaves the server default in place and is
/// omitted from the request, `Some(false)` is sent explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AnonymizeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_source: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissive: Option<bool>,
}

/// Resource level used by `/tools/find` and the DIMSE operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum ResourceLevel {
    Patient,
    Study,
    Series,
    Instance,
}

impl ResourceLevel {
    pub fn kind(self) -> ResourceKind {
        match self {
            ResourceLevel::Patient => ResourceKind::Patients,
            ResourceLevel::Study => ResourceKind::Studies,
            ResourceLevel::Series => ResourceKind::Series,
            ResourceLevel::Instance => ResourceKind::Instances,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
pub enum LabelsConstraint {
    All,
    Any,
    None,
}

/// Body of `POST /tools/find`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FindRequest {
    pub level: ResourceLevel,
    pub query: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub expand: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requested_tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels_constraint: Option<LabelsConstraint>,
}

/// Fields of a DICOM modality as accepted by `PUT /modalities/{name}`.
///
/// Unset fields are omitted, so the same value serves as a full
/// configuration or as a patch over a stored one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModalityConfig {
    #[serde(rename = "AET", skip_serializing_if = "Option::is_none")]
    pub aet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_echo: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_find: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_get: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_move: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_store: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
}

/// Fields of a DICOMweb server as accepted by `PUT /dicom-web/servers/{name}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DicomWebServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_delete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunked_transfers: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_wado_rs_universal_transfer_syntax: Option<bool>,
}

/// Body of `POST /modalities/{name}/query` (C-FIND).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModalityQuery {
    pub level: ResourceLevel,
    pub query: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalize: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
}

/// Body of `POST /modalities/{name}/move` (C-MOVE) and `/get` (C-GET).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RetrieveRequest {
    pub level: ResourceLevel,
    pub resources: Vec<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_aet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asynchronous: Option<bool>,
}

/// Body of `POST /modalities/{name}/store` (C-STORE).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StoreRequest {
    pub resources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synchronous: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_aet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub called_aet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub move_originator_aet: Option<String>,
    #[serde(rename = "MoveOriginatorID", skip_serializing_if = "Option::is_none")]
    pub move_originator_id: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_commitment: Option<bool>,
}

/// Result of a synchronous anonymization of a patient, study or series.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModificationResponse {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "PatientID")]
    pub patient_id: String,
    #[serde(rename = "Type")]
    pub kind: String,
}

/// ID and path of an Orthanc resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdAndPath {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "Type", default)]
    pub kind: String,
}

/// Response from deleting a DICOM resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeleteResponse {
    pub remaining_ancestor: Option<IdAndPath>,
}

/// Response of `POST /instances`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadResponse {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "ParentPatient")]
    pub parent_patient: String,
    #[serde(rename = "ParentStudy")]
    pub parent_study: String,
    #[serde(rename = "ParentSeries")]
    pub parent_series: String,
}

/// Server verbosity accepted by `/tools/log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Default,
    Verbose,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Default => "default",
            LogLevel::Verbose => "verbose",
            LogLevel::Trace => "trace",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "default" => Some(LogLevel::Default),
            "verbose" => Some(LogLevel::Verbose),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            LogLevel::Default => "only WARNING and ERROR messages",
            LogLevel::Verbose => "adds INFO messages",
            LogLevel::Trace => "adds TRACE messages for debugging",
        }
    }
}
