use super::error::{ClientError, ClientResult};
use super::types::{
    AnonymizeRequest, DeleteResponse, FindRequest, IdAndPath, LogLevel, ModalityQuery,
    ModificationResponse, ResourceKind, RetrieveRequest, StoreRequest, SystemInfo, UploadResponse,
};
use crate::context::Context;
use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{fs::File, path::Path, time::Duration};
use tracing::{debug, info};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("orthanc-cli/", env!("CARGO_PKG_VERSION"));

pub const DICOM_MULTIPART: &str = "multipart/related; type=\"application/dicom\"";
pub const FRAMES_MULTIPART: &str = "multipart/related; type=\"application/octet-stream\"";
pub const DICOM_JSON: &str = "application/dicom+json";

/// Listing options shared by the resource collections.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListQuery {
    pub since: Option<u64>,
    pub limit: Option<u64>,
    pub expand: bool,
}

/// Identifies a WADO-RS target; deeper UIDs require the shallower ones.
#[derive(Debug, Clone, Default)]
pub struct WadoTarget {
    pub study_uid: String,
    pub series_uid: Option<String>,
    pub instance_uid: Option<String>,
    pub frames: Option<String>,
}

impl WadoTarget {
    pub fn path(&self) -> String {
        let mut path = format!("/dicom-web/studies/{}", self.study_uid);
        if let Some(series) = &self.series_uid {
            path.push_str(&format!("/series/{series}"));
            if let Some(instance) = &self.instance_uid {
                path.push_str(&format!("/instances/{instance}"));
                if let Some(frames) = &self.frames {
                    path.push_str(&format!("/frames/{frames}"));
                }
            }
        }
        path
    }

    pub fn metadata_path(&self) -> String {
        let mut target = self.clone();
        target.frames = None;
        format!("{}/metadata", target.path())
    }

    /// Rendered instance or frames; callers ensure series and instance are set.
    pub fn rendered_path(&self) -> String {
        format!("{}/rendered", self.path())
    }
}

/// Presentation options for WADO-RS rendered retrieval.
#[derive(Debug, Clone, Default)]
pub struct RenderedOptions {
    pub accept: Option<String>,
    pub quality: Option<u8>,
    pub viewport: Option<String>,
}

/// Blocking client bound to one resolved context.
pub struct OrthancClient {
    http: Client,
    base: String,
    username: Option<String>,
    password: Option<String>,
}

impl OrthancClient {
    pub fn new(context: &Context) -> ClientResult<Self> {
        let settings = &context.settings;
        let url = settings.url.trim();
        if url.is_empty() {
            return Err(ClientError::MissingUrl(context.name.clone()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ClientError::InvalidUrl(url.to_string()));
        }

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None::<Duration>)
            .danger_accept_invalid_certs(settings.insecure)
            .build()
            .map_err(ClientError::Build)?;

        let (username, password) = if settings.has_credentials() {
            (
                Some(settings.username.clone()),
                Some(settings.password.clone()),
            )
        } else {
            (None, None)
        };

        debug!(context = %context.name, %url, insecure = settings.insecure, "client ready");

        Ok(Self {
            http,
            base: url.trim_end_matches('/').to_string(),
            username,
            password,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url(path);
        debug!(%method, %url, "request");
        let builder = self.http.request(method, url);
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }

    /// Send and turn any non-2xx status into `ClientError::Status`.
    fn send(&self, method: Method, path: &str, builder: RequestBuilder) -> ClientResult<Response> {
        let url = self.url(path);
        let response = builder.send().map_err(|source| ClientError::Transport {
            method: method.to_string(),
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        Err(ClientError::Status {
            status: status.as_u16(),
            method: method.to_string(),
            url,
            message: error_message(&body, status.canonical_reason()),
        })
    }

    fn decode<T: DeserializeOwned>(&self, path: &str, response: Response) -> ClientResult<T> {
        response.json().map_err(|source| ClientError::Decode {
            url: self.url(path),
            source,
        })
    }

    pub fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let builder = self.request(Method::GET, path);
        let response = self.send(Method::GET, path, builder)?;
        self.decode(path, response)
    }

    pub fn get_json_with_query<T, Q>(&self, path: &str, query: &Q) -> ClientResult<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let builder = self
            .request(Method::GET, path)
            .header(ACCEPT, "application/json")
            .query(query);
        let response = self.send(Method::GET, path, builder)?;
        self.decode(path, response)
    }

    pub fn post_json<T, B>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let builder = self.request(Method::POST, path).json(body);
        let response = self.send(Method::POST, path, builder)?;
        self.decode(path, response)
    }

    /// POST whose response body is not interesting.
    pub fn post_empty<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ClientResult<()> {
        let builder = self.request(Method::POST, path).json(body);
        self.send(Method::POST, path, builder).map(drop)
    }

    pub fn delete<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let builder = self.request(Method::DELETE, path);
        let response = self.send(Method::DELETE, path, builder)?;
        self.decode(path, response)
    }

    pub fn delete_empty(&self, path: &str) -> ClientResult<()> {
        let builder = self.request(Method::DELETE, path);
        self.send(Method::DELETE, path, builder).map(drop)
    }

    pub fn put_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ClientResult<()> {
        let builder = self.request(Method::PUT, path).json(body);
        self.send(Method::PUT, path, builder).map(drop)
    }

    /// GET returning the raw response so the caller can stream its body.
    pub fn get_stream(&self, path: &str, accept: Option<&str>) -> ClientResult<Response> {
        let mut builder = self.request(Method::GET, path);
        if let Some(accept) = accept {
            builder = builder.header(ACCEPT, accept);
        }
        self.send(Method::GET, path, builder)
    }

    /// POST a JSON body and return the raw response for streaming.
    pub fn post_stream<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<Response> {
        let builder = self.request(Method::POST, path).json(body);
        self.send(Method::POST, path, builder)
    }

    pub fn get_text(&self, path: &str) -> ClientResult<String> {
        let builder = self.request(Method::GET, path);
        let response = self.send(Method::GET, path, builder)?;
        response.text().map_err(|source| ClientError::Decode {
            url: self.url(path),
            source,
        })
    }

    pub fn put_text(&self, path: &str, body: &str) -> ClientResult<()> {
        let builder = self
            .request(Method::PUT, path)
            .header(CONTENT_TYPE, "text/plain")
            .body(body.to_string());
        self.send(Method::PUT, path, builder).map(drop)
    }

    // Endpoints

    pub fn system(&self) -> ClientResult<SystemInfo> {
        self.get_json("/system")
    }

    pub fn list(&self, kind: ResourceKind, query: ListQuery) -> ClientResult<Vec<Value>> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(since) = query.since {
            params.push(("since", since.to_string()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        if query.expand {
            params.push(("expand", String::new()));
        }
        self.get_json_with_query(&format!("/{}", kind.collection()), &params)
    }

    pub fn resource(&self, kind: ResourceKind, id: &str) -> ClientResult<Value> {
        self.get_json(&kind.uri(id))
    }

    /// Expanded children of a resource, e.g. the series of a study.
    pub fn children(
        &self,
        kind: ResourceKind,
        id: &str,
        child: ResourceKind,
    ) -> ClientResult<Vec<Value>> {
        self.get_json(&format!("{}/{}", kind.uri(id), child.collection()))
    }

    /// Search the local database; IDs, or full resources when expanded.
    pub fn find(&self, request: &FindRequest) -> ClientResult<Vec<Value>> {
        self.post_json("/tools/find", request)
    }

    pub fn remove(&self, kind: ResourceKind, id: &str) -> ClientResult<DeleteResponse> {
        info!(%kind, %id, "deleting resource");
        self.delete(&kind.uri(id))
    }

    /// Anonymize a patient, study or series; Orthanc answers with the new resource.
    pub fn anonymize(
        &self,
        kind: ResourceKind,
        id: &str,
        request: &AnonymizeRequest,
    ) -> ClientResult<ModificationResponse> {
        self.post_json(&format!("{}/anonymize", kind.uri(id)), request)
    }

    /// Anonymize one instance; Orthanc answers with the rewritten DICOM file.
    pub fn anonymize_instance(
        &self,
        id: &str,
        request: &AnonymizeRequest,
    ) -> ClientResult<Response> {
        self.post_stream(
            &format!("{}/anonymize", ResourceKind::Instances.uri(id)),
            request,
        )
    }

    pub fn archive(&self, kind: ResourceKind, id: &str) -> ClientResult<Response> {
        self.get_stream(&format!("{}/archive", kind.uri(id)), None)
    }

    pub fn instance_file(&self, id: &str) -> ClientResult<Response> {
        self.get_stream(&format!("{}/file", ResourceKind::Instances.uri(id)), None)
    }

    pub fn upload(&self, file: &Path) -> ClientResult<UploadResponse> {
        let handle = File::open(file).map_err(|source| ClientError::File {
            path: file.to_path_buf(),
            source,
        })?;
        let path = "/instances";
        let builder = self
            .request(Method::POST, path)
            .header(CONTENT_TYPE, "application/dicom")
            .body(handle);
        let response = self.send(Method::POST, path, builder)?;
        self.decode(path, response)
    }

    pub fn modalities(&self, expand: bool) -> ClientResult<Value> {
        self.named_collection("/modalities", expand)
    }

    pub fn modality(&self, name: &str) -> ClientResult<Value> {
        self.get_json(&format!("/modalities/{name}/configuration"))
    }

    pub fn echo_modality(&self, name: &str) -> ClientResult<()> {
        self.post_empty(&format!("/modalities/{name}/echo"), &serde_json::json!({}))
    }

    /// Create or replace a modality.
    pub fn save_modality<B: Serialize + ?Sized>(&self, name: &str, config: &B) -> ClientResult<()> {
        info!(%name, "saving modality");
        self.put_json(&format!("/modalities/{name}"), config)
    }

    pub fn remove_modality(&self, name: &str) -> ClientResult<()> {
        info!(%name, "deleting modality");
        self.delete_empty(&format!("/modalities/{name}"))
    }

    /// C-FIND against a modality, returning the simplified answers.
    pub fn query_modality(&self, name: &str, query: &ModalityQuery) -> ClientResult<Vec<Value>> {
        let created: IdAndPath = self.post_json(&format!("/modalities/{name}/query"), query)?;
        debug!(query = %created.id, "modality query created");
        self.get_json_with_query(
            &format!("/queries/{}/answers", created.id),
            &[("expand", ""), ("simplify", "")],
        )
    }

    pub fn move_from_modality(&self, name: &str, request: &RetrieveRequest) -> ClientResult<Value> {
        self.post_json(&format!("/modalities/{name}/move"), request)
    }

    pub fn get_from_modality(&self, name: &str, request: &RetrieveRequest) -> ClientResult<Value> {
        self.post_json(&format!("/modalities/{name}/get"), request)
    }

    pub fn store_to_modality(&self, name: &str, request: &StoreRequest) -> ClientResult<Value> {
        self.post_json(&format!("/modalities/{name}/store"), request)
    }

    pub fn dicomweb_servers(&self, expand: bool) -> ClientResult<Value> {
        self.named_collection("/dicom-web/servers", expand)
    }

    /// Create or replace a DICOMweb server.
    pub fn save_dicomweb_server<B: Serialize + ?Sized>(
        &self,
        name: &str,
        config: &B,
    ) -> ClientResult<()> {
        info!(%name, "saving DICOMweb server");
        self.put_json(&format!("/dicom-web/servers/{name}"), config)
    }

    pub fn remove_dicomweb_server(&self, name: &str) -> ClientResult<()> {
        info!(%name, "deleting DICOMweb server");
        self.delete_empty(&format!("/dicom-web/servers/{name}"))
    }

    fn named_collection(&self, path: &str, expand: bool) -> ClientResult<Value> {
        if expand {
            self.get_json_with_query(path, &[("expand", "")])
        } else {
            self.get_json(path)
        }
    }

    pub fn log_level(&self) -> ClientResult<String> {
        self.get_text("/tools/log-level")
            .map(|level| level.trim().to_string())
    }

    pub fn set_log_level(&self, level: LogLevel) -> ClientResult<()> {
        self.put_text("/tools/log-level", level.as_str())
    }

    pub fn reset(&self) -> ClientResult<()> {
        self.post_empty("/tools/reset", &serde_json::json!({}))
    }

    pub fn shutdown(&self) -> ClientResult<()> {
        self.post_empty("/tools/shutdown", &serde_json::json!({}))
    }

    pub fn wado_rs(&self, target: &WadoTarget) -> ClientResult<Response> {
        let accept = if target.frames.is_some() {
            FRAMES_MULTIPART
        } else {
            DICOM_MULTIPART
        };
        self.get_stream(&target.path(), Some(accept))
    }

    pub fn wado_rs_metadata(&self, target: &WadoTarget) -> ClientResult<Value> {
        let path = target.metadata_path();
        let builder = self.request(Method::GET, &path).header(ACCEPT, DICOM_JSON);
        let response = self.send(Method::GET, &path, builder)?;
        self.decode(&path, response)
    }

    pub fn wado_rs_rendered(
        &self,
        target: &WadoTarget,
        options: &RenderedOptions,
    ) -> ClientResult<Response> {
        let path = target.rendered_path();
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(quality) = options.quality {
            params.push(("quality", quality.to_string()));
        }
        if let Some(viewport) = &options.viewport {
            params.push(("viewport", viewport.clone()));
        }

        let mut builder = self.request(Method::GET, &path).query(&params);
        if let Some(accept) = &options.accept {
            builder = builder.header(ACCEPT, accept.as_str());
        }
        self.send(Method::GET, &path, builder)
    }

    /// WADO-URI retrieval; `params` follow `requestType=WADO`.
    pub fn wado_uri(&self, params: &[(&str, String)]) -> ClientResult<Response> {
        let path = "/wado";
        let builder = self
            .request(Method::GET, path)
            .query(&[("requestType", "WADO")])
            .query(params);
        self.send(Method::GET, path, builder)
    }

    pub fn qido_rs(
        &self,
        level: &str,
        filters: &[(String, String)],
        limit: Option<u64>,
    ) -> ClientResult<Value> {
        let path = format!("/dicom-web/{level}");
        let mut params: Vec<(&str, String)> = filters
            .iter()
            .map(|(key, value)| (key.as_str(), value.clone()))
            .collect();
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        let builder = self
            .request(Method::GET, &path)
            .header(ACCEPT, DICOM_JSON)
            .query(&params);
        let response = self.send(Method::GET, &path, builder)?;
        self.decode(&path, response)
    }
}

/// Orthanc reports failures as JSON with `Details`/`Message`; fall back to
/// the raw body, then to the status reason.
fn error_message(body: &str, reason: Option<&str>) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for field in ["Details", "Message"] {
            if let Some(Value::String(text)) = map.get(field) {
                if !text.is_empty() {
                    return text.clone();
                }
            }
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    reason.unwrap_or("unknown error").to_string()
}
