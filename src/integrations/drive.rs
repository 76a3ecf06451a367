use crate::config::RemoteConfig;
use crate::integrations::auth::AuthProvider;
use crate::models::Document;
use crate::storage::{BackendKind, StorageBackend, SyncError};
use reqwest::blocking::{Client, Response, multipart};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

const FILES_PATH: &str = "/drive/v3/files";
const UPLOAD_PATH: &str = "/upload/drive/v3/files";
const JSON_MIME: &str = "application/json";

#[derive(Deserialize)]
struct FilesListResponse {
    files: Option<Vec<RemoteFile>>,
}

#[derive(Deserialize)]
struct RemoteFile {
    id: String,
}

#[derive(Deserialize)]
struct CreatedFile {
    id: Option<String>,
}

#[derive(Serialize)]
struct FileMetadata<'a> {
    name: &'a str,
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
}

/// One JSON document with a well-known name in the user's Drive.
pub struct DriveStore {
    client: Client,
    api_base: String,
    file_name: String,
    auth: Arc<dyn AuthProvider>,
}

impl DriveStore {
    pub fn new(config: &RemoteConfig, auth: Arc<dyn AuthProvider>) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(5)))
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            file_name: config.file_name.clone(),
            auth,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Finds the document id. Lookup errors are logged and reported as "not found".
    pub fn locate(&self) -> Option<String> {
        match self.try_locate() {
            Ok(id) => id,
            Err(e) => {
                log::error!("Error finding {}: {}", self.file_name, e.message());
                None
            }
        }
    }

    /// Finds the document, creating it with empty content when absent.
    pub fn open(&self) -> Result<String, SyncError> {
        if let Some(id) = self.locate() {
            return Ok(id);
        }
        log::info!("{} not found, creating a new one", self.file_name);
        self.create(&Document::initial())
    }

    pub fn create(&self, doc: &Document) -> Result<String, SyncError> {
        let metadata = FileMetadata {
            name: &self.file_name,
            mime_type: JSON_MIME,
        };
        let metadata = serde_json::to_string(&metadata)
            .map_err(|e| SyncError::Parse(e.to_string()))?;
        let content = serde_json::to_string(doc).map_err(|e| SyncError::Parse(e.to_string()))?;

        let form = multipart::Form::new()
            .part("metadata", json_part(metadata)?)
            .part("file", json_part(content)?);

        let resp = self
            .client
            .post(format!("{}{UPLOAD_PATH}", self.api_base))
            .bearer_auth(self.token())
            .query(&[("uploadType", "multipart")])
            .multipart(form)
            .send()
            .map_err(|e| SyncError::Request(e.to_string()))?;
        let resp = ensure_success(resp, "File create")?;

        let created: CreatedFile = resp
            .json()
            .map_err(|e| SyncError::Parse(e.to_string()))?;
        match created.id {
            Some(id) if !id.is_empty() => {
                log::info!("Created {} ({id})", self.file_name);
                Ok(id)
            }
            _ => Err(SyncError::Parse("File create response had no id".to_string())),
        }
    }

    pub fn read(&self, file_id: &str) -> Result<Document, SyncError> {
        let resp = self
            .client
            .get(format!("{}{FILES_PATH}/{file_id}", self.api_base))
            .bearer_auth(self.token())
            .query(&[("alt", "media")])
            .send()
            .map_err(|e| SyncError::Request(e.to_string()))?;
        let resp = ensure_success(resp, "File read")?;

        let body = resp.text().map_err(|e| SyncError::Request(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| SyncError::Parse(e.to_string()))
    }

    /// Replaces the full document content.
    pub fn write(&self, file_id: &str, doc: &Document) -> Result<(), SyncError> {
        let content = serde_json::to_string(doc).map_err(|e| SyncError::Parse(e.to_string()))?;
        let resp = self
            .client
            .patch(format!("{}{UPLOAD_PATH}/{file_id}", self.api_base))
            .bearer_auth(self.token())
            .query(&[("uploadType", "media")])
            .header(reqwest::header::CONTENT_TYPE, JSON_MIME)
            .body(content)
            .send()
            .map_err(|e| SyncError::Request(e.to_string()))?;
        ensure_success(resp, "File update")?;
        Ok(())
    }

    fn try_locate(&self) -> Result<Option<String>, SyncError> {
        let query = format!(
            "name = '{}' and trashed = false",
            escape_query_value(&self.file_name)
        );
        let resp = self
            .client
            .get(format!("{}{FILES_PATH}", self.api_base))
            .bearer_auth(self.token())
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id, name)"),
                ("spaces", "drive"),
            ])
            .send()
            .map_err(|e| SyncError::Request(e.to_string()))?;
        let resp = ensure_success(resp, "File list")?;

        let body: FilesListResponse = resp
            .json()
            .map_err(|e| SyncError::Parse(e.to_string()))?;
        Ok(body
            .files
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|file| file.id))
    }

    // An absent token still sends the request; the server rejects it like any
    // other failed call.
    fn token(&self) -> String {
        self.auth.access_token().unwrap_or_default()
    }
}

/// Escapes a string literal for the Drive `q` parameter.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn json_part(content: String) -> Result<multipart::Part, SyncError> {
    multipart::Part::text(content)
        .mime_str(JSON_MIME)
        .map_err(|e| SyncError::Request(e.to_string()))
}

fn ensure_success(resp: Response, context: &'static str) -> Result<Response, SyncError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(SyncError::Status {
            context,
            status: resp.status(),
        })
    }
}

/// Remote side of the storage seam. The document id is resolved on the first
/// read (locating the file or creating it); writes are dropped while it is
/// still unknown.
pub struct RemoteBackend {
    store: Arc<DriveStore>,
    file_id: OnceLock<String>,
}

impl RemoteBackend {
    pub fn new(store: Arc<DriveStore>) -> Self {
        Self {
            store,
            file_id: OnceLock::new(),
        }
    }

    fn resolve(&self) -> Result<&str, SyncError> {
        if let Some(id) = self.file_id.get() {
            return Ok(id.as_str());
        }
        let id = self.store.open()?;
        Ok(self.file_id.get_or_init(|| id).as_str())
    }
}

impl StorageBackend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn read(&self) -> Result<Document, SyncError> {
        let id = self.resolve()?;
        let doc = self.store.read(id)?;
        log::info!("Loaded remote data ({id})");
        Ok(doc)
    }

    fn write(&self, doc: &Document) -> Result<(), SyncError> {
        let Some(id) = self.file_id.get() else {
            log::warn!(
                "Skipping remote write: {} has not been located",
                self.store.file_name()
            );
            return Ok(());
        };
        self.store.write(id, doc)
    }
}
