use crate::models::Document;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("{0}")]
    Request(String),
    #[error("{context} failed: HTTP {status}")]
    Status {
        context: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("Invalid document: {0}")]
    Parse(String),
    #[error("{0}")]
    Io(String),
    #[error("{0}")]
    Config(String),
}

impl SyncError {
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl From<io::Error> for SyncError {
    fn from(err: io::Error) -> Self {
        SyncError::Io(err.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Remote,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Remote => "remote",
        }
    }
}

/// Remote storage is used only when signed in and the remote client is ready.
pub fn select_backend(authenticated: bool, remote_ready: bool) -> BackendKind {
    if authenticated && remote_ready {
        BackendKind::Remote
    } else {
        BackendKind::Local
    }
}

/// A whole-document persistence target.
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;
    fn read(&self) -> Result<Document, SyncError>;
    fn write(&self, doc: &Document) -> Result<(), SyncError>;
}

/// Single JSON file on the local disk. Local data is a convenience cache:
/// failures are logged and never reach the caller.
#[derive(Clone, Debug)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Document {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Document::initial(),
            Err(e) => {
                log::warn!("Failed to read local data ({:?}): {e}", self.path);
                return Document::initial();
            }
        };

        match serde_json::from_str::<Document>(&content) {
            Ok(doc) => doc,
            Err(e) => {
                log::warn!("Failed to parse local data ({:?}): {e}", self.path);
                Document::initial()
            }
        }
    }

    pub fn write(&self, doc: &Document) {
        if let Err(e) = self.try_write(doc) {
            log::warn!("Failed to save local data ({:?}): {e}", self.path);
        }
    }

    fn try_write(&self, doc: &Document) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(doc)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        // Write beside the target and rename so readers never see a partial file.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)
    }
}

pub struct LocalBackend {
    store: LocalStore,
}

impl LocalBackend {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }
}

impl StorageBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn read(&self) -> Result<Document, SyncError> {
        Ok(self.store.read())
    }

    fn write(&self, doc: &Document) -> Result<(), SyncError> {
        self.store.write(doc);
        Ok(())
    }
}
