//! Session state for the remote store. Acquiring tokens happens elsewhere
//! (an OAuth client hands us the access token); this module only keeps the
//! current token and tells subscribers when the signed-in state flips.

use crate::storage::SyncError;
use chrono::{TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};

/// Tokens this close to expiry are treated as already expired.
const EXPIRY_SLACK_SECONDS: i64 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
}

pub trait AuthProvider: Send + Sync {
    fn is_authenticated(&self) -> bool;
    /// Current bearer token, read at call time.
    fn access_token(&self) -> Option<String>;
    fn login(&self, access_token: &str, expires_in: Option<u64>) -> Result<(), SyncError>;
    fn logout(&self) -> Result<(), SyncError>;
    fn subscribe(&self) -> Receiver<AuthEvent>;
}

#[derive(Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

impl StoredToken {
    fn is_valid(&self) -> bool {
        if self.access_token.trim().is_empty() {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => expires_at > Utc::now().timestamp() + EXPIRY_SLACK_SECONDS,
            None => true,
        }
    }
}

fn expiry_timestamp(expires_in: u64) -> Result<i64, SyncError> {
    i64::try_from(expires_in)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .map(|at| at.timestamp())
        .ok_or_else(|| SyncError::Config(format!("Token lifetime of {expires_in}s is out of range.")))
}

/// Keeps the token in a small JSON file so separate runs share one session.
pub struct TokenFileAuth {
    path: PathBuf,
    listeners: Mutex<Vec<Sender<AuthEvent>>>,
}

impl TokenFileAuth {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn current(&self) -> Option<StoredToken> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Failed to read token file ({:?}): {e}", self.path);
                return None;
            }
        };
        match serde_json::from_str::<StoredToken>(&content) {
            Ok(token) if token.is_valid() => Some(token),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Failed to parse token file ({:?}): {e}", self.path);
                None
            }
        }
    }

    fn notify(&self, event: AuthEvent) {
        let Ok(mut listeners) = self.listeners.lock() else {
            return;
        };
        listeners.retain(|tx| tx.send(event).is_ok());
    }
}

impl AuthProvider for TokenFileAuth {
    fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }

    fn access_token(&self) -> Option<String> {
        self.current().map(|token| token.access_token)
    }

    fn login(&self, access_token: &str, expires_in: Option<u64>) -> Result<(), SyncError> {
        if access_token.trim().is_empty() {
            return Err(SyncError::Config("Access token must not be empty.".to_string()));
        }
        let expires_at = match expires_in {
            Some(secs) => Some(expiry_timestamp(secs)?),
            None => None,
        };
        let was_authenticated = self.is_authenticated();

        let stored = StoredToken {
            access_token: access_token.trim().to_string(),
            expires_at,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&stored)
            .map_err(|e| SyncError::Parse(e.to_string()))?;
        fs::write(&self.path, content)?;

        if !was_authenticated && self.is_authenticated() {
            log::info!("Signed in");
            self.notify(AuthEvent::SignedIn);
        }
        Ok(())
    }

    fn logout(&self) -> Result<(), SyncError> {
        let was_authenticated = self.is_authenticated();
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if was_authenticated {
            log::info!("Signed out");
            self.notify(AuthEvent::SignedOut);
        }
        Ok(())
    }

    fn subscribe(&self) -> Receiver<AuthEvent> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(tx);
        }
        rx
    }
}
