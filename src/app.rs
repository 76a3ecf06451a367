use crate::actions::{self, ImportError};
use crate::config::Config;
use crate::integrations::auth::{AuthEvent, AuthProvider};
use crate::integrations::drive::{DriveStore, RemoteBackend};
use crate::models::{Document, Habit};
use crate::pomodoro::FocusSession;
use crate::runtime::policy::{ApplyThenPersist, PersistPolicy, RollbackOnFailure};
use crate::runtime::writer::{WriteJob, Writer};
use crate::storage::{BackendKind, LocalBackend, LocalStore, StorageBackend, select_backend};
use chrono::Local;
use std::sync::Arc;
use std::sync::mpsc::Receiver;

/// Owns the in-memory document. Mutations apply immediately and are persisted
/// to whichever backend the last reload selected.
pub struct App {
    pub config: Config,
    pub document: Document,
    pub is_loading: bool,
    pub error: Option<String>,
    pub active_backend: BackendKind,
    /// Running pomodoro cycle, advanced by `runtime::tick`.
    pub focus: Option<FocusSession>,
    /// One-shot status line for the front end (phase changes, backend switches).
    pub notice: Option<String>,

    pub(crate) auth: Arc<dyn AuthProvider>,
    pub(crate) auth_events: Receiver<AuthEvent>,
    remote: Option<Arc<DriveStore>>,
    backend: Arc<dyn StorageBackend>,
    pub(crate) writer: Writer,
    pub(crate) policy: Box<dyn PersistPolicy>,
    /// Bumped by every mutation and reload.
    pub(crate) seq: u64,
    pub(crate) pending_writes: usize,
}

impl App {
    /// Builds the controller and performs the initial load.
    pub fn new(config: Config, auth: Arc<dyn AuthProvider>) -> Self {
        let remote = if config.remote.enabled {
            match DriveStore::new(&config.remote, Arc::clone(&auth)) {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    log::error!("Remote storage unavailable: {}", e.message());
                    None
                }
            }
        } else {
            None
        };

        let auth_events = auth.subscribe();
        let policy: Box<dyn PersistPolicy> = if config.sync.rollback_on_failure {
            Box::new(RollbackOnFailure)
        } else {
            Box::new(ApplyThenPersist)
        };
        let local = LocalBackend::new(LocalStore::new(&config.data.local_path));

        let mut app = Self {
            config,
            document: Document::initial(),
            is_loading: true,
            error: None,
            active_backend: BackendKind::Local,
            focus: None,
            notice: None,
            auth,
            auth_events,
            remote,
            backend: Arc::new(local),
            writer: Writer::spawn(),
            policy,
            seq: 0,
            pending_writes: 0,
        };
        app.reload();
        app
    }

    pub fn remote_ready(&self) -> bool {
        self.remote.is_some()
    }

    pub fn has_pending_writes(&self) -> bool {
        self.pending_writes > 0
    }

    /// Picks the backend for the current auth state and loads the document
    /// through it. A failed load keeps the previous document.
    pub fn reload(&mut self) {
        self.is_loading = true;
        self.seq += 1;

        let kind = select_backend(self.auth.is_authenticated(), self.remote.is_some());
        let backend = self.backend_for(kind);
        self.active_backend = backend.kind();
        self.backend = Arc::clone(&backend);

        match backend.read() {
            Ok(doc) => {
                log::info!("Loaded data from {} storage", kind.as_str());
                self.document = doc;
                self.error = None;
            }
            Err(e) => {
                log::error!("Failed to load data: {}", e.message());
                self.error = Some(format!(
                    "Failed to load data from {} storage: {}",
                    kind.as_str(),
                    e.message()
                ));
            }
        }

        self.is_loading = false;
    }

    fn backend_for(&self, kind: BackendKind) -> Arc<dyn StorageBackend> {
        match (kind, &self.remote) {
            (BackendKind::Remote, Some(store)) => {
                Arc::new(RemoteBackend::new(Arc::clone(store)))
            }
            _ => Arc::new(LocalBackend::new(LocalStore::new(
                &self.config.data.local_path,
            ))),
        }
    }

    /// Starts a work/break cycle of `sessions` work phases.
    pub fn start_focus(&mut self, sessions: u64) {
        let session = FocusSession::start(&self.config.pomodoro, sessions, Local::now());
        self.notice = Some(format!(
            "{} for {} min ({} of {}).",
            session.phase.label(),
            session.minutes,
            session.completed + 1,
            session.planned
        ));
        self.focus = Some(session);
    }

    /// Applies `transform` to the current document right away, then persists
    /// the result. Local writes finish before this returns; remote writes are
    /// handed to the background writer and reported through `runtime::tick`.
    pub fn apply<F>(&mut self, transform: F)
    where
        F: FnOnce(&Document) -> Document,
    {
        let next = transform(&self.document);
        let previous = std::mem::replace(&mut self.document, next);
        self.seq += 1;

        if self.backend.kind() == BackendKind::Local {
            // Local storage swallows its own failures.
            let _ = self.backend.write(&self.document);
            return;
        }

        let job = WriteJob {
            seq: self.seq,
            backend: Arc::clone(&self.backend),
            doc: self.document.clone(),
            previous,
        };
        match self.writer.submit(job) {
            Ok(()) => self.pending_writes += 1,
            Err(_) => {
                log::error!("Persistence worker is gone, change #{} not saved", self.seq);
                self.error = Some("Failed to save changes: persistence worker stopped".to_string());
            }
        }
    }

    pub fn add_habit(&mut self, habit: Habit) {
        self.apply(|doc| actions::add_habit(doc, habit));
    }

    pub fn update_habit(&mut self, habit: Habit) {
        self.apply(|doc| actions::update_habit(doc, habit));
    }

    pub fn delete_habit(&mut self, habit_id: &str) {
        self.apply(|doc| actions::delete_habit(doc, habit_id));
    }

    pub fn reorder_habits(&mut self, habits: Vec<Habit>) {
        self.apply(|doc| actions::reorder_habits(doc, habits));
    }

    pub fn toggle_habit(&mut self, date: &str, habit_id: &str) {
        self.apply(|doc| actions::toggle_habit(doc, date, habit_id));
    }

    pub fn save_note(&mut self, date: &str, note: &str) {
        self.apply(|doc| actions::save_note(doc, date, note));
    }

    pub fn update_pomodoro_time(&mut self, minutes: i64) {
        self.apply(|doc| actions::update_pomodoro_time(doc, minutes));
    }

    pub fn add_daily_task(&mut self, date: &str, label: &str) {
        self.apply(|doc| actions::add_daily_task(doc, date, label));
    }

    pub fn delete_daily_task(&mut self, date: &str, task_id: &str) {
        self.apply(|doc| actions::delete_daily_task(doc, date, task_id));
    }

    pub fn toggle_daily_task(&mut self, date: &str, task_id: &str) {
        self.apply(|doc| actions::toggle_daily_task(doc, date, task_id));
    }

    /// Replaces the document with an exported one. Invalid input leaves the
    /// current document untouched.
    pub fn import_json(&mut self, text: &str) -> Result<(), ImportError> {
        let imported = actions::import_data(text)?;
        self.apply(move |_| imported);
        Ok(())
    }

    pub fn export_json(&self) -> String {
        actions::export_data(&self.document)
    }

    pub fn reset(&mut self) {
        self.apply(|_| actions::reset_data());
    }
}
