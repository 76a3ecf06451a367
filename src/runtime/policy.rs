use crate::models::Document;

/// Decides what the in-memory document does when a write fails.
pub trait PersistPolicy: Send {
    fn name(&self) -> &'static str;

    /// Returns the document to restore, or `None` to keep the optimistic state.
    /// `is_latest` is true when no mutation or reload happened after the
    /// failed one.
    fn on_write_failed(&self, previous: &Document, is_latest: bool) -> Option<Document>;
}

/// Keep what the user sees; the error flag is the only signal.
pub struct ApplyThenPersist;

impl PersistPolicy for ApplyThenPersist {
    fn name(&self) -> &'static str {
        "apply-then-persist"
    }

    fn on_write_failed(&self, _previous: &Document, _is_latest: bool) -> Option<Document> {
        None
    }
}

/// Restore the pre-mutation document, but only if nothing newer was applied
/// on top of it.
pub struct RollbackOnFailure;

impl PersistPolicy for RollbackOnFailure {
    fn name(&self) -> &'static str {
        "rollback-on-failure"
    }

    fn on_write_failed(&self, previous: &Document, is_latest: bool) -> Option<Document> {
        is_latest.then(|| previous.clone())
    }
}
