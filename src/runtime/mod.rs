pub mod policy;
pub mod writer;

use crate::app::App;
use crate::integrations::auth::AuthEvent;
use crate::pomodoro::Phase;
use crate::storage::select_backend;
use chrono::{DateTime, Local};
use std::sync::mpsc::TryRecvError;
use writer::{PersistOutcome, PersistStatus};

/// Drains auth transitions and finished writes, and advances a running focus
/// cycle. Call it from the event loop.
pub fn tick(app: &mut App) {
    handle_auth_events(app);
    handle_focus(app, Local::now());

    loop {
        match app.writer.try_recv() {
            Ok(outcome) => handle_persist_outcome(app, outcome),
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                handle_writer_gone(app);
                break;
            }
        }
    }
}

/// Blocks until every dispatched write has reported back.
pub fn flush(app: &mut App) {
    while app.has_pending_writes() {
        match app.writer.recv() {
            Ok(outcome) => handle_persist_outcome(app, outcome),
            Err(_) => {
                handle_writer_gone(app);
                break;
            }
        }
    }
}

fn handle_auth_events(app: &mut App) {
    let mut changed = false;
    loop {
        match app.auth_events.try_recv() {
            Ok(AuthEvent::SignedIn) => {
                log::info!("Signed in, reloading from remote storage");
                changed = true;
            }
            Ok(AuthEvent::SignedOut) => {
                log::info!("Signed out, switching to local storage");
                changed = true;
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }

    // A token that expires mid-session flips the state without an event.
    let expected = select_backend(app.auth.is_authenticated(), app.remote_ready());
    if !changed && expected != app.active_backend {
        log::info!("Session state changed, switching to {} storage", expected.as_str());
        changed = true;
    }

    // Several flips in one tick collapse into one reload against the final state.
    if changed {
        app.reload();
        app.notice = Some(format!("Now using {} storage.", app.active_backend.as_str()));
    }
}

fn handle_focus(app: &mut App, now: DateTime<Local>) {
    let Some(session) = app.focus.take() else {
        return;
    };
    if !session.is_due(now) {
        app.focus = Some(session);
        return;
    }

    if session.phase == Phase::Work {
        app.update_pomodoro_time(session.minutes as i64);
    }
    app.focus = session.advance(&app.config.pomodoro, now);
    app.notice = Some(match &app.focus {
        Some(next) => format!(
            "{} done. {} for {} min.",
            session.phase.label(),
            next.phase.label(),
            next.minutes
        ),
        None => format!("Focus finished: {} sessions.", session.planned),
    });
}

fn handle_persist_outcome(app: &mut App, outcome: PersistOutcome) {
    app.pending_writes = app.pending_writes.saturating_sub(1);

    match outcome.status {
        PersistStatus::Written => {
            log::debug!("Saved change #{} to {}", outcome.seq, outcome.backend.as_str());
        }
        PersistStatus::Superseded => {
            log::debug!("Change #{} folded into a newer write", outcome.seq);
        }
        PersistStatus::Failed(err) => {
            log::error!(
                "Failed to save change #{} to {}: {}",
                outcome.seq,
                outcome.backend.as_str(),
                err.message()
            );
            app.error = Some(format!(
                "Failed to save changes to remote storage: {}",
                err.message()
            ));
            let is_latest = outcome.seq == app.seq;
            if let Some(restored) = app.policy.on_write_failed(&outcome.previous, is_latest) {
                log::warn!("Rolled back change #{} ({})", outcome.seq, app.policy.name());
                app.document = restored;
            }
        }
    }
}

fn handle_writer_gone(app: &mut App) {
    if app.pending_writes > 0 {
        log::error!("Persistence worker stopped with {} pending writes", app.pending_writes);
        app.error = Some("Failed to save changes: persistence worker stopped".to_string());
        app.pending_writes = 0;
    }
}
