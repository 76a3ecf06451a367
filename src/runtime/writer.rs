use crate::models::Document;
use crate::storage::{BackendKind, StorageBackend, SyncError};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvError, Sender, TryRecvError};
use std::thread;

pub struct WriteJob {
    pub seq: u64,
    pub backend: Arc<dyn StorageBackend>,
    pub doc: Document,
    /// Document shown before this mutation, kept for rollback policies.
    pub previous: Document,
}

#[derive(Debug)]
pub enum PersistStatus {
    Written,
    /// A newer document for the same backend was queued behind this one and
    /// was written instead.
    Superseded,
    Failed(SyncError),
}

pub struct PersistOutcome {
    pub seq: u64,
    pub backend: BackendKind,
    pub status: PersistStatus,
    pub previous: Document,
}

/// Background persistence. One write in flight at a time, in dispatch order.
pub struct Writer {
    jobs: Sender<WriteJob>,
    outcomes: Receiver<PersistOutcome>,
}

impl Writer {
    pub fn spawn() -> Self {
        let (job_tx, job_rx) = mpsc::channel();
        let (outcome_tx, outcome_rx) = mpsc::channel();
        thread::spawn(move || run(job_rx, outcome_tx));
        Self {
            jobs: job_tx,
            outcomes: outcome_rx,
        }
    }

    /// Hands the job back if the worker is gone.
    pub fn submit(&self, job: WriteJob) -> Result<(), WriteJob> {
        self.jobs.send(job).map_err(|err| err.0)
    }

    pub fn try_recv(&self) -> Result<PersistOutcome, TryRecvError> {
        self.outcomes.try_recv()
    }

    pub fn recv(&self) -> Result<PersistOutcome, RecvError> {
        self.outcomes.recv()
    }
}

fn run(jobs: Receiver<WriteJob>, outcomes: Sender<PersistOutcome>) {
    let mut carried: Option<WriteJob> = None;

    loop {
        let mut job = match carried.take() {
            Some(job) => job,
            None => match jobs.recv() {
                Ok(job) => job,
                Err(_) => return,
            },
        };

        // Coalesce whatever queued up behind this job for the same backend.
        loop {
            match jobs.try_recv() {
                Ok(newer) if Arc::ptr_eq(&newer.backend, &job.backend) => {
                    let mut superseded = std::mem::replace(&mut job, newer);
                    // The surviving job restores to the last document the
                    // backend may hold, not an intermediate one.
                    std::mem::swap(&mut job.previous, &mut superseded.previous);
                    if outcomes.send(outcome(superseded, PersistStatus::Superseded)).is_err() {
                        return;
                    }
                }
                Ok(other) => {
                    carried = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        let status = match job.backend.write(&job.doc) {
            Ok(()) => PersistStatus::Written,
            Err(err) => PersistStatus::Failed(err),
        };
        if outcomes.send(outcome(job, status)).is_err() {
            return;
        }
    }
}

fn outcome(job: WriteJob, status: PersistStatus) -> PersistOutcome {
    PersistOutcome {
        seq: job.seq,
        backend: job.backend.kind(),
        status,
        previous: job.previous,
    }
}
