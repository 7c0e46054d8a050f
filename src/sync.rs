//! Best-effort write-behind of organizations to an external store.
//!
//! The in-memory store stays authoritative. Each organization-level mutation
//! enqueues a [`SyncJob`]; a single background task pushes jobs to the
//! [`SyncSink`] in FIFO order, retrying with a linear backoff. Callers keep the
//! returned [`SyncTicket`] and can poll its [`SyncState`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::SyncPolicy;
use crate::db::{insert_organization, upsert_organization};
use crate::error::AppError;
use crate::models::Organization;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncJob {
    /// Mirrors `POST /organizations`.
    Create(Organization),
    /// Mirrors `PUT /organizations/{id}` with the full entity.
    Update(Organization),
}

impl SyncJob {
    pub fn organization(&self) -> &Organization {
        match self {
            SyncJob::Create(org) | SyncJob::Update(org) => org,
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            SyncJob::Create(_) => "create",
            SyncJob::Update(_) => "update",
        }
    }
}

#[rocket::async_trait]
pub trait SyncSink: Send + Sync + 'static {
    async fn push(&self, job: &SyncJob) -> Result<(), AppError>;
}

/// Writes organizations into the `organizations` table.
pub struct SqliteSyncSink {
    pool: Pool<Sqlite>,
}

impl SqliteSyncSink {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[rocket::async_trait]
impl SyncSink for SqliteSyncSink {
    async fn push(&self, job: &SyncJob) -> Result<(), AppError> {
        match job {
            SyncJob::Create(org) => insert_organization(&self.pool, org).await,
            SyncJob::Update(org) => upsert_organization(&self.pool, org).await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SyncTicket(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    Pending,
    Synced { attempts: u32 },
    Failed { attempts: u32, reason: String },
}

struct Queued {
    ticket: SyncTicket,
    job: SyncJob,
}

type Ledger = Arc<Mutex<HashMap<SyncTicket, SyncState>>>;

pub struct SyncQueue {
    tx: mpsc::UnboundedSender<Queued>,
    ledger: Ledger,
    next_ticket: AtomicU64,
}

fn record(ledger: &Ledger, ticket: SyncTicket, state: SyncState) {
    match ledger.lock() {
        Ok(mut map) => {
            map.insert(ticket, state);
        }
        Err(poisoned) => {
            poisoned.into_inner().insert(ticket, state);
        }
    }
}

impl SyncQueue {
    /// Spawns the worker on the current tokio runtime.
    pub fn start(sink: Arc<dyn SyncSink>, policy: SyncPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let ledger: Ledger = Arc::default();

        tokio::spawn(
            run_worker(rx, sink, policy, Arc::clone(&ledger)).instrument(info_span!("sync_worker")),
        );

        Self {
            tx,
            ledger,
            next_ticket: AtomicU64::new(1),
        }
    }

    pub fn enqueue(&self, job: SyncJob) -> SyncTicket {
        let ticket = SyncTicket(self.next_ticket.fetch_add(1, Ordering::Relaxed));
        let organization_id = job.organization().id;

        if self.tx.send(Queued { ticket, job }).is_err() {
            let error = AppError::SyncFailed("sync worker is not running".to_string());
            error.log_and_record("Enqueue sync job");
            record(
                &self.ledger,
                ticket,
                SyncState::Failed {
                    attempts: 0,
                    reason: error.to_string(),
                },
            );
            return ticket;
        }

        record(&self.ledger, ticket, SyncState::Pending);
        debug!(ticket = ticket.0, organization_id, "Queued sync job");
        ticket
    }

    pub fn status(&self, ticket: SyncTicket) -> Option<SyncState> {
        match self.ledger.lock() {
            Ok(map) => map.get(&ticket).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&ticket).cloned(),
        }
    }

    /// The failure of a finished job, as an error the caller can surface.
    pub fn failure(&self, ticket: SyncTicket) -> Option<AppError> {
        match self.status(ticket) {
            Some(SyncState::Failed { reason, .. }) => Some(AppError::SyncFailed(reason)),
            _ => None,
        }
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Queued>,
    sink: Arc<dyn SyncSink>,
    policy: SyncPolicy,
    ledger: Ledger,
) {
    info!("Sync worker started");

    while let Some(Queued { ticket, job }) = rx.recv().await {
        let state = deliver(sink.as_ref(), &job, policy).await;

        if let SyncState::Failed { reason, attempts } = &state {
            AppError::SyncFailed(reason.clone()).log_and_record(&format!(
                "Sync {} of organization {} after {} attempts",
                job.verb(),
                job.organization().id,
                attempts
            ));
        }

        record(&ledger, ticket, state);
    }

    info!("Sync worker stopped");
}

async fn deliver(sink: &dyn SyncSink, job: &SyncJob, policy: SyncPolicy) -> SyncState {
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match sink.push(job).await {
            Ok(()) => {
                info!(
                    organization_id = job.organization().id,
                    attempt,
                    "Synced organization {}",
                    job.verb()
                );
                return SyncState::Synced { attempts: attempt };
            }
            Err(e) => {
                warn!(
                    organization_id = job.organization().id,
                    attempt,
                    error = %e,
                    "Sync attempt failed"
                );
                last_error = e.to_string();
                if attempt < max_attempts {
                    tokio::time::sleep(policy.backoff * attempt).await;
                }
            }
        }
    }

    SyncState::Failed {
        attempts: max_attempts,
        reason: last_error,
    }
}
