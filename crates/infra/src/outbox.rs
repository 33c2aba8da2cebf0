//! Transactional outbox: request-path transactions write an
//! [`OutboxRecord`] alongside their state change, and the dispatcher turns
//! undispatched records into queue jobs. At-least-once; records are marked
//! dispatched only after the enqueue succeeds.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, error, info};

use storefront_core::DocumentId;

use crate::docstore::{Collection, DocumentStore, Filter, PatchOp};
use crate::jobs::{Job, JobStore, QueueName};

/// Which queue a record's payload belongs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxKind {
    Notify,
    Advance,
}

impl OutboxKind {
    pub fn queue(&self) -> QueueName {
        match self {
            OutboxKind::Notify => QueueName::Notify,
            OutboxKind::Advance => QueueName::Advance,
        }
    }
}

/// One pending enqueue, stored in the `outbox` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: DocumentId,
    pub kind: OutboxKind,
    /// Queue job payload, already in wire shape.
    pub payload: Value,
    /// Delay before first visibility once enqueued.
    pub delay_ms: u64,
    pub created_at: DateTime<Utc>,
    pub dispatched: bool,
}

impl OutboxRecord {
    pub fn new(kind: OutboxKind, payload: Value) -> Self {
        Self {
            id: DocumentId::new(),
            kind,
            payload,
            delay_ms: 0,
            created_at: Utc::now(),
            dispatched: false,
        }
    }

    pub fn delayed(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("outbox read failed: {0}")]
    Store(String),
    #[error("enqueue failed: {0}")]
    Enqueue(String),
}

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct OutboxDispatcherConfig {
    pub poll_interval: Duration,
}

impl Default for OutboxDispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// Handle to a running dispatcher loop.
#[derive(Debug)]
pub struct OutboxDispatcherHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    dispatched: Arc<Mutex<u64>>,
}

impl OutboxDispatcherHandle {
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn dispatched(&self) -> u64 {
        *self.dispatched.lock().unwrap()
    }
}

/// Polls the outbox collection and enqueues committed records.
pub struct OutboxDispatcher<S, Q> {
    docs: S,
    jobs: Q,
}

impl<S: DocumentStore, Q: JobStore> OutboxDispatcher<S, Q> {
    pub fn new(docs: S, jobs: Q) -> Self {
        Self { docs, jobs }
    }

    /// One dispatch sweep. Returns how many records were enqueued.
    pub fn dispatch_pending(&self) -> Result<usize, DispatchError> {
        let mut records: Vec<(String, OutboxRecord)> = self
            .docs
            .list(Collection::Outbox)
            .map_err(|e| DispatchError::Store(e.to_string()))?
            .into_iter()
            .filter_map(|(id, value)| match serde_json::from_value(value) {
                Ok(record) => Some((id, record)),
                Err(e) => {
                    error!(record_id = %id, error = %e, "undecodable outbox record, skipping");
                    None
                }
            })
            .filter(|(_, record): &(String, OutboxRecord)| !record.dispatched)
            .collect();
        records.sort_by_key(|(_, r)| r.created_at);

        let mut n = 0;
        for (id, record) in records {
            let mut job = Job::new(record.kind.queue(), record.payload.clone());
            if record.delay_ms > 0 {
                job = job.delayed(Duration::from_millis(record.delay_ms));
            }
            self.jobs
                .enqueue(job)
                .map_err(|e| DispatchError::Enqueue(e.to_string()))?;

            // Mark after enqueue; a crash in between re-delivers, never drops.
            let marked = self
                .docs
                .update_where(
                    Collection::Outbox,
                    &id,
                    &Filter::field_equals("dispatched", false),
                    &[PatchOp::set("dispatched", json!(true))],
                )
                .map_err(|e| DispatchError::Store(e.to_string()))?;
            if !marked {
                debug!(record_id = %id, "outbox record already claimed elsewhere");
            }
            n += 1;
        }
        Ok(n)
    }

    /// Spawn the polling loop in a background thread.
    pub fn spawn(self, config: OutboxDispatcherConfig) -> OutboxDispatcherHandle
    where
        S: Send + Sync + 'static,
        Q: Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let dispatched = Arc::new(Mutex::new(0u64));
        let dispatched_clone = dispatched.clone();

        let join = thread::Builder::new()
            .name("outbox-dispatcher".to_string())
            .spawn(move || {
                info!("outbox dispatcher started");
                loop {
                    if shutdown_rx.try_recv().is_ok() {
                        break;
                    }
                    match self.dispatch_pending() {
                        Ok(0) => {}
                        Ok(n) => {
                            debug!(count = n, "dispatched outbox records");
                            *dispatched_clone.lock().unwrap() += n as u64;
                        }
                        Err(e) => error!(error = %e, "outbox dispatch sweep failed"),
                    }
                    thread::sleep(config.poll_interval);
                }
                info!("outbox dispatcher stopped");
            })
            .expect("failed to spawn outbox dispatcher thread");

        OutboxDispatcherHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            dispatched,
        }
    }
}
