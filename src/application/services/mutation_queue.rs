use crate::application::ports::inspection_gateway::TransportError;
use crate::application::ports::key_value_store::{KeyValueStore, load_json, save_json};
use crate::application::ports::sync_events::{SyncEvent, SyncEventSink};
use crate::domain::entities::{MutationRecord, QueuedOperation};
use crate::domain::value_objects::MutationId;
use crate::infrastructure::offline::metrics::{RecordOutcome, ReplayMetrics};
use crate::shared::KeyedLocks;
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

pub const MUTATION_QUEUE_NAMESPACE: &str = "mutation_queue_v1";

/// Executes one queued operation against the server during replay and
/// applies its local confirmation on success.
#[async_trait]
pub trait ReplayHandler: Send + Sync {
    async fn handle(&self, operation: &QueuedOperation) -> Result<(), TransportError>;

    /// Called when the server permanently rejected a queued operation, so
    /// optimistic local state built on it can be withdrawn.
    async fn rollback(&self, _operation: &QueuedOperation) {}
}

/// Why a replay pass ended before reaching the end of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStop {
    Connectivity,
    SessionExpired,
    ServerUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub total: usize,
    pub replayed: usize,
    pub dropped: usize,
    pub remaining: usize,
    pub stopped: Option<ReplayStop>,
    /// This call did nothing: another pass was running, or the session
    /// expired and the queue waits for a new login.
    pub skipped: bool,
}

impl ReplayReport {
    pub fn skipped() -> Self {
        Self {
            total: 0,
            replayed: 0,
            dropped: 0,
            remaining: 0,
            stopped: None,
            skipped: true,
        }
    }

    /// The queue is dormant after a session expiry.
    pub fn dormant(pending: usize) -> Self {
        Self {
            total: pending,
            remaining: pending,
            stopped: Some(ReplayStop::SessionExpired),
            ..Self::skipped()
        }
    }

    fn started(total: usize) -> Self {
        Self {
            total,
            replayed: 0,
            dropped: 0,
            remaining: total,
            stopped: None,
            skipped: false,
        }
    }
}

/// What replay does with a record whose handler failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Stop(ReplayStop),
    RetryLater,
    Drop,
}

impl Disposition {
    fn for_error(err: &TransportError, attempts: u32, max_retry: u32) -> Self {
        if err.is_connectivity() {
            Disposition::Stop(ReplayStop::Connectivity)
        } else if err.is_auth_expired() {
            Disposition::Stop(ReplayStop::SessionExpired)
        } else if err.is_server_fault() && attempts + 1 < max_retry {
            Disposition::RetryLater
        } else {
            Disposition::Drop
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct QueueDocument {
    version: u32,
    records: Vec<MutationRecord>,
}

struct ReplayGuard<'a>(&'a AtomicBool);

impl<'a> ReplayGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ReplayGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Durable FIFO of mutations waiting for the server.
pub struct MutationQueue {
    store: Arc<dyn KeyValueStore>,
    locks: Arc<KeyedLocks>,
    handler: Arc<dyn ReplayHandler>,
    events: Arc<dyn SyncEventSink>,
    metrics: Arc<ReplayMetrics>,
    replaying: AtomicBool,
    session_expired: AtomicBool,
    /// Record whose operation is currently with the server.
    in_flight: Mutex<Option<MutationId>>,
    max_retry: u32,
}

impl MutationQueue {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        locks: Arc<KeyedLocks>,
        handler: Arc<dyn ReplayHandler>,
        events: Arc<dyn SyncEventSink>,
        metrics: Arc<ReplayMetrics>,
        max_retry: u32,
    ) -> Self {
        Self {
            store,
            locks,
            handler,
            events,
            metrics,
            replaying: AtomicBool::new(false),
            session_expired: AtomicBool::new(false),
            in_flight: Mutex::new(None),
            max_retry: max_retry.max(1),
        }
    }

    async fn load(&self) -> Result<QueueDocument, AppError> {
        Ok(load_json(self.store.as_ref(), MUTATION_QUEUE_NAMESPACE)
            .await?
            .unwrap_or_default())
    }

    async fn save(&self, document: &mut QueueDocument) -> Result<(), AppError> {
        if document.version == 0 {
            document.version = 1;
        }
        save_json(self.store.as_ref(), MUTATION_QUEUE_NAMESPACE, document).await
    }

    /// Persists `operation` before returning. A save of a local-only point that
    /// is already queued replaces the queued arguments and keeps its position.
    pub async fn enqueue(&self, operation: QueuedOperation) -> Result<MutationId, AppError> {
        let _lock = self.locks.lock(MUTATION_QUEUE_NAMESPACE).await;
        let mut document = self.load().await?;

        if let Some(key) = operation.coalesce_key() {
            let existing = document
                .records
                .iter_mut()
                .find(|record| record.operation.coalesce_key().as_deref() == Some(key.as_str()));
            if let Some(existing) = existing {
                existing.operation = operation;
                existing.revision += 1;
                let id = existing.id.clone();
                self.save(&mut document).await?;
                debug!(mutation_id = %id, key = %key, "Coalesced queued mutation");
                return Ok(id);
            }
        }

        let record = MutationRecord::new(operation);
        let id = record.id.clone();
        let kind = record.operation.kind();
        document.records.push(record);
        self.save(&mut document).await?;
        debug!(mutation_id = %id, kind, queued = document.records.len(), "Enqueued mutation");
        Ok(id)
    }

    /// Removes a record. Unknown ids are ignored.
    pub async fn remove(&self, id: &MutationId) -> Result<(), AppError> {
        self.remove_matching(|record| &record.id == id).await.map(|_| ())
    }

    /// Drops queued records with the given coalesce key, e.g. the creation of
    /// a local-only point the user deleted before it synced. A record already
    /// being sent cannot be taken back and is refused with `ValidationError`.
    pub async fn discard(&self, coalesce_key: &str) -> Result<usize, AppError> {
        let _lock = self.locks.lock(MUTATION_QUEUE_NAMESPACE).await;
        let mut document = self.load().await?;
        let matches =
            |record: &MutationRecord| record.operation.coalesce_key().as_deref() == Some(coalesce_key);

        if let Some(in_flight) = self.in_flight_id() {
            if document
                .records
                .iter()
                .any(|record| record.id == in_flight && matches(record))
            {
                return Err(AppError::ValidationError(format!(
                    "{coalesce_key} is already being sent to the server"
                )));
            }
        }

        let before = document.records.len();
        document.records.retain(|record| !matches(record));
        let removed = before - document.records.len();
        if removed > 0 {
            self.save(&mut document).await?;
        }
        Ok(removed)
    }

    async fn remove_matching<F>(&self, predicate: F) -> Result<usize, AppError>
    where
        F: Fn(&MutationRecord) -> bool,
    {
        let _lock = self.locks.lock(MUTATION_QUEUE_NAMESPACE).await;
        let mut document = self.load().await?;
        let before = document.records.len();
        document.records.retain(|record| !predicate(record));
        let removed = before - document.records.len();
        if removed > 0 {
            self.save(&mut document).await?;
        }
        Ok(removed)
    }

    /// Re-reads a record right before it is sent and marks it in flight.
    /// `None` when it left the queue after the pass started.
    async fn claim(&self, id: &MutationId) -> Result<Option<MutationRecord>, AppError> {
        let _lock = self.locks.lock(MUTATION_QUEUE_NAMESPACE).await;
        let document = self.load().await?;
        let record = document.records.into_iter().find(|record| &record.id == id);
        if record.is_some() {
            self.set_in_flight(Some(id.clone()));
        }
        Ok(record)
    }

    /// Removes a replayed record unless a newer save was coalesced into it
    /// while the handler ran.
    async fn complete(&self, replayed: &MutationRecord) -> Result<bool, AppError> {
        let _lock = self.locks.lock(MUTATION_QUEUE_NAMESPACE).await;
        self.set_in_flight(None);
        let mut document = self.load().await?;
        let Some(position) = document
            .records
            .iter()
            .position(|record| record.id == replayed.id)
        else {
            return Ok(true);
        };
        if document.records[position].revision != replayed.revision {
            return Ok(false);
        }
        document.records.remove(position);
        self.save(&mut document).await?;
        Ok(true)
    }

    async fn bump_attempts(&self, id: &MutationId) -> Result<(), AppError> {
        let _lock = self.locks.lock(MUTATION_QUEUE_NAMESPACE).await;
        let mut document = self.load().await?;
        if let Some(record) = document.records.iter_mut().find(|record| &record.id == id) {
            record.attempts += 1;
            self.save(&mut document).await?;
        }
        Ok(())
    }

    pub async fn pending(&self) -> Result<Vec<MutationRecord>, AppError> {
        Ok(self.load().await?.records)
    }

    pub async fn len(&self) -> usize {
        match self.load().await {
            Ok(document) => document.records.len(),
            Err(err) => {
                warn!("Failed to read mutation queue: {}", err);
                0
            }
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// True when a queued record writes to the same entity, in which case a
    /// new mutation for it must queue behind instead of overtaking.
    pub async fn has_pending_for(&self, entity_key: &str) -> bool {
        match self.load().await {
            Ok(document) => document
                .records
                .iter()
                .any(|record| record.operation.entity_key() == entity_key),
            Err(err) => {
                warn!("Failed to read mutation queue: {}", err);
                false
            }
        }
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying.load(Ordering::Acquire)
    }

    pub fn is_session_expired(&self) -> bool {
        self.session_expired.load(Ordering::Acquire)
    }

    /// Puts the queue to sleep until [`resume_session`](Self::resume_session).
    pub fn suspend_session(&self) {
        if !self.session_expired.swap(true, Ordering::AcqRel) {
            info!("Session expired, queued mutations wait for a new login");
        }
    }

    pub fn resume_session(&self) {
        if self.session_expired.swap(false, Ordering::AcqRel) {
            info!("Session renewed, queued mutations can replay again");
        }
    }

    fn set_in_flight(&self, id: Option<MutationId>) {
        *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner) = id;
    }

    fn in_flight_id(&self) -> Option<MutationId> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn metrics(&self) -> &ReplayMetrics {
        &self.metrics
    }

    /// Replays queued records in order, one at a time. Never fails: storage
    /// problems end the pass and are logged.
    pub async fn replay(&self) -> ReplayReport {
        let Some(_guard) = ReplayGuard::acquire(&self.replaying) else {
            debug!("Replay already in progress");
            return ReplayReport::skipped();
        };
        if self.is_session_expired() {
            let pending = self.len().await;
            debug!(pending, "Queue dormant until the user logs in again");
            return ReplayReport::dormant(pending);
        }

        let records = match self.load().await {
            Ok(document) => document.records,
            Err(err) => {
                warn!("Failed to load mutation queue for replay: {}", err);
                Vec::new()
            }
        };

        let mut report = ReplayReport::started(records.len());
        for queued in &records {
            let record = match self.claim(&queued.id).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    debug!(mutation_id = %queued.id, "Record left the queue during replay");
                    continue;
                }
                Err(err) => {
                    warn!("Failed to read mutation queue during replay: {}", err);
                    break;
                }
            };
            let kind = record.operation.kind();
            let outcome = self.handler.handle(&record.operation).await;
            if outcome.is_err() {
                self.set_in_flight(None);
            }
            match outcome {
                Ok(()) => {
                    match self.complete(&record).await {
                        Ok(true) => {}
                        Ok(false) => {
                            debug!(mutation_id = %record.id, "Record changed during replay, keeping it");
                        }
                        Err(err) => {
                            error!(mutation_id = %record.id, "Failed to remove replayed record: {}", err);
                        }
                    }
                    report.replayed += 1;
                    self.metrics.record(RecordOutcome::Replayed, kind);
                }
                Err(err) => match Disposition::for_error(&err, record.attempts, self.max_retry) {
                    Disposition::Stop(reason) => {
                        debug!(mutation_id = %record.id, kind, "Replay stopped: {}", err);
                        if reason == ReplayStop::SessionExpired {
                            self.suspend_session();
                        }
                        report.stopped = Some(reason);
                        break;
                    }
                    Disposition::RetryLater => {
                        warn!(
                            mutation_id = %record.id,
                            kind,
                            attempts = record.attempts + 1,
                            "Server failed replaying record, will retry: {}",
                            err
                        );
                        if let Err(store_err) = self.bump_attempts(&record.id).await {
                            error!("Failed to update replay attempts: {}", store_err);
                        }
                        self.metrics.record(RecordOutcome::Deferred, kind);
                        report.stopped = Some(ReplayStop::ServerUnavailable);
                        break;
                    }
                    Disposition::Drop => {
                        warn!(mutation_id = %record.id, kind, "Server rejected queued mutation, dropping it: {}", err);
                        if let Err(store_err) = self.remove(&record.id).await {
                            error!("Failed to drop rejected record: {}", store_err);
                        }
                        self.handler.rollback(&record.operation).await;
                        report.dropped += 1;
                        self.metrics.record(RecordOutcome::Dropped, kind);
                    }
                },
            }
        }

        report.remaining = self.len().await;
        self.metrics.record_pass(&report);
        info!(
            total = report.total,
            replayed = report.replayed,
            dropped = report.dropped,
            remaining = report.remaining,
            stopped = ?report.stopped,
            "Replay pass finished"
        );

        if report.stopped == Some(ReplayStop::SessionExpired) {
            self.publish(SyncEvent::SessionExpired).await;
        }
        self.publish(SyncEvent::DataShouldReload(report.clone()))
            .await;
        report
    }

    async fn publish(&self, event: SyncEvent) {
        if let Err(err) = self.events.publish(event).await {
            warn!("Failed to publish sync event: {}", err);
        }
    }
}
