use crate::application::ports::inspection_gateway::{
    InspectionGateway, RemotePayload, TransportError,
};
use crate::application::ports::sync_events::{SyncEvent, SyncEventSink};
use crate::application::services::mutation_queue::MutationQueue;
use crate::domain::entities::QueuedOperation;
use crate::domain::value_objects::MutationId;
use crate::shared::error::AppError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sends one operation to the server. Live calls and replay share this
/// dispatch, so a kind without a gateway call does not compile.
pub async fn perform(
    gateway: &dyn InspectionGateway,
    operation: &QueuedOperation,
) -> Result<RemotePayload, TransportError> {
    match operation {
        QueuedOperation::SavePoint {
            call_id,
            checklist_id,
            point,
        } => gateway
            .save_point(call_id, checklist_id, point)
            .await
            .map(RemotePayload::Checklist),
        QueuedOperation::DecideChecklist {
            call_id,
            checklist_id,
            acceptance,
        } => gateway
            .decide_checklist(call_id, checklist_id, *acceptance)
            .await
            .map(RemotePayload::Checklist),
        QueuedOperation::UploadWorkItemMedia {
            work_item_id,
            stage,
            file,
            comment,
        } => gateway
            .upload_work_item_media(work_item_id, *stage, file, comment.clone())
            .await
            .map(RemotePayload::WorkItem),
        QueuedOperation::ReviewWorkItem {
            work_item_id,
            verdict,
            comment,
        } => gateway
            .review_work_item(work_item_id, *verdict, comment.clone())
            .await
            .map(RemotePayload::WorkItem),
    }
}

/// Outcome of one network attempt, before anything is queued.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    Succeeded(RemotePayload),
    Unreachable,
    Rejected(TransportError),
}

impl From<Result<RemotePayload, TransportError>> for Attempt {
    fn from(result: Result<RemotePayload, TransportError>) -> Self {
        match result {
            Ok(payload) => Attempt::Succeeded(payload),
            Err(err) if err.is_connectivity() => Attempt::Unreachable,
            Err(err) => Attempt::Rejected(err),
        }
    }
}

/// What the view gets back from a mutating call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    /// The server applied the mutation; reconcile with this payload.
    Success(RemotePayload),
    /// The server was unreachable and the mutation is queued for replay;
    /// apply it optimistically.
    Queued(MutationId),
    /// The server rejected the mutation; show the error, change nothing.
    HardFailure(TransportError),
}

pub struct CallClassifier {
    gateway: Arc<dyn InspectionGateway>,
    queue: Arc<MutationQueue>,
    events: Arc<dyn SyncEventSink>,
}

impl CallClassifier {
    pub fn new(
        gateway: Arc<dyn InspectionGateway>,
        queue: Arc<MutationQueue>,
        events: Arc<dyn SyncEventSink>,
    ) -> Self {
        Self {
            gateway,
            queue,
            events,
        }
    }

    pub fn queue(&self) -> &Arc<MutationQueue> {
        &self.queue
    }

    /// Calls the server once and classifies the result without queueing.
    pub async fn attempt(&self, operation: &QueuedOperation) -> Attempt {
        let attempt = self.send(operation).await;
        self.observe(operation, &attempt).await;
        attempt
    }

    /// Calls the server once. Nothing is reported or queued; callers sending
    /// several operations as one unit pass a single result to
    /// [`observe`](Self::observe).
    pub async fn send(&self, operation: &QueuedOperation) -> Attempt {
        Attempt::from(perform(self.gateway.as_ref(), operation).await)
    }

    /// Session bookkeeping for a finished attempt. A success proves the
    /// session is live again; an expired session is signalled once.
    pub async fn observe(&self, operation: &QueuedOperation, attempt: &Attempt) {
        match attempt {
            Attempt::Succeeded(_) => self.queue.resume_session(),
            Attempt::Rejected(err) => self.report_hard_failure(operation, err).await,
            Attempt::Unreachable => {}
        }
    }

    /// Runs a mutating call. The only error is a failure to persist the
    /// operation after the server turned out to be unreachable.
    pub async fn execute(&self, operation: QueuedOperation) -> Result<CallResult, AppError> {
        if let Some(queued) = self.queue_behind_pending(&operation).await? {
            return Ok(queued);
        }
        let attempt = self.attempt(&operation).await;
        self.settle(operation, attempt).await
    }

    /// Like [`execute`](Self::execute), but gives up when `token` is cancelled
    /// first. A cancelled call is dropped, never queued, and yields `None`.
    pub async fn execute_abortable(
        &self,
        operation: QueuedOperation,
        token: &CancellationToken,
    ) -> Result<Option<CallResult>, AppError> {
        if token.is_cancelled() {
            return Ok(None);
        }
        if let Some(queued) = self.queue_behind_pending(&operation).await? {
            return Ok(Some(queued));
        }

        let attempt = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(kind = operation.kind(), "Call aborted by view");
                return Ok(None);
            }
            attempt = self.attempt(&operation) => attempt,
        };
        self.settle(operation, attempt).await.map(Some)
    }

    /// Writes to an entity that already has queued mutations wait behind them.
    async fn queue_behind_pending(
        &self,
        operation: &QueuedOperation,
    ) -> Result<Option<CallResult>, AppError> {
        let entity = operation.entity_key();
        if !self.queue.has_pending_for(&entity).await {
            return Ok(None);
        }
        let id = self.queue.enqueue(operation.clone()).await?;
        debug!(mutation_id = %id, entity = %entity, "Queued behind pending mutations");
        Ok(Some(CallResult::Queued(id)))
    }

    async fn settle(
        &self,
        operation: QueuedOperation,
        attempt: Attempt,
    ) -> Result<CallResult, AppError> {
        match attempt {
            Attempt::Succeeded(payload) => Ok(CallResult::Success(payload)),
            Attempt::Unreachable => {
                let kind = operation.kind();
                let id = self.queue.enqueue(operation).await?;
                info!(mutation_id = %id, kind, "Server unreachable, mutation queued");
                Ok(CallResult::Queued(id))
            }
            Attempt::Rejected(err) => Ok(CallResult::HardFailure(err)),
        }
    }

    async fn report_hard_failure(&self, operation: &QueuedOperation, err: &TransportError) {
        warn!(kind = operation.kind(), "Mutation rejected: {}", err);
        if !err.is_auth_expired() {
            return;
        }
        self.queue.suspend_session();
        if let Err(publish_err) = self.events.publish(SyncEvent::SessionExpired).await {
            warn!("Failed to publish session expiry: {}", publish_err);
        }
    }
}
