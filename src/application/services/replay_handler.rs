use crate::application::ports::inspection_gateway::{InspectionGateway, TransportError};
use crate::application::services::annotation_reconciler::AnnotationReconciler;
use crate::application::services::call_classifier::perform;
use crate::application::services::mutation_queue::ReplayHandler;
use crate::application::services::work_item_overlay::WorkItemOverlayStore;
use crate::domain::entities::QueuedOperation;
use crate::shared::error::AppError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Removes the local optimistic state that `operation` produced, once the
/// server has settled it either way. State from later edits is kept.
pub async fn settle_operation(
    reconciler: &AnnotationReconciler,
    overlays: &WorkItemOverlayStore,
    operation: &QueuedOperation,
) -> Result<(), AppError> {
    match operation {
        QueuedOperation::SavePoint {
            call_id,
            checklist_id,
            point,
        } => {
            reconciler.settle_point(call_id, checklist_id, point).await?;
        }
        QueuedOperation::DecideChecklist {
            call_id,
            checklist_id,
            acceptance,
        } => {
            reconciler
                .settle_decision(call_id, checklist_id, *acceptance)
                .await?;
        }
        QueuedOperation::UploadWorkItemMedia {
            work_item_id, file, ..
        } => {
            overlays.confirm_media(work_item_id, &file.upload_key).await?;
        }
        QueuedOperation::ReviewWorkItem { work_item_id, .. } => {
            overlays.confirm_review(work_item_id).await?;
        }
    }
    Ok(())
}

/// Replays an operation and promotes the local state it backed.
pub struct ConfirmingReplayHandler {
    gateway: Arc<dyn InspectionGateway>,
    reconciler: Arc<AnnotationReconciler>,
    overlays: Arc<WorkItemOverlayStore>,
}

impl ConfirmingReplayHandler {
    pub fn new(
        gateway: Arc<dyn InspectionGateway>,
        reconciler: Arc<AnnotationReconciler>,
        overlays: Arc<WorkItemOverlayStore>,
    ) -> Self {
        Self {
            gateway,
            reconciler,
            overlays,
        }
    }

    async fn settle(&self, operation: &QueuedOperation) {
        if let Err(err) = settle_operation(&self.reconciler, &self.overlays, operation).await {
            warn!(kind = operation.kind(), "Failed to settle local state: {}", err);
        }
    }
}

#[async_trait]
impl ReplayHandler for ConfirmingReplayHandler {
    async fn handle(&self, operation: &QueuedOperation) -> Result<(), TransportError> {
        perform(self.gateway.as_ref(), operation).await?;
        self.settle(operation).await;
        Ok(())
    }

    async fn rollback(&self, operation: &QueuedOperation) {
        self.settle(operation).await;
    }
}
