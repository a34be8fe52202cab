use crate::application::services::batch_submission::{BatchOutcome, BatchSubmitter};
use crate::application::services::call_classifier::{CallClassifier, CallResult};
use crate::application::services::checklist_service::SubmissionOutcome;
use crate::application::services::work_item_overlay::{StagedSubmission, WorkItemOverlayStore};
use crate::domain::entities::{
    AttachedFile, MediaEntry, MediaStage, QueuedOperation, ReviewVerdict, WorkItem,
    WorkItemOverlay, WorkItemStatus,
};
use crate::domain::value_objects::{UploadKey, WorkItemId};
use crate::shared::error::AppError;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Drives work items through their lifecycle online and offline alike.
pub struct WorkItemService {
    classifier: Arc<CallClassifier>,
    batches: Arc<BatchSubmitter>,
    overlays: Arc<WorkItemOverlayStore>,
}

impl WorkItemService {
    pub fn new(
        classifier: Arc<CallClassifier>,
        batches: Arc<BatchSubmitter>,
        overlays: Arc<WorkItemOverlayStore>,
    ) -> Self {
        Self {
            classifier,
            batches,
            overlays,
        }
    }

    pub async fn effective_work_item(&self, server: WorkItem) -> WorkItem {
        self.overlays.effective_work_item(server).await
    }

    /// Uploads the before/after-work media of one step. The transition is
    /// checked against the effective status before anything is sent.
    pub async fn submit_media(
        &self,
        server: &WorkItem,
        stage: MediaStage,
        files: Vec<AttachedFile>,
        comment: Option<String>,
    ) -> Result<SubmissionOutcome<WorkItem>, AppError> {
        if files.is_empty() {
            return Err(AppError::ValidationError(
                "a media submission needs at least one file".to_string(),
            ));
        }
        let current = self.effective_work_item(server.clone()).await;
        let next = current.status.transition(stage.into())?;

        let operations = files
            .iter()
            .map(|file| QueuedOperation::UploadWorkItemMedia {
                work_item_id: server.id.clone(),
                stage,
                file: file.clone(),
                comment: comment.clone(),
            })
            .collect();

        let recorded_at = Utc::now();
        let media: Vec<MediaEntry> = files
            .into_iter()
            .map(|file| MediaEntry {
                stage,
                file,
                comment: comment.clone(),
                recorded_at,
            })
            .collect();
        let staged = self.stage(&server.id, next, media.clone(), None).await;

        match self.batches.submit(operations).await {
            Ok(BatchOutcome::Completed(payload)) => {
                let item = payload.into_work_item()?;
                self.clear_overlay(&server.id).await;
                Ok(SubmissionOutcome::Confirmed(item))
            }
            Ok(BatchOutcome::Deferred(ids)) => {
                info!(work_item = %server.id, status = %next, queued = ids.len(), "Media submission stored offline");
                Ok(SubmissionOutcome::Deferred(
                    self.deferred_view(server, staged.is_some(), next, media, None)
                        .await,
                ))
            }
            Ok(BatchOutcome::Failed(err)) => {
                self.withdraw(staged).await;
                Err(err.into())
            }
            Err(err) => {
                self.withdraw(staged).await;
                Err(err)
            }
        }
    }

    /// Inspector accept/reject of a work item awaiting verification.
    pub async fn review(
        &self,
        server: &WorkItem,
        verdict: ReviewVerdict,
        comment: Option<String>,
    ) -> Result<SubmissionOutcome<WorkItem>, AppError> {
        let current = self.effective_work_item(server.clone()).await;
        let next = current.status.transition(verdict.into())?;

        let operation = QueuedOperation::ReviewWorkItem {
            work_item_id: server.id.clone(),
            verdict,
            comment,
        };
        let staged = self.stage(&server.id, next, Vec::new(), Some(verdict)).await;

        match self.classifier.execute(operation).await {
            Ok(CallResult::Success(payload)) => {
                let item = payload.into_work_item()?;
                self.clear_overlay(&server.id).await;
                Ok(SubmissionOutcome::Confirmed(item))
            }
            Ok(CallResult::Queued(_)) => Ok(SubmissionOutcome::Deferred(
                self.deferred_view(server, staged.is_some(), next, Vec::new(), Some(verdict))
                    .await,
            )),
            Ok(CallResult::HardFailure(err)) => {
                self.withdraw(staged).await;
                Err(err.into())
            }
            Err(err) => {
                self.withdraw(staged).await;
                Err(err)
            }
        }
    }

    pub async fn confirm_media(
        &self,
        work_item_id: &WorkItemId,
        upload_key: &UploadKey,
    ) -> Result<bool, AppError> {
        self.overlays.confirm_media(work_item_id, upload_key).await
    }

    pub async fn confirm_review(&self, work_item_id: &WorkItemId) -> Result<bool, AppError> {
        self.overlays.confirm_review(work_item_id).await
    }

    /// Writes the offline view before anything is sent, so a replay that
    /// confirms the submission finds it. Failing to write it is not fatal.
    async fn stage(
        &self,
        work_item_id: &WorkItemId,
        status: WorkItemStatus,
        media: Vec<MediaEntry>,
        review: Option<ReviewVerdict>,
    ) -> Option<StagedSubmission> {
        match self
            .overlays
            .stage_submission(work_item_id, status, media, review)
            .await
        {
            Ok(staged) => Some(staged),
            Err(err) => {
                warn!(work_item = %work_item_id, "Failed to store offline submission: {}", err);
                None
            }
        }
    }

    async fn withdraw(&self, staged: Option<StagedSubmission>) {
        let Some(staged) = staged else {
            return;
        };
        if let Err(err) = self.overlays.withdraw(&staged).await {
            warn!("Failed to withdraw offline submission: {}", err);
        }
    }

    async fn deferred_view(
        &self,
        server: &WorkItem,
        stored: bool,
        status: WorkItemStatus,
        media: Vec<MediaEntry>,
        review: Option<ReviewVerdict>,
    ) -> WorkItem {
        let effective = self.effective_work_item(server.clone()).await;
        if stored {
            return effective;
        }
        let mut unsaved = WorkItemOverlay::new(server.id.clone(), status);
        unsaved.pending_media = media;
        unsaved.pending_review = review;
        unsaved.apply_to(effective)
    }

    async fn clear_overlay(&self, work_item_id: &WorkItemId) {
        if let Err(err) = self.overlays.clear(work_item_id).await {
            warn!(work_item = %work_item_id, "Failed to clear work item overlay: {}", err);
        }
    }
}
