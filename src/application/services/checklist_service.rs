use crate::application::services::annotation_reconciler::{
    AnnotationReconciler, StagedEdit, overlay_unsaved_edit,
};
use crate::application::services::call_classifier::{CallClassifier, CallResult};
use crate::domain::entities::{Acceptance, AnnotationPoint, Checklist, QueuedOperation, point_key};
use crate::domain::value_objects::{InspectionCallId, PointIdentity};
use crate::shared::error::AppError;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a user submission that did not hard-fail. Both variants carry
/// the state the view should now show.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome<T> {
    /// The server applied it.
    Confirmed(T),
    /// Stored locally and queued; shown optimistically.
    Deferred(T),
}

impl<T> SubmissionOutcome<T> {
    pub fn value(&self) -> &T {
        match self {
            SubmissionOutcome::Confirmed(value) | SubmissionOutcome::Deferred(value) => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            SubmissionOutcome::Confirmed(value) | SubmissionOutcome::Deferred(value) => value,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, SubmissionOutcome::Deferred(_))
    }
}

pub struct ChecklistService {
    classifier: Arc<CallClassifier>,
    reconciler: Arc<AnnotationReconciler>,
}

impl ChecklistService {
    pub fn new(classifier: Arc<CallClassifier>, reconciler: Arc<AnnotationReconciler>) -> Self {
        Self {
            classifier,
            reconciler,
        }
    }

    pub async fn effective_checklist(
        &self,
        call_id: &InspectionCallId,
        server: Checklist,
    ) -> Checklist {
        let checklist_id = server.id.clone();
        self.reconciler
            .effective_checklist(call_id, &checklist_id, server)
            .await
    }

    /// Creates or edits a point. `server` is the checklist as last fetched.
    pub async fn save_point(
        &self,
        call_id: &InspectionCallId,
        server: &Checklist,
        point: AnnotationPoint,
    ) -> Result<SubmissionOutcome<Checklist>, AppError> {
        let operation = QueuedOperation::SavePoint {
            call_id: call_id.clone(),
            checklist_id: server.id.clone(),
            point: point.clone(),
        };

        let staged = self
            .stage(call_id, server, Some(point.clone()), None)
            .await;

        match self.classifier.execute(operation).await {
            Ok(CallResult::Success(payload)) => {
                let checklist = payload.into_checklist()?;
                if let Err(err) = self
                    .reconciler
                    .settle_point(call_id, &server.id, &point)
                    .await
                {
                    warn!("Failed to settle saved point: {}", err);
                }
                Ok(SubmissionOutcome::Confirmed(
                    self.effective_checklist(call_id, checklist).await,
                ))
            }
            Ok(CallResult::Queued(_)) => Ok(SubmissionOutcome::Deferred(
                self.deferred_view(call_id, server, staged.is_some(), Some(point), None)
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

    pub async fn decide_checklist(
        &self,
        call_id: &InspectionCallId,
        server: &Checklist,
        acceptance: Acceptance,
    ) -> Result<SubmissionOutcome<Checklist>, AppError> {
        let operation = QueuedOperation::DecideChecklist {
            call_id: call_id.clone(),
            checklist_id: server.id.clone(),
            acceptance,
        };

        let staged = self.stage(call_id, server, None, Some(acceptance)).await;

        match self.classifier.execute(operation).await {
            Ok(CallResult::Success(payload)) => {
                let checklist = payload.into_checklist()?;
                if let Err(err) = self
                    .reconciler
                    .settle_decision(call_id, &server.id, acceptance)
                    .await
                {
                    warn!("Failed to settle checklist decision: {}", err);
                }
                Ok(SubmissionOutcome::Confirmed(
                    self.effective_checklist(call_id, checklist).await,
                ))
            }
            Ok(CallResult::Queued(_)) => Ok(SubmissionOutcome::Deferred(
                self.deferred_view(call_id, server, staged.is_some(), None, Some(acceptance))
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

    /// Deletes a point that never reached the server, along with its queued
    /// creation.
    pub async fn delete_point(
        &self,
        call_id: &InspectionCallId,
        server: &Checklist,
        identity: &PointIdentity,
    ) -> Result<Checklist, AppError> {
        if !identity.is_local_only() {
            return Err(AppError::ValidationError(format!(
                "point {identity} is already on the server and cannot be deleted locally"
            )));
        }
        let discarded = self
            .classifier
            .queue()
            .discard(&point_key(call_id, &server.id, identity))
            .await?;
        let removed = self
            .reconciler
            .delete_local_point(call_id, &server.id, identity)
            .await?;
        debug!(point = %identity, discarded, removed, "Deleted local point");
        Ok(self.effective_checklist(call_id, server.clone()).await)
    }

    /// Writes the optimistic edit before the call so a replay confirming it
    /// always finds it. A failed write only costs the offline view.
    async fn stage(
        &self,
        call_id: &InspectionCallId,
        server: &Checklist,
        point: Option<AnnotationPoint>,
        decision: Option<Acceptance>,
    ) -> Option<StagedEdit> {
        match self
            .reconciler
            .stage_edit(call_id, &server.id, point, decision)
            .await
        {
            Ok(staged) => Some(staged),
            Err(err) => {
                warn!(checklist = %server.id, "Failed to store optimistic edit: {}", err);
                None
            }
        }
    }

    async fn withdraw(&self, staged: Option<StagedEdit>) {
        let Some(staged) = staged else {
            return;
        };
        if let Err(err) = self.reconciler.withdraw(&staged).await {
            warn!("Failed to withdraw optimistic edit: {}", err);
        }
    }

    async fn deferred_view(
        &self,
        call_id: &InspectionCallId,
        server: &Checklist,
        stored: bool,
        point: Option<AnnotationPoint>,
        decision: Option<Acceptance>,
    ) -> Checklist {
        let effective = self.effective_checklist(call_id, server.clone()).await;
        if stored {
            effective
        } else {
            overlay_unsaved_edit(effective, point, decision)
        }
    }
}
