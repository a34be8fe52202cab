use crate::application::ports::key_value_store::{KeyValueStore, load_json, save_json};
use crate::domain::entities::{Acceptance, AnnotationPoint, Checklist, ShadowChecklistRecord};
use crate::domain::value_objects::{ChecklistId, InspectionCallId, PointIdentity};
use crate::shared::KeyedLocks;
use crate::shared::error::AppError;
use std::sync::Arc;
use tracing::{debug, warn};

pub const SHADOW_NAMESPACE_PREFIX: &str = "shadow_checklist_v1";

pub fn shadow_namespace(call_id: &InspectionCallId, checklist_id: &ChecklistId) -> String {
    format!("{SHADOW_NAMESPACE_PREFIX}:{call_id}:{checklist_id}")
}

/// Server checklist with the shadow laid over it. Synced edits replace the
/// matching server point's content, local-only points follow the server
/// points in creation order, and a pending decision wins over the server's.
pub fn merge_checklist(server: Checklist, shadow: &ShadowChecklistRecord) -> Checklist {
    let mut merged = server;
    let (local_only, edits): (Vec<&AnnotationPoint>, Vec<&AnnotationPoint>) = shadow
        .points
        .iter()
        .partition(|point| point.is_local_only());

    for edit in edits {
        match merged
            .points
            .iter_mut()
            .find(|point| point.identity == edit.identity)
        {
            Some(point) => point.apply_edit(edit),
            None => debug!(point = %edit.identity, "Shadow edit has no server point, skipping"),
        }
    }
    merged.points.extend(local_only.into_iter().cloned());

    if let Some(decision) = shadow.pending_decision {
        merged.acceptance = decision;
    }
    merged
}

/// Lays an edit that could not be stored over an already merged checklist.
pub fn overlay_unsaved_edit(
    mut checklist: Checklist,
    point: Option<AnnotationPoint>,
    decision: Option<Acceptance>,
) -> Checklist {
    if let Some(point) = point {
        let local_only = point.is_local_only();
        match checklist
            .points
            .iter_mut()
            .find(|existing| existing.identity == point.identity)
        {
            Some(existing) if local_only => *existing = point,
            Some(existing) => existing.apply_edit(&point),
            None if local_only => checklist.points.push(point),
            None => debug!(point = %point.identity, "Unsaved edit has no server point, skipping"),
        }
    }
    if let Some(decision) = decision {
        checklist.acceptance = decision;
    }
    checklist
}

/// Optimistic edit written ahead of its submission, with what it replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedEdit {
    call_id: InspectionCallId,
    checklist_id: ChecklistId,
    point: Option<AnnotationPoint>,
    previous_point: Option<AnnotationPoint>,
    decision: Option<Acceptance>,
    previous_decision: Option<Acceptance>,
}

/// Keeps unsynced checklist edits in per-checklist shadow records and merges
/// them over server state on read.
pub struct AnnotationReconciler {
    store: Arc<dyn KeyValueStore>,
    locks: Arc<KeyedLocks>,
}

impl AnnotationReconciler {
    pub fn new(store: Arc<dyn KeyValueStore>, locks: Arc<KeyedLocks>) -> Self {
        Self { store, locks }
    }

    /// Unreadable shadows count as absent.
    pub async fn load_shadow(
        &self,
        call_id: &InspectionCallId,
        checklist_id: &ChecklistId,
    ) -> Option<ShadowChecklistRecord> {
        let namespace = shadow_namespace(call_id, checklist_id);
        match load_json(self.store.as_ref(), &namespace).await {
            Ok(shadow) => shadow,
            Err(err) => {
                warn!(namespace = %namespace, "Failed to read shadow record: {}", err);
                None
            }
        }
    }

    pub async fn effective_checklist(
        &self,
        call_id: &InspectionCallId,
        checklist_id: &ChecklistId,
        server: Checklist,
    ) -> Checklist {
        match self.load_shadow(call_id, checklist_id).await {
            Some(shadow) => merge_checklist(server, &shadow),
            None => server,
        }
    }

    /// Records an optimistic edit: the point is upserted by identity and the
    /// decision, when given, becomes the pending checklist decision.
    pub async fn apply_local_edit(
        &self,
        call_id: &InspectionCallId,
        checklist_id: &ChecklistId,
        point: Option<AnnotationPoint>,
        decision: Option<Acceptance>,
    ) -> Result<(), AppError> {
        if point.is_none() && decision.is_none() {
            return Ok(());
        }
        self.stage_edit(call_id, checklist_id, point, decision)
            .await
            .map(|_| ())
    }

    /// Same as [`apply_local_edit`](Self::apply_local_edit), remembering the
    /// replaced entries so the edit can be withdrawn.
    pub async fn stage_edit(
        &self,
        call_id: &InspectionCallId,
        checklist_id: &ChecklistId,
        point: Option<AnnotationPoint>,
        decision: Option<Acceptance>,
    ) -> Result<StagedEdit, AppError> {
        self.mutate(call_id, checklist_id, |shadow| {
            let previous_point = point.as_ref().and_then(|staged| {
                shadow
                    .points
                    .iter()
                    .find(|existing| existing.identity == staged.identity)
                    .cloned()
            });
            let previous_decision = shadow.pending_decision;
            if let Some(point) = &point {
                shadow.upsert_point(point.clone());
            }
            if let Some(decision) = decision {
                shadow.set_decision(decision);
            }
            StagedEdit {
                call_id: call_id.clone(),
                checklist_id: checklist_id.clone(),
                point,
                previous_point,
                decision,
                previous_decision,
            }
        })
        .await
    }

    /// Puts back what a staged edit replaced. Entries changed again since
    /// staging belong to a later edit and are left alone.
    pub async fn withdraw(&self, staged: &StagedEdit) -> Result<(), AppError> {
        self.mutate(&staged.call_id, &staged.checklist_id, |shadow| {
            if let Some(point) = &staged.point {
                let untouched = shadow
                    .points
                    .iter()
                    .any(|existing| existing == point);
                if untouched {
                    match &staged.previous_point {
                        Some(previous) => shadow.upsert_point(previous.clone()),
                        None => {
                            shadow.remove_point(&point.identity);
                        }
                    }
                }
            }
            if staged.decision.is_some() && shadow.pending_decision == staged.decision {
                shadow.pending_decision = staged.previous_decision;
            }
        })
        .await
    }

    /// Removes a point that only exists on this device. Synced points cannot
    /// be deleted locally.
    pub async fn delete_local_point(
        &self,
        call_id: &InspectionCallId,
        checklist_id: &ChecklistId,
        identity: &PointIdentity,
    ) -> Result<bool, AppError> {
        if !identity.is_local_only() {
            return Err(AppError::ValidationError(format!(
                "point {identity} is already on the server and cannot be deleted locally"
            )));
        }
        self.mutate(call_id, checklist_id, |shadow| shadow.remove_point(identity))
            .await
    }

    /// Drops the shadow entry for a point the server has accepted.
    pub async fn promote_point(
        &self,
        call_id: &InspectionCallId,
        checklist_id: &ChecklistId,
        identity: &PointIdentity,
    ) -> Result<bool, AppError> {
        self.mutate(call_id, checklist_id, |shadow| shadow.remove_point(identity))
            .await
    }

    /// Promotes `sent` only if the shadow still holds exactly that content.
    /// A later local edit stays shadowed until its own write is confirmed.
    pub async fn settle_point(
        &self,
        call_id: &InspectionCallId,
        checklist_id: &ChecklistId,
        sent: &AnnotationPoint,
    ) -> Result<bool, AppError> {
        self.mutate(call_id, checklist_id, |shadow| {
            let unchanged = shadow
                .points
                .iter()
                .any(|point| point.identity == sent.identity && point == sent);
            unchanged && shadow.remove_point(&sent.identity)
        })
        .await
    }

    pub async fn confirm_decision(
        &self,
        call_id: &InspectionCallId,
        checklist_id: &ChecklistId,
    ) -> Result<bool, AppError> {
        self.mutate(call_id, checklist_id, ShadowChecklistRecord::confirm_decision)
            .await
    }

    /// Clears the pending decision if it is still the one that was sent.
    pub async fn settle_decision(
        &self,
        call_id: &InspectionCallId,
        checklist_id: &ChecklistId,
        sent: Acceptance,
    ) -> Result<bool, AppError> {
        self.mutate(call_id, checklist_id, |shadow| {
            shadow.pending_decision == Some(sent) && shadow.confirm_decision()
        })
        .await
    }

    /// Read-modify-write of one shadow record under its lock. A record with
    /// nothing left pending is deleted.
    async fn mutate<F, R>(
        &self,
        call_id: &InspectionCallId,
        checklist_id: &ChecklistId,
        apply: F,
    ) -> Result<R, AppError>
    where
        F: FnOnce(&mut ShadowChecklistRecord) -> R,
    {
        let namespace = shadow_namespace(call_id, checklist_id);
        let _lock = self.locks.lock(&namespace).await;

        let existing: Option<ShadowChecklistRecord> =
            load_json(self.store.as_ref(), &namespace).await?;
        let existed = existing.is_some();
        let mut shadow = existing
            .unwrap_or_else(|| ShadowChecklistRecord::new(call_id.clone(), checklist_id.clone()));

        let result = apply(&mut shadow);

        if shadow.is_settled() {
            if existed {
                self.store.remove(&namespace).await?;
                debug!(namespace = %namespace, "Shadow record settled");
            }
        } else {
            save_json(self.store.as_ref(), &namespace, &shadow).await?;
        }
        Ok(result)
    }
}
