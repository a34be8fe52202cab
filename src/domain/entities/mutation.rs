use super::annotation::{Acceptance, AnnotationPoint, AttachedFile};
use super::work_item::{MediaStage, ReviewVerdict};
use crate::domain::value_objects::{
    ChecklistId, InspectionCallId, MutationId, PointIdentity, WorkItemId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A mutating remote operation with the exact arguments it was called with.
/// Serialized as `{"kind": ..., "args": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "args", rename_all = "snake_case")]
pub enum QueuedOperation {
    SavePoint {
        call_id: InspectionCallId,
        checklist_id: ChecklistId,
        point: AnnotationPoint,
    },
    DecideChecklist {
        call_id: InspectionCallId,
        checklist_id: ChecklistId,
        acceptance: Acceptance,
    },
    UploadWorkItemMedia {
        work_item_id: WorkItemId,
        stage: MediaStage,
        file: AttachedFile,
        comment: Option<String>,
    },
    ReviewWorkItem {
        work_item_id: WorkItemId,
        verdict: ReviewVerdict,
        comment: Option<String>,
    },
}

impl QueuedOperation {
    pub fn kind(&self) -> &'static str {
        match self {
            QueuedOperation::SavePoint { .. } => "save_point",
            QueuedOperation::DecideChecklist { .. } => "decide_checklist",
            QueuedOperation::UploadWorkItemMedia { .. } => "upload_work_item_media",
            QueuedOperation::ReviewWorkItem { .. } => "review_work_item",
        }
    }

    /// The entity this operation writes to. Operations on the same entity
    /// must reach the server in the order they were issued.
    pub fn entity_key(&self) -> String {
        match self {
            QueuedOperation::SavePoint {
                call_id,
                checklist_id,
                point,
            } => point_key(call_id, checklist_id, &point.identity),
            QueuedOperation::DecideChecklist {
                call_id,
                checklist_id,
                ..
            } => format!("checklist:{call_id}:{checklist_id}"),
            QueuedOperation::UploadWorkItemMedia { work_item_id, .. }
            | QueuedOperation::ReviewWorkItem { work_item_id, .. } => {
                format!("work_item:{work_item_id}")
            }
        }
    }

    /// Saves of a local-only point collapse into one record: the server must
    /// create the point exactly once, with its latest content.
    pub fn coalesce_key(&self) -> Option<String> {
        match self {
            QueuedOperation::SavePoint { point, .. } if point.is_local_only() => {
                Some(self.entity_key())
            }
            _ => None,
        }
    }
}

pub fn point_key(
    call_id: &InspectionCallId,
    checklist_id: &ChecklistId,
    identity: &PointIdentity,
) -> String {
    format!("point:{call_id}:{checklist_id}:{identity}")
}

/// Durable replay record owned by the mutation queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub id: MutationId,
    pub operation: QueuedOperation,
    pub enqueued_at: DateTime<Utc>,
    /// Replays that ended in a transient server error.
    #[serde(default)]
    pub attempts: u32,
    /// Bumped whenever a later save is coalesced into this record.
    #[serde(default)]
    pub revision: u32,
}

impl MutationRecord {
    pub fn new(operation: QueuedOperation) -> Self {
        Self {
            id: MutationId::generate(),
            operation,
            enqueued_at: Utc::now(),
            attempts: 0,
            revision: 0,
        }
    }
}
