use crate::domain::entities::{
    Acceptance, AnnotationPoint, AttachedFile, Checklist, MediaStage, ReviewVerdict, WorkItem,
};
use crate::domain::value_objects::{ChecklistId, InspectionCallId, WorkItemId};
use crate::shared::error::AppError;
use async_trait::async_trait;
use thiserror::Error;

/// Failure of a remote call, already classified by the transport.
/// The transport retries once after a token refresh; `AuthExpired` means that
/// refresh failed too.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Server unreachable: {0}")]
    Connectivity(String),

    #[error("Session expired: {0}")]
    AuthExpired(String),

    #[error("Request rejected ({status}): {message}")]
    Application { status: u16, message: String },
}

impl TransportError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, TransportError::Connectivity(_))
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, TransportError::AuthExpired(_))
    }

    /// 5xx responses: the server failed, it did not reject the content.
    pub fn is_server_fault(&self) -> bool {
        matches!(self, TransportError::Application { status, .. } if *status >= 500)
    }
}

/// Server state returned after a successful mutation. The backend always
/// answers with the full aggregate it touched.
#[derive(Debug, Clone, PartialEq)]
pub enum RemotePayload {
    Checklist(Checklist),
    WorkItem(WorkItem),
}

impl RemotePayload {
    pub fn into_checklist(self) -> Result<Checklist, AppError> {
        match self {
            RemotePayload::Checklist(checklist) => Ok(checklist),
            RemotePayload::WorkItem(item) => Err(AppError::Internal(format!(
                "expected checklist payload, got work item {}",
                item.id
            ))),
        }
    }

    pub fn into_work_item(self) -> Result<WorkItem, AppError> {
        match self {
            RemotePayload::WorkItem(item) => Ok(item),
            RemotePayload::Checklist(checklist) => Err(AppError::Internal(format!(
                "expected work item payload, got checklist {}",
                checklist.id
            ))),
        }
    }
}

/// Mutating endpoints of the inspection backend.
#[async_trait]
pub trait InspectionGateway: Send + Sync {
    /// Creates the point when it is local-only, updates it otherwise. The
    /// local id is the idempotency key: a second save carrying the same local
    /// id updates the point the first one created.
    async fn save_point(
        &self,
        call_id: &InspectionCallId,
        checklist_id: &ChecklistId,
        point: &AnnotationPoint,
    ) -> Result<Checklist, TransportError>;

    async fn decide_checklist(
        &self,
        call_id: &InspectionCallId,
        checklist_id: &ChecklistId,
        acceptance: Acceptance,
    ) -> Result<Checklist, TransportError>;

    async fn upload_work_item_media(
        &self,
        work_item_id: &WorkItemId,
        stage: MediaStage,
        file: &AttachedFile,
        comment: Option<String>,
    ) -> Result<WorkItem, TransportError>;

    async fn review_work_item(
        &self,
        work_item_id: &WorkItemId,
        verdict: ReviewVerdict,
        comment: Option<String>,
    ) -> Result<WorkItem, TransportError>;
}
