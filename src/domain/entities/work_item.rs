use super::annotation::AttachedFile;
use crate::domain::value_objects::{UploadKey, WorkItemId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkItemStatus {
    #[default]
    NotStarted,
    Started,
    SentVerification,
    OnCorrection,
    Done,
}

impl WorkItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemStatus::NotStarted => "NOT_STARTED",
            WorkItemStatus::Started => "STARTED",
            WorkItemStatus::SentVerification => "SENT_VERIFICATION",
            WorkItemStatus::OnCorrection => "ON_CORRECTION",
            WorkItemStatus::Done => "DONE",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkItemStatus::Done)
    }

    /// Next status after `submission`. Online and offline submissions both go
    /// through here so the locally computed state matches the server's.
    pub fn transition(self, submission: Submission) -> Result<WorkItemStatus, TransitionError> {
        use Submission::*;
        use WorkItemStatus::*;

        match (self, submission) {
            (NotStarted | Started | OnCorrection, BeforeWork) => Ok(Started),
            (Started | OnCorrection, AfterWork) => Ok(SentVerification),
            (SentVerification, Accept) => Ok(Done),
            (SentVerification, Reject) => Ok(OnCorrection),
            (from, submission) => Err(TransitionError { from, submission }),
        }
    }
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What drives a work item forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Submission {
    BeforeWork,
    AfterWork,
    Accept,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("work item in status {from} cannot take a {submission:?} submission")]
pub struct TransitionError {
    pub from: WorkItemStatus,
    pub submission: Submission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaStage {
    BeforeWork,
    AfterWork,
}

impl From<MediaStage> for Submission {
    fn from(stage: MediaStage) -> Self {
        match stage {
            MediaStage::BeforeWork => Submission::BeforeWork,
            MediaStage::AfterWork => Submission::AfterWork,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Accept,
    Reject,
}

impl From<ReviewVerdict> for Submission {
    fn from(verdict: ReviewVerdict) -> Self {
        match verdict {
            ReviewVerdict::Accept => Submission::Accept,
            ReviewVerdict::Reject => Submission::Reject,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaEntry {
    pub stage: MediaStage,
    pub file: AttachedFile,
    pub comment: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub title: String,
    pub status: WorkItemStatus,
    #[serde(default)]
    pub media: Vec<MediaEntry>,
    /// Set on views computed from not yet confirmed local submissions.
    #[serde(default)]
    pub is_offline_data: bool,
}

impl WorkItem {
    pub fn new(id: WorkItemId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            status: WorkItemStatus::NotStarted,
            media: Vec::new(),
            is_offline_data: false,
        }
    }

    pub fn has_media(&self, upload_key: &UploadKey) -> bool {
        self.media
            .iter()
            .any(|entry| &entry.file.upload_key == upload_key)
    }
}

/// Local submissions for one work item that the server has not confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemOverlay {
    pub work_item_id: WorkItemId,
    pub status: WorkItemStatus,
    #[serde(default)]
    pub pending_media: Vec<MediaEntry>,
    pub pending_review: Option<ReviewVerdict>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItemOverlay {
    pub fn new(work_item_id: WorkItemId, status: WorkItemStatus) -> Self {
        Self {
            work_item_id,
            status,
            pending_media: Vec::new(),
            pending_review: None,
            updated_at: Utc::now(),
        }
    }

    pub fn remove_media(&mut self, upload_key: &UploadKey) -> bool {
        let before = self.pending_media.len();
        self.pending_media
            .retain(|entry| &entry.file.upload_key != upload_key);
        before != self.pending_media.len()
    }

    pub fn is_settled(&self) -> bool {
        self.pending_media.is_empty() && self.pending_review.is_none()
    }

    /// Server item with the local status and pending media laid over it.
    pub fn apply_to(&self, server: WorkItem) -> WorkItem {
        let mut merged = server;
        merged.status = self.status;
        for entry in &self.pending_media {
            if !merged.has_media(&entry.file.upload_key) {
                merged.media.push(entry.clone());
            }
        }
        merged.is_offline_data = true;
        merged
    }
}
