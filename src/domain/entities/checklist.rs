use super::annotation::{Acceptance, AnnotationPoint};
use crate::domain::value_objects::{ChecklistId, InspectionCallId, PointIdentity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Checklist as last fetched from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checklist {
    pub id: ChecklistId,
    pub title: String,
    pub required: bool,
    #[serde(default)]
    pub acceptance: Acceptance,
    #[serde(default)]
    pub points: Vec<AnnotationPoint>,
}

impl Checklist {
    pub fn new(id: ChecklistId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            required: false,
            acceptance: Acceptance::Pending,
            points: Vec::new(),
        }
    }

    pub fn point(&self, identity: &PointIdentity) -> Option<&AnnotationPoint> {
        self.points.iter().find(|point| &point.identity == identity)
    }
}

/// Unsynced local edits for one checklist of one inspection call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowChecklistRecord {
    pub call_id: InspectionCallId,
    pub checklist_id: ChecklistId,
    /// Checklist-level decision waiting for server confirmation.
    pub pending_decision: Option<Acceptance>,
    /// New local-only points and edits to server-confirmed points, in creation order.
    #[serde(default)]
    pub points: Vec<AnnotationPoint>,
    pub updated_at: DateTime<Utc>,
}

impl ShadowChecklistRecord {
    pub fn new(call_id: InspectionCallId, checklist_id: ChecklistId) -> Self {
        Self {
            call_id,
            checklist_id,
            pending_decision: None,
            points: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Replaces the entry with the same identity or appends a new one.
    pub fn upsert_point(&mut self, point: AnnotationPoint) {
        match self
            .points
            .iter_mut()
            .find(|existing| existing.identity == point.identity)
        {
            Some(existing) => *existing = point,
            None => self.points.push(point),
        }
        self.updated_at = Utc::now();
    }

    pub fn remove_point(&mut self, identity: &PointIdentity) -> bool {
        let before = self.points.len();
        self.points.retain(|point| &point.identity != identity);
        let removed = self.points.len() != before;
        if removed {
            self.updated_at = Utc::now();
        }
        removed
    }

    pub fn set_decision(&mut self, decision: Acceptance) {
        self.pending_decision = Some(decision);
        self.updated_at = Utc::now();
    }

    pub fn confirm_decision(&mut self) -> bool {
        let had_decision = self.pending_decision.take().is_some();
        if had_decision {
            self.updated_at = Utc::now();
        }
        had_decision
    }

    /// Nothing left waiting for the server.
    pub fn is_settled(&self) -> bool {
        self.points.is_empty() && self.pending_decision.is_none()
    }
}
