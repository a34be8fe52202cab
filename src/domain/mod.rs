pub mod entities;
pub mod value_objects;

pub use entities::{
    Acceptance, AnnotationPoint, Checklist, MutationRecord, QueuedOperation,
    ShadowChecklistRecord, WorkItem, WorkItemStatus,
};
pub use value_objects::{ChecklistId, InspectionCallId, MutationId, PointIdentity, WorkItemId};
