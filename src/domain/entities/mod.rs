pub mod annotation;
pub mod checklist;
pub mod mutation;
pub mod work_item;

pub use annotation::{Acceptance, AnnotationPoint, AttachedFile, PointGeometry};
pub use checklist::{Checklist, ShadowChecklistRecord};
pub use mutation::{MutationRecord, QueuedOperation, point_key};
pub use work_item::{
    MediaEntry, MediaStage, ReviewVerdict, Submission, TransitionError, WorkItem,
    WorkItemOverlay, WorkItemStatus,
};
