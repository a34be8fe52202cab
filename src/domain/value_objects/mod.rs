pub mod offline;

pub use offline::{
    ChecklistId, InspectionCallId, LocalPointId, MutationId, PointIdentity, ServerPointId,
    UploadKey, WorkItemId,
};
