pub mod inspection_ids;
pub mod mutation_id;
pub mod point_id;
pub mod upload_key;

pub use inspection_ids::{ChecklistId, InspectionCallId, WorkItemId};
pub use mutation_id::MutationId;
pub use point_id::{LocalPointId, PointIdentity, ServerPointId};
pub use upload_key::UploadKey;
