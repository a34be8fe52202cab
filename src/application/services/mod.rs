pub mod annotation_reconciler;
pub mod batch_submission;
pub mod call_classifier;
pub mod checklist_service;
pub mod mutation_queue;
pub mod replay_handler;
pub mod sync_service;
pub mod work_item_overlay;
pub mod work_item_service;

#[cfg(test)]
pub(crate) mod test_support;

pub use annotation_reconciler::{AnnotationReconciler, merge_checklist};
pub use batch_submission::{BatchOutcome, BatchSubmitter};
pub use call_classifier::{Attempt, CallClassifier, CallResult};
pub use checklist_service::{ChecklistService, SubmissionOutcome};
pub use mutation_queue::{MutationQueue, ReplayHandler, ReplayReport, ReplayStop};
pub use replay_handler::ConfirmingReplayHandler;
pub use sync_service::{SyncService, SyncStatus, SyncTrigger};
pub use work_item_overlay::WorkItemOverlayStore;
pub use work_item_service::WorkItemService;
