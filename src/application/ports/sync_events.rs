use crate::application::services::mutation_queue::ReplayReport;
use crate::shared::error::AppError;
use async_trait::async_trait;

/// Signals for the view layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A replay pass ended; views should refetch canonical state.
    DataShouldReload(ReplayReport),
    /// Token refresh failed; the user must log in again. Queued work stays.
    SessionExpired,
}

#[async_trait]
pub trait SyncEventSink: Send + Sync {
    async fn publish(&self, event: SyncEvent) -> Result<(), AppError>;
}
