use crate::application::ports::sync_events::{SyncEvent, SyncEventSink};
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

/// Fans sync events out to every subscribed view.
pub struct BroadcastSyncEventSink {
    sender: broadcast::Sender<SyncEvent>,
}

impl BroadcastSyncEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Sink holding up to `event_buffer` events for a slow view before it lags.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.event_buffer)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl SyncEventSink for BroadcastSyncEventSink {
    async fn publish(&self, event: SyncEvent) -> Result<(), AppError> {
        if self.sender.send(event).is_err() {
            debug!("No view subscribed to sync events");
        }
        Ok(())
    }
}
