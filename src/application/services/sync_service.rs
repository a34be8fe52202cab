use crate::application::services::mutation_queue::{MutationQueue, ReplayReport, ReplayStop};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Events that make queued mutations worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    ConnectivityRestored,
    AppForegrounded,
    AppInitialized,
    ManualRetry,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub pending: u32,
    pub last_sync: Option<i64>,
    pub last_trigger: Option<SyncTrigger>,
    pub last_report: Option<ReplayReport>,
    pub sync_errors: u32,
}

/// Front door for replay. Every trigger runs the same single-flight pass.
pub struct SyncService {
    queue: Arc<MutationQueue>,
    status: Arc<RwLock<SyncStatus>>,
}

impl SyncService {
    pub fn new(queue: Arc<MutationQueue>) -> Self {
        Self {
            queue,
            status: Arc::new(RwLock::new(SyncStatus::default())),
        }
    }

    /// Runs a replay pass. `AppInitialized` follows a fresh login, so it also
    /// wakes a queue left dormant by an expired session.
    pub async fn trigger(&self, trigger: SyncTrigger) -> ReplayReport {
        debug!(?trigger, "Sync triggered");
        if trigger == SyncTrigger::AppInitialized {
            self.queue.resume_session();
        }
        let report = self.queue.replay().await;
        if report.skipped {
            return report;
        }

        let mut status = self.status.write().await;
        status.last_sync = Some(chrono::Utc::now().timestamp());
        status.last_trigger = Some(trigger);
        status.pending = report.remaining as u32;
        let failed_stop = matches!(
            report.stopped,
            Some(ReplayStop::SessionExpired | ReplayStop::ServerUnavailable)
        );
        status.sync_errors += report.dropped as u32 + u32::from(failed_stop);
        status.last_report = Some(report.clone());
        report
    }

    pub async fn get_status(&self) -> SyncStatus {
        let mut status = self.status.read().await.clone();
        status.is_syncing = self.queue.is_replaying();
        status.pending = self.queue.len().await as u32;
        status
    }

    pub async fn reset_errors(&self) {
        self.status.write().await.sync_errors = 0;
    }

    /// Replays on every offline to online edge of `connectivity`.
    pub fn watch_connectivity(&self, mut connectivity: watch::Receiver<bool>) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut online = *connectivity.borrow_and_update();
            while connectivity.changed().await.is_ok() {
                let now_online = *connectivity.borrow_and_update();
                if now_online && !online {
                    info!("Connectivity restored, replaying queued mutations");
                    service.trigger(SyncTrigger::ConnectivityRestored).await;
                }
                online = now_online;
            }
            debug!("Connectivity watch closed");
        })
    }
}

impl Clone for SyncService {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            status: self.status.clone(),
        }
    }
}
