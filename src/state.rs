use crate::application::ports::inspection_gateway::InspectionGateway;
use crate::application::ports::key_value_store::KeyValueStore;
use crate::application::ports::sync_events::SyncEventSink;
use crate::application::services::{
    AnnotationReconciler, BatchSubmitter, CallClassifier, ChecklistService,
    ConfirmingReplayHandler, MutationQueue, ReplayReport, SyncService, SyncTrigger,
    WorkItemOverlayStore, WorkItemService,
};
use crate::infrastructure::offline::ReplayMetrics;
use crate::infrastructure::storage::{
    FileKeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore,
};
use crate::shared::config::{AppConfig, StorageBackend};
use crate::shared::error::AppError;
use crate::shared::keyed_lock::KeyedLocks;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything the views need, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn KeyValueStore>,
    pub queue: Arc<MutationQueue>,
    pub reconciler: Arc<AnnotationReconciler>,
    pub overlays: Arc<WorkItemOverlayStore>,
    pub classifier: Arc<CallClassifier>,
    pub checklist_service: Arc<ChecklistService>,
    pub work_item_service: Arc<WorkItemService>,
    pub sync_service: Arc<SyncService>,
    pub metrics: Arc<ReplayMetrics>,
}

impl AppState {
    pub async fn new(
        config: AppConfig,
        gateway: Arc<dyn InspectionGateway>,
        events: Arc<dyn SyncEventSink>,
    ) -> Result<Self, AppError> {
        config.validate().map_err(AppError::ConfigurationError)?;
        let store = open_store(&config).await?;
        Ok(Self::with_store(config, store, gateway, events))
    }

    pub fn with_store(
        config: AppConfig,
        store: Arc<dyn KeyValueStore>,
        gateway: Arc<dyn InspectionGateway>,
        events: Arc<dyn SyncEventSink>,
    ) -> Self {
        let locks = Arc::new(KeyedLocks::new());
        let metrics = Arc::new(ReplayMetrics::new());

        let reconciler = Arc::new(AnnotationReconciler::new(store.clone(), locks.clone()));
        let overlays = Arc::new(WorkItemOverlayStore::new(store.clone(), locks.clone()));
        let handler = Arc::new(ConfirmingReplayHandler::new(
            gateway.clone(),
            reconciler.clone(),
            overlays.clone(),
        ));
        let queue = Arc::new(MutationQueue::new(
            store.clone(),
            locks,
            handler,
            events.clone(),
            metrics.clone(),
            config.sync.max_retry,
        ));
        let classifier = Arc::new(CallClassifier::new(gateway, queue.clone(), events));
        let batches = Arc::new(BatchSubmitter::new(
            classifier.clone(),
            config.sync.max_batch_size,
        ));
        let checklist_service = Arc::new(ChecklistService::new(
            classifier.clone(),
            reconciler.clone(),
        ));
        let work_item_service = Arc::new(WorkItemService::new(
            classifier.clone(),
            batches,
            overlays.clone(),
        ));
        let sync_service = Arc::new(SyncService::new(queue.clone()));

        Self {
            config: Arc::new(config),
            store,
            queue,
            reconciler,
            overlays,
            classifier,
            checklist_service,
            work_item_service,
            sync_service,
            metrics,
        }
    }

    /// Replays whatever a previous session left queued, if enabled.
    pub async fn start(&self) -> Option<ReplayReport> {
        if !self.config.sync.replay_on_start {
            return None;
        }
        Some(self.sync_service.trigger(SyncTrigger::AppInitialized).await)
    }
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn KeyValueStore>, AppError> {
    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; queued mutations will not survive a restart");
            Ok(Arc::new(MemoryKeyValueStore::new()))
        }
        StorageBackend::File => {
            let root = if config.storage.data_dir.is_empty() {
                FileKeyValueStore::default_root()
            } else {
                PathBuf::from(&config.storage.data_dir)
            };
            info!(root = %root.display(), "Opening file storage");
            Ok(Arc::new(FileKeyValueStore::open(root).await?))
        }
        StorageBackend::Sqlite => {
            if let Some(parent) = sqlite_parent_dir(&config.storage.database_url) {
                tokio::fs::create_dir_all(parent).await?;
            }
            info!(url = %config.storage.database_url, "Opening SQLite storage");
            Ok(Arc::new(
                SqliteKeyValueStore::connect(
                    &config.storage.database_url,
                    config.storage.max_connections,
                )
                .await?,
            ))
        }
    }
}

/// Directory holding a file-backed SQLite database URL, if it has one.
fn sqlite_parent_dir(url: &str) -> Option<&Path> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Path::new(path)
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
}
