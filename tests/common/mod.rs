#![allow(dead_code)]

pub mod fake_server;

use fieldsync::AppState;
use fieldsync::application::ports::inspection_gateway::InspectionGateway;
use fieldsync::application::ports::key_value_store::KeyValueStore;
use fieldsync::domain::value_objects::{ChecklistId, InspectionCallId, WorkItemId};
use fieldsync::infrastructure::events::BroadcastSyncEventSink;
use fieldsync::infrastructure::storage::MemoryKeyValueStore;
use fieldsync::shared::config::{AppConfig, StorageBackend};
use std::sync::Arc;

pub use fake_server::FakeInspectionServer;

pub struct TestContext {
    pub state: AppState,
    pub server: Arc<FakeInspectionServer>,
    pub events: Arc<BroadcastSyncEventSink>,
    pub store: Arc<dyn KeyValueStore>,
}

pub fn memory_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.backend = StorageBackend::Memory;
    config.sync.replay_on_start = false;
    config
}

pub fn setup() -> TestContext {
    let server = Arc::new(FakeInspectionServer::default());
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
    setup_with(server, store)
}

/// Fresh app over existing storage, as after a restart.
pub fn setup_with(server: Arc<FakeInspectionServer>, store: Arc<dyn KeyValueStore>) -> TestContext {
    let config = memory_config();
    let events = Arc::new(BroadcastSyncEventSink::from_config(&config.sync));
    let gateway: Arc<dyn InspectionGateway> = server.clone();
    let state = AppState::with_store(config, store.clone(), gateway, events.clone());
    TestContext {
        state,
        server,
        events,
        store,
    }
}

pub fn call_id() -> InspectionCallId {
    InspectionCallId::new("call-42".into()).expect("call id")
}

pub fn checklist_id() -> ChecklistId {
    ChecklistId::new("cl-screed".into()).expect("checklist id")
}

pub fn work_item_id() -> WorkItemId {
    WorkItemId::new("wi-tiling".into()).expect("work item id")
}
