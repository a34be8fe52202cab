use crate::application::ports::inspection_gateway::{InspectionGateway, TransportError};
use crate::application::ports::key_value_store::KeyValueStore;
use crate::application::ports::sync_events::{SyncEvent, SyncEventSink};
use crate::application::services::mutation_queue::{MutationQueue, ReplayHandler};
use crate::domain::entities::{
    Acceptance, AnnotationPoint, AttachedFile, Checklist, MediaStage, PointGeometry,
    QueuedOperation, ReviewVerdict, WorkItem,
};
use crate::domain::value_objects::{ChecklistId, InspectionCallId, ServerPointId, WorkItemId};
use crate::infrastructure::offline::ReplayMetrics;
use crate::infrastructure::storage::MemoryKeyValueStore;
use crate::shared::KeyedLocks;
use crate::shared::error::AppError;
use async_trait::async_trait;
use mockall::mock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

mock! {
    pub Gateway {}

    #[async_trait]
    impl InspectionGateway for Gateway {
        async fn save_point(
            &self,
            call_id: &InspectionCallId,
            checklist_id: &ChecklistId,
            point: &AnnotationPoint,
        ) -> Result<Checklist, TransportError>;
        async fn decide_checklist(
            &self,
            call_id: &InspectionCallId,
            checklist_id: &ChecklistId,
            acceptance: Acceptance,
        ) -> Result<Checklist, TransportError>;
        async fn upload_work_item_media(
            &self,
            work_item_id: &WorkItemId,
            stage: MediaStage,
            file: &AttachedFile,
            comment: Option<String>,
        ) -> Result<WorkItem, TransportError>;
        async fn review_work_item(
            &self,
            work_item_id: &WorkItemId,
            verdict: ReviewVerdict,
            comment: Option<String>,
        ) -> Result<WorkItem, TransportError>;
    }
}

/// Replay handler that succeeds unless told to fail on a given call number.
#[derive(Default)]
pub struct ScriptedHandler {
    handled: Mutex<Vec<QueuedOperation>>,
    failures: Mutex<HashMap<usize, TransportError>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedHandler {
    /// Fails the `call`-th invocation (1-based, counted across passes).
    pub fn fail_on(&self, call: usize, error: TransportError) {
        self.failures.lock().unwrap().insert(call, error);
    }

    pub fn delay_each(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.handled.lock().unwrap().len()
    }

    pub fn handled_entities(&self) -> Vec<String> {
        self.handled
            .lock()
            .unwrap()
            .iter()
            .map(QueuedOperation::entity_key)
            .collect()
    }
}

#[async_trait]
impl ReplayHandler for ScriptedHandler {
    async fn handle(&self, operation: &QueuedOperation) -> Result<(), TransportError> {
        let call = {
            let mut handled = self.handled.lock().unwrap();
            handled.push(operation.clone());
            handled.len()
        };
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.failures.lock().unwrap().remove(&call) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncEventSink for RecordingSink {
    async fn publish(&self, event: SyncEvent) -> Result<(), AppError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Memory store that logs every write and can refuse writes by namespace prefix.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryKeyValueStore,
    writes: Mutex<Vec<String>>,
    failing_prefix: Mutex<Option<String>>,
}

impl RecordingStore {
    pub fn fail_writes_to(&self, prefix: &str) {
        *self.failing_prefix.lock().unwrap() = Some(prefix.to_string());
    }

    /// Namespaces in the order they were successfully written.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn first_write_to(&self, prefix: &str) -> Option<usize> {
        self.writes()
            .iter()
            .position(|namespace| namespace.starts_with(prefix))
    }

    fn refuses(&self, namespace: &str) -> bool {
        self.failing_prefix
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|prefix| namespace.starts_with(prefix))
    }
}

#[async_trait]
impl KeyValueStore for RecordingStore {
    async fn get(&self, namespace: &str) -> Result<Option<Value>, AppError> {
        self.inner.get(namespace).await
    }

    async fn set(&self, namespace: &str, value: Value) -> Result<(), AppError> {
        if self.refuses(namespace) {
            return Err(AppError::Storage(format!("{namespace}: disk full")));
        }
        self.inner.set(namespace, value).await?;
        self.writes.lock().unwrap().push(namespace.to_string());
        Ok(())
    }

    async fn remove(&self, namespace: &str) -> Result<(), AppError> {
        self.inner.remove(namespace).await
    }
}

pub fn call_id() -> InspectionCallId {
    InspectionCallId::new("call-1".into()).unwrap()
}

pub fn checklist_id() -> ChecklistId {
    ChecklistId::new("cl-1".into()).unwrap()
}

pub fn work_item_id() -> WorkItemId {
    WorkItemId::new("wi-1".into()).unwrap()
}

pub fn server_id(value: &str) -> ServerPointId {
    ServerPointId::new(value.into()).unwrap()
}

pub fn decision(checklist: &str) -> QueuedOperation {
    QueuedOperation::DecideChecklist {
        call_id: call_id(),
        checklist_id: ChecklistId::new(checklist.into()).unwrap(),
        acceptance: Acceptance::Accepted,
    }
}

/// A save of a fresh local-only point, plus the point itself.
pub fn local_point_save(comment: &str) -> (QueuedOperation, AnnotationPoint) {
    let point = AnnotationPoint::new_local(PointGeometry::new(10.0, 20.0)).with_comment(comment);
    let operation = QueuedOperation::SavePoint {
        call_id: call_id(),
        checklist_id: checklist_id(),
        point: point.clone(),
    };
    (operation, point)
}

/// Server checklist `cl-1` holding synced points with the given ids.
pub fn server_checklist(point_ids: &[&str]) -> Checklist {
    let mut checklist = Checklist::new(checklist_id(), "Screed flatness");
    checklist.points = point_ids
        .iter()
        .enumerate()
        .map(|(i, id)| AnnotationPoint::synced(server_id(id), PointGeometry::new(i as f64, 0.0)))
        .collect();
    checklist
}

pub fn connectivity() -> TransportError {
    TransportError::Connectivity("network unreachable".into())
}

/// Queue over a fresh memory store whose replay handler is a no-op script.
pub fn memory_queue(
    store: Arc<dyn KeyValueStore>,
    locks: Arc<KeyedLocks>,
    sink: Arc<RecordingSink>,
) -> Arc<MutationQueue> {
    Arc::new(MutationQueue::new(
        store,
        locks,
        Arc::new(ScriptedHandler::default()),
        sink,
        Arc::new(ReplayMetrics::new()),
        3,
    ))
}
