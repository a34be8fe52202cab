use async_trait::async_trait;
use fieldsync::application::ports::inspection_gateway::{InspectionGateway, TransportError};
use fieldsync::domain::entities::{
    Acceptance, AnnotationPoint, AttachedFile, Checklist, MediaEntry, MediaStage, ReviewVerdict,
    WorkItem, WorkItemStatus,
};
use fieldsync::domain::value_objects::{
    ChecklistId, InspectionCallId, LocalPointId, PointIdentity, ServerPointId, WorkItemId,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

type ChecklistKey = (InspectionCallId, ChecklistId);

/// In-process stand-in for the inspection backend. Uploads are idempotent
/// per upload key and point creations per local point id.
pub struct FakeInspectionServer {
    online: AtomicBool,
    session_valid: AtomicBool,
    next_point: AtomicUsize,
    calls: AtomicUsize,
    unreachable_files: Mutex<HashSet<String>>,
    save_latency: Mutex<Option<Duration>>,
    created_points: Mutex<HashMap<LocalPointId, ServerPointId>>,
    checklists: Mutex<HashMap<ChecklistKey, Checklist>>,
    work_items: Mutex<HashMap<WorkItemId, WorkItem>>,
}

impl Default for FakeInspectionServer {
    fn default() -> Self {
        Self {
            online: AtomicBool::new(true),
            session_valid: AtomicBool::new(true),
            next_point: AtomicUsize::new(1),
            calls: AtomicUsize::new(0),
            unreachable_files: Mutex::new(HashSet::new()),
            save_latency: Mutex::new(None),
            created_points: Mutex::new(HashMap::new()),
            checklists: Mutex::new(HashMap::new()),
            work_items: Mutex::new(HashMap::new()),
        }
    }
}

#[allow(dead_code)]
impl FakeInspectionServer {
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn expire_session(&self, expired: bool) {
        self.session_valid.store(!expired, Ordering::SeqCst);
    }

    /// Uploads of these file names fail as if the connection dropped.
    pub fn drop_uploads_of(&self, file_name: &str) {
        self.unreachable_files
            .lock()
            .unwrap()
            .insert(file_name.to_string());
    }

    pub fn restore_uploads(&self) {
        self.unreachable_files.lock().unwrap().clear();
    }

    /// Point saves take this long to be applied once they reach the server.
    pub fn delay_saves(&self, latency: Duration) {
        *self.save_latency.lock().unwrap() = Some(latency);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seed_checklist(&self, call_id: &InspectionCallId, checklist: Checklist) {
        self.checklists
            .lock()
            .unwrap()
            .insert((call_id.clone(), checklist.id.clone()), checklist);
    }

    pub fn seed_work_item(&self, item: WorkItem) {
        self.work_items.lock().unwrap().insert(item.id.clone(), item);
    }

    pub fn checklist(&self, call_id: &InspectionCallId, checklist_id: &ChecklistId) -> Checklist {
        self.checklists
            .lock()
            .unwrap()
            .get(&(call_id.clone(), checklist_id.clone()))
            .cloned()
            .expect("checklist seeded")
    }

    pub fn work_item(&self, id: &WorkItemId) -> WorkItem {
        self.work_items
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .expect("work item seeded")
    }

    fn gate(&self) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.online.load(Ordering::SeqCst) {
            return Err(TransportError::Connectivity("no route to host".into()));
        }
        if !self.session_valid.load(Ordering::SeqCst) {
            return Err(TransportError::AuthExpired("refresh token revoked".into()));
        }
        Ok(())
    }

    fn not_found(what: impl std::fmt::Display) -> TransportError {
        TransportError::Application {
            status: 404,
            message: format!("{what} not found"),
        }
    }

    fn conflict(message: String) -> TransportError {
        TransportError::Application {
            status: 409,
            message,
        }
    }

    fn with_checklist<F>(
        &self,
        call_id: &InspectionCallId,
        checklist_id: &ChecklistId,
        apply: F,
    ) -> Result<Checklist, TransportError>
    where
        F: FnOnce(&mut Checklist) -> Result<(), TransportError>,
    {
        let mut checklists = self.checklists.lock().unwrap();
        let checklist = checklists
            .get_mut(&(call_id.clone(), checklist_id.clone()))
            .ok_or_else(|| Self::not_found(checklist_id))?;
        apply(checklist)?;
        Ok(checklist.clone())
    }

    fn with_work_item<F>(&self, id: &WorkItemId, apply: F) -> Result<WorkItem, TransportError>
    where
        F: FnOnce(&mut WorkItem) -> Result<(), TransportError>,
    {
        let mut items = self.work_items.lock().unwrap();
        let item = items.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        apply(item)?;
        Ok(item.clone())
    }
}

#[async_trait]
impl InspectionGateway for FakeInspectionServer {
    async fn save_point(
        &self,
        call_id: &InspectionCallId,
        checklist_id: &ChecklistId,
        point: &AnnotationPoint,
    ) -> Result<Checklist, TransportError> {
        self.gate()?;
        let latency = *self.save_latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.with_checklist(call_id, checklist_id, |checklist| match &point.identity {
            PointIdentity::Pending(local_id) => {
                let mut created_points = self.created_points.lock().unwrap();
                if let Some(server_id) = created_points.get(local_id) {
                    let existing = checklist
                        .points
                        .iter_mut()
                        .find(|existing| existing.identity.server_id() == Some(server_id))
                        .ok_or_else(|| Self::not_found(server_id))?;
                    existing.apply_edit(point);
                    return Ok(());
                }
                let id = self.next_point.fetch_add(1, Ordering::SeqCst);
                let server_id = ServerPointId::new(format!("srv-{id}"))
                    .map_err(Self::conflict)?;
                created_points.insert(local_id.clone(), server_id.clone());
                let mut created = AnnotationPoint::synced(server_id, point.geometry);
                created.apply_edit(point);
                checklist.points.push(created);
                Ok(())
            }
            PointIdentity::Synced(_) => {
                let existing = checklist
                    .points
                    .iter_mut()
                    .find(|existing| existing.identity == point.identity)
                    .ok_or_else(|| Self::not_found(&point.identity))?;
                existing.apply_edit(point);
                Ok(())
            }
        })
    }

    async fn decide_checklist(
        &self,
        call_id: &InspectionCallId,
        checklist_id: &ChecklistId,
        acceptance: Acceptance,
    ) -> Result<Checklist, TransportError> {
        self.gate()?;
        self.with_checklist(call_id, checklist_id, |checklist| {
            checklist.acceptance = acceptance;
            Ok(())
        })
    }

    async fn upload_work_item_media(
        &self,
        work_item_id: &WorkItemId,
        stage: MediaStage,
        file: &AttachedFile,
        comment: Option<String>,
    ) -> Result<WorkItem, TransportError> {
        self.gate()?;
        if self
            .unreachable_files
            .lock()
            .unwrap()
            .contains(&file.file_name)
        {
            return Err(TransportError::Connectivity("connection reset".into()));
        }
        self.with_work_item(work_item_id, |item| {
            if item.has_media(&file.upload_key) {
                return Ok(());
            }
            let step_target = match stage {
                MediaStage::BeforeWork => WorkItemStatus::Started,
                MediaStage::AfterWork => WorkItemStatus::SentVerification,
            };
            item.status = match item.status.transition(stage.into()) {
                Ok(next) => next,
                Err(_) if item.status == step_target => item.status,
                Err(err) => return Err(Self::conflict(err.to_string())),
            };
            item.media.push(MediaEntry {
                stage,
                file: file.clone(),
                comment,
                recorded_at: chrono::Utc::now(),
            });
            Ok(())
        })
    }

    async fn review_work_item(
        &self,
        work_item_id: &WorkItemId,
        verdict: ReviewVerdict,
        _comment: Option<String>,
    ) -> Result<WorkItem, TransportError> {
        self.gate()?;
        self.with_work_item(work_item_id, |item| {
            item.status = item
                .status
                .transition(verdict.into())
                .map_err(|err| Self::conflict(err.to_string()))?;
            Ok(())
        })
    }
}
