use crate::application::ports::key_value_store::{KeyValueStore, load_json, save_json};
use crate::domain::entities::{MediaEntry, ReviewVerdict, WorkItem, WorkItemOverlay, WorkItemStatus};
use crate::domain::value_objects::{UploadKey, WorkItemId};
use crate::shared::KeyedLocks;
use crate::shared::error::AppError;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

pub const OVERLAY_NAMESPACE_PREFIX: &str = "work_item_overlay_v1";

pub fn overlay_namespace(work_item_id: &WorkItemId) -> String {
    format!("{OVERLAY_NAMESPACE_PREFIX}:{work_item_id}")
}

/// Submission written ahead of its call, with the overlay it replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedSubmission {
    work_item_id: WorkItemId,
    previous: Option<WorkItemOverlay>,
    staged: WorkItemOverlay,
}

fn merge_submission(
    overlay: &mut WorkItemOverlay,
    status: WorkItemStatus,
    media: Vec<MediaEntry>,
    review: Option<ReviewVerdict>,
) {
    overlay.status = status;
    for entry in media {
        if !overlay
            .pending_media
            .iter()
            .any(|existing| existing.file.upload_key == entry.file.upload_key)
        {
            overlay.pending_media.push(entry);
        }
    }
    if review.is_some() {
        overlay.pending_review = review;
    }
    overlay.updated_at = Utc::now();
}

/// Persists offline work-item submissions until the server confirms them.
pub struct WorkItemOverlayStore {
    store: Arc<dyn KeyValueStore>,
    locks: Arc<KeyedLocks>,
}

impl WorkItemOverlayStore {
    pub fn new(store: Arc<dyn KeyValueStore>, locks: Arc<KeyedLocks>) -> Self {
        Self { store, locks }
    }

    pub async fn load(&self, work_item_id: &WorkItemId) -> Option<WorkItemOverlay> {
        let namespace = overlay_namespace(work_item_id);
        match load_json(self.store.as_ref(), &namespace).await {
            Ok(overlay) => overlay,
            Err(err) => {
                warn!(namespace = %namespace, "Failed to read work item overlay: {}", err);
                None
            }
        }
    }

    pub async fn effective_work_item(&self, server: WorkItem) -> WorkItem {
        match self.load(&server.id).await {
            Some(overlay) => overlay.apply_to(server),
            None => server,
        }
    }

    /// Stores the locally computed status together with the submission that
    /// produced it.
    pub async fn record_offline_submission(
        &self,
        work_item_id: &WorkItemId,
        status: WorkItemStatus,
        media: Vec<MediaEntry>,
        review: Option<ReviewVerdict>,
    ) -> Result<WorkItemOverlay, AppError> {
        self.stage_submission(work_item_id, status, media, review)
            .await
            .map(|staged| staged.staged)
    }

    /// Same as [`record_offline_submission`](Self::record_offline_submission),
    /// remembering the replaced overlay so the submission can be withdrawn.
    pub async fn stage_submission(
        &self,
        work_item_id: &WorkItemId,
        status: WorkItemStatus,
        media: Vec<MediaEntry>,
        review: Option<ReviewVerdict>,
    ) -> Result<StagedSubmission, AppError> {
        let namespace = overlay_namespace(work_item_id);
        let _lock = self.locks.lock(&namespace).await;
        let previous: Option<WorkItemOverlay> = load_json(self.store.as_ref(), &namespace).await?;
        let mut staged = previous
            .clone()
            .unwrap_or_else(|| WorkItemOverlay::new(work_item_id.clone(), status));
        merge_submission(&mut staged, status, media, review);
        self.persist(&namespace, &staged).await?;
        Ok(StagedSubmission {
            work_item_id: work_item_id.clone(),
            previous,
            staged,
        })
    }

    /// Puts back the overlay a staged submission replaced, unless another
    /// submission has changed it since.
    pub async fn withdraw(&self, staged: &StagedSubmission) -> Result<bool, AppError> {
        let namespace = overlay_namespace(&staged.work_item_id);
        let _lock = self.locks.lock(&namespace).await;
        let current: Option<WorkItemOverlay> = load_json(self.store.as_ref(), &namespace).await?;
        if current.as_ref() != Some(&staged.staged) {
            debug!(namespace = %namespace, "Overlay changed since staging, keeping it");
            return Ok(false);
        }
        match &staged.previous {
            Some(previous) => save_json(self.store.as_ref(), &namespace, previous).await?,
            None => self.store.remove(&namespace).await?,
        }
        Ok(true)
    }

    pub async fn confirm_media(
        &self,
        work_item_id: &WorkItemId,
        upload_key: &UploadKey,
    ) -> Result<bool, AppError> {
        self.mutate_existing(work_item_id, |overlay| overlay.remove_media(upload_key))
            .await
    }

    pub async fn confirm_review(&self, work_item_id: &WorkItemId) -> Result<bool, AppError> {
        self.mutate_existing(work_item_id, |overlay| overlay.pending_review.take().is_some())
            .await
    }

    pub async fn clear(&self, work_item_id: &WorkItemId) -> Result<(), AppError> {
        let namespace = overlay_namespace(work_item_id);
        let _lock = self.locks.lock(&namespace).await;
        self.store.remove(&namespace).await
    }

    async fn mutate_existing<F>(&self, work_item_id: &WorkItemId, apply: F) -> Result<bool, AppError>
    where
        F: FnOnce(&mut WorkItemOverlay) -> bool,
    {
        let namespace = overlay_namespace(work_item_id);
        let _lock = self.locks.lock(&namespace).await;
        let Some(mut overlay) =
            load_json::<WorkItemOverlay>(self.store.as_ref(), &namespace).await?
        else {
            return Ok(false);
        };
        let changed = apply(&mut overlay);
        if changed {
            self.persist(&namespace, &overlay).await?;
        }
        Ok(changed)
    }

    async fn persist(&self, namespace: &str, overlay: &WorkItemOverlay) -> Result<(), AppError> {
        if overlay.is_settled() {
            debug!(namespace = %namespace, "Work item overlay settled");
            self.store.remove(namespace).await
        } else {
            save_json(self.store.as_ref(), namespace, overlay).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::test_support::work_item_id;
    use crate::domain::entities::{AttachedFile, MediaStage};
    use crate::infrastructure::storage::MemoryKeyValueStore;

    fn overlays() -> (WorkItemOverlayStore, Arc<MemoryKeyValueStore>) {
        let store = Arc::new(MemoryKeyValueStore::new());
        (
            WorkItemOverlayStore::new(store.clone(), Arc::new(KeyedLocks::new())),
            store,
        )
    }

    fn entry(name: &str) -> MediaEntry {
        MediaEntry {
            stage: MediaStage::BeforeWork,
            file: AttachedFile::new(name, format!("/photos/{name}")),
            comment: None,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn offline_submission_shows_computed_status_and_media() {
        let (overlays, _) = overlays();
        let media = vec![entry("a.jpg"), entry("b.jpg")];
        overlays
            .record_offline_submission(&work_item_id(), WorkItemStatus::Started, media, None)
            .await
            .unwrap();

        let server = WorkItem::new(work_item_id(), "Tiling, level 2");
        let effective = overlays.effective_work_item(server).await;

        assert_eq!(effective.status, WorkItemStatus::Started);
        assert_eq!(effective.media.len(), 2);
        assert!(effective.is_offline_data);
    }

    #[tokio::test]
    async fn confirming_everything_deletes_the_overlay() {
        let (overlays, store) = overlays();
        let media = entry("a.jpg");
        let key = media.file.upload_key.clone();
        overlays
            .record_offline_submission(
                &work_item_id(),
                WorkItemStatus::SentVerification,
                vec![media],
                Some(ReviewVerdict::Accept),
            )
            .await
            .unwrap();

        assert!(overlays.confirm_media(&work_item_id(), &key).await.unwrap());
        assert!(overlays.load(&work_item_id()).await.is_some());
        assert!(overlays.confirm_review(&work_item_id()).await.unwrap());
        assert!(overlays.load(&work_item_id()).await.is_none());
        assert!(store.namespaces().await.is_empty());

        let server = WorkItem::new(work_item_id(), "Tiling, level 2");
        assert!(!overlays.effective_work_item(server).await.is_offline_data);
    }

    #[tokio::test]
    async fn confirming_without_overlay_is_a_no_op() {
        let (overlays, store) = overlays();
        assert!(!overlays.confirm_review(&work_item_id()).await.unwrap());
        assert!(store.namespaces().await.is_empty());
    }

    #[tokio::test]
    async fn media_already_on_the_server_is_not_duplicated() {
        let (overlays, _) = overlays();
        let media = entry("a.jpg");
        overlays
            .record_offline_submission(
                &work_item_id(),
                WorkItemStatus::Started,
                vec![media.clone()],
                None,
            )
            .await
            .unwrap();

        let mut server = WorkItem::new(work_item_id(), "Tiling, level 2");
        server.media.push(media);
        let effective = overlays.effective_work_item(server).await;
        assert_eq!(effective.media.len(), 1);
    }

    #[tokio::test]
    async fn withdrawn_submission_restores_the_earlier_overlay() {
        let (overlays, store) = overlays();
        let earlier = overlays
            .record_offline_submission(
                &work_item_id(),
                WorkItemStatus::Started,
                vec![entry("a.jpg")],
                None,
            )
            .await
            .unwrap();

        let staged = overlays
            .stage_submission(
                &work_item_id(),
                WorkItemStatus::SentVerification,
                vec![entry("b.jpg")],
                None,
            )
            .await
            .unwrap();
        assert!(overlays.withdraw(&staged).await.unwrap());
        assert_eq!(overlays.load(&work_item_id()).await, Some(earlier));

        overlays.clear(&work_item_id()).await.unwrap();
        let staged = overlays
            .stage_submission(&work_item_id(), WorkItemStatus::Started, vec![entry("c.jpg")], None)
            .await
            .unwrap();
        assert!(overlays.withdraw(&staged).await.unwrap());
        assert!(store.namespaces().await.is_empty());
    }

    #[tokio::test]
    async fn withdraw_keeps_an_overlay_changed_since_staging() {
        let (overlays, _) = overlays();
        let staged = overlays
            .stage_submission(&work_item_id(), WorkItemStatus::Started, vec![entry("a.jpg")], None)
            .await
            .unwrap();
        overlays
            .record_offline_submission(
                &work_item_id(),
                WorkItemStatus::SentVerification,
                vec![entry("b.jpg")],
                None,
            )
            .await
            .unwrap();

        assert!(!overlays.withdraw(&staged).await.unwrap());
        assert_eq!(overlays.load(&work_item_id()).await.unwrap().pending_media.len(), 2);
    }
}
