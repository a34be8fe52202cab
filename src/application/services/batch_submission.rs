use crate::application::ports::inspection_gateway::{RemotePayload, TransportError};
use crate::application::services::call_classifier::{Attempt, CallClassifier};
use crate::domain::entities::QueuedOperation;
use crate::domain::value_objects::MutationId;
use crate::shared::error::AppError;
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// Every call succeeded. Holds the response of the call that finished
    /// last, which reflects the whole batch.
    Completed(RemotePayload),
    /// At least one call could not reach the server. The entire batch is
    /// queued in submission order.
    Deferred(Vec<MutationId>),
    /// A call was rejected and none were unreachable. Nothing was stored.
    Failed(TransportError),
}

/// Submits related operations (typically the files of one work-item step)
/// concurrently and settles them as a unit.
pub struct BatchSubmitter {
    classifier: Arc<CallClassifier>,
    max_concurrency: usize,
}

impl BatchSubmitter {
    pub fn new(classifier: Arc<CallClassifier>, max_concurrency: usize) -> Self {
        Self {
            classifier,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub async fn submit(&self, operations: Vec<QueuedOperation>) -> Result<BatchOutcome, AppError> {
        if operations.is_empty() {
            return Err(AppError::ValidationError(
                "batch submission needs at least one operation".to_string(),
            ));
        }

        let queue = self.classifier.queue();
        for operation in &operations {
            if queue.has_pending_for(&operation.entity_key()).await {
                debug!(
                    entity = %operation.entity_key(),
                    "Batch target has queued mutations, deferring whole batch"
                );
                return self.defer(operations).await;
            }
        }

        let permits = Semaphore::new(self.max_concurrency);
        let finished = AtomicUsize::new(0);
        let attempts = join_all(operations.iter().map(|operation| {
            let permits = &permits;
            let finished = &finished;
            async move {
                let _permit = permits.acquire().await.ok();
                let attempt = self.classifier.send(operation).await;
                (finished.fetch_add(1, Ordering::SeqCst), attempt)
            }
        }))
        .await;

        if let Some(index) = representative(&attempts) {
            self.classifier
                .observe(&operations[index], &attempts[index].1)
                .await;
        }

        if attempts
            .iter()
            .any(|(_, attempt)| matches!(attempt, Attempt::Unreachable))
        {
            return self.defer(operations).await;
        }

        if let Some(index) = representative(&attempts) {
            if let Attempt::Rejected(err) = &attempts[index].1 {
                return Ok(BatchOutcome::Failed(err.clone()));
            }
        }

        let mut last: Option<(usize, RemotePayload)> = None;
        for (order, attempt) in attempts {
            match attempt {
                Attempt::Rejected(err) => return Ok(BatchOutcome::Failed(err)),
                Attempt::Succeeded(payload) => {
                    if last.as_ref().is_none_or(|(seen, _)| order > *seen) {
                        last = Some((order, payload));
                    }
                }
                Attempt::Unreachable => {}
            }
        }

        last.map(|(_, payload)| BatchOutcome::Completed(payload))
            .ok_or_else(|| AppError::Internal("batch finished without a response".to_string()))
    }

    async fn defer(&self, operations: Vec<QueuedOperation>) -> Result<BatchOutcome, AppError> {
        let queue = self.classifier.queue();
        let mut ids = Vec::with_capacity(operations.len());
        for operation in operations {
            ids.push(queue.enqueue(operation).await?);
        }
        info!(count = ids.len(), "Batch deferred until the server is reachable");
        Ok(BatchOutcome::Deferred(ids))
    }
}

/// The one attempt that speaks for the whole batch: an expired session
/// first, then any rejection, then a success.
fn representative(attempts: &[(usize, Attempt)]) -> Option<usize> {
    let position = |wanted: fn(&Attempt) -> bool| {
        attempts.iter().position(|(_, attempt)| wanted(attempt))
    };
    position(|attempt| matches!(attempt, Attempt::Rejected(err) if err.is_auth_expired()))
        .or_else(|| position(|attempt| matches!(attempt, Attempt::Rejected(_))))
        .or_else(|| position(|attempt| matches!(attempt, Attempt::Succeeded(_))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::sync_events::SyncEvent;
    use crate::application::services::test_support::{
        MockGateway, RecordingSink, connectivity, memory_queue, work_item_id,
    };
    use crate::domain::entities::{AttachedFile, MediaStage, WorkItem, WorkItemStatus};
    use crate::infrastructure::storage::MemoryKeyValueStore;
    use crate::shared::KeyedLocks;

    fn upload(name: &str) -> QueuedOperation {
        QueuedOperation::UploadWorkItemMedia {
            work_item_id: work_item_id(),
            stage: MediaStage::BeforeWork,
            file: AttachedFile::new(name, format!("/photos/{name}")),
            comment: None,
        }
    }

    fn submitter(gateway: MockGateway) -> BatchSubmitter {
        submitter_with_events(gateway).0
    }

    fn submitter_with_events(gateway: MockGateway) -> (BatchSubmitter, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let queue = memory_queue(
            Arc::new(MemoryKeyValueStore::new()),
            Arc::new(KeyedLocks::new()),
            sink.clone(),
        );
        let submitter = BatchSubmitter::new(
            Arc::new(CallClassifier::new(Arc::new(gateway), queue, sink.clone())),
            4,
        );
        (submitter, sink)
    }

    fn started_item() -> WorkItem {
        let mut item = WorkItem::new(work_item_id(), "Tiling, level 2");
        item.status = WorkItemStatus::Started;
        item
    }

    #[tokio::test]
    async fn one_unreachable_upload_defers_the_whole_batch() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_upload_work_item_media()
            .times(3)
            .returning(|_, _, file, _| {
                if file.file_name == "2.jpg" {
                    Err(connectivity())
                } else {
                    Ok(started_item())
                }
            });
        let submitter = submitter(gateway);
        let batch = vec![upload("1.jpg"), upload("2.jpg"), upload("3.jpg")];

        let outcome = submitter.submit(batch.clone()).await.unwrap();

        let BatchOutcome::Deferred(ids) = outcome else {
            panic!("expected deferred batch, got {outcome:?}");
        };
        assert_eq!(ids.len(), 3);
        let queued: Vec<_> = submitter
            .classifier
            .queue()
            .pending()
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.operation)
            .collect();
        assert_eq!(queued, batch);
    }

    #[tokio::test]
    async fn rejection_fails_the_batch_without_queueing() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_upload_work_item_media()
            .returning(|_, _, file, _| {
                if file.file_name == "3.jpg" {
                    Err(TransportError::Application {
                        status: 413,
                        message: "file too large".into(),
                    })
                } else {
                    Ok(started_item())
                }
            });
        let submitter = submitter(gateway);

        let outcome = submitter
            .submit(vec![upload("1.jpg"), upload("2.jpg"), upload("3.jpg")])
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            BatchOutcome::Failed(TransportError::Application { status: 413, .. })
        ));
        assert!(submitter.classifier.queue().is_empty().await);
    }

    #[tokio::test]
    async fn all_successes_complete_with_a_server_payload() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_upload_work_item_media()
            .times(2)
            .returning(|_, _, _, _| Ok(started_item()));
        let submitter = submitter(gateway);

        let outcome = submitter
            .submit(vec![upload("1.jpg"), upload("2.jpg")])
            .await
            .unwrap();

        assert_eq!(
            outcome,
            BatchOutcome::Completed(RemotePayload::WorkItem(started_item()))
        );
    }

    #[tokio::test]
    async fn queued_work_on_the_target_defers_without_calling() {
        let mut gateway = MockGateway::new();
        gateway.expect_upload_work_item_media().times(0);
        let submitter = submitter(gateway);
        submitter
            .classifier
            .queue()
            .enqueue(upload("earlier.jpg"))
            .await
            .unwrap();

        let outcome = submitter.submit(vec![upload("1.jpg")]).await.unwrap();

        assert!(matches!(outcome, BatchOutcome::Deferred(ref ids) if ids.len() == 1));
        assert_eq!(submitter.classifier.queue().len().await, 2);
    }

    #[tokio::test]
    async fn empty_batches_are_rejected() {
        let submitter = submitter(MockGateway::new());
        assert!(matches!(
            submitter.submit(Vec::new()).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn expired_session_is_reported_once_per_batch() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_upload_work_item_media()
            .times(3)
            .returning(|_, _, _, _| Err(TransportError::AuthExpired("token revoked".into())));
        let (submitter, sink) = submitter_with_events(gateway);

        let outcome = submitter
            .submit(vec![upload("1.jpg"), upload("2.jpg"), upload("3.jpg")])
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            BatchOutcome::Failed(TransportError::AuthExpired(_))
        ));
        assert_eq!(sink.events(), vec![SyncEvent::SessionExpired]);
        assert!(submitter.classifier.queue().is_session_expired());
    }
}
