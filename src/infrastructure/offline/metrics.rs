use crate::application::services::mutation_queue::{ReplayReport, ReplayStop};
use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Replayed,
    Dropped,
    Deferred,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplayMetricsSnapshot {
    pub total_replayed: u64,
    pub total_dropped: u64,
    pub total_deferred: u64,
    pub total_passes: u64,
    pub consecutive_stopped_passes: u64,
    pub last_pass_ms: Option<u64>,
    pub last_stop: Option<ReplayStop>,
    pub last_remaining: Option<u64>,
    pub last_dropped_kind: Option<String>,
}

#[derive(Default, Clone)]
struct LastPassMetadata {
    stop: Option<ReplayStop>,
    remaining: Option<u64>,
    dropped_kind: Option<String>,
}

/// Counters for queue replay, owned by the queue instance.
pub struct ReplayMetrics {
    replayed: AtomicU64,
    dropped: AtomicU64,
    deferred: AtomicU64,
    passes: AtomicU64,
    consecutive_stopped: AtomicU64,
    last_pass_ms: AtomicU64,
    metadata: Mutex<LastPassMetadata>,
}

impl Default for ReplayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayMetrics {
    pub fn new() -> Self {
        Self {
            replayed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            deferred: AtomicU64::new(0),
            passes: AtomicU64::new(0),
            consecutive_stopped: AtomicU64::new(0),
            last_pass_ms: AtomicU64::new(0),
            metadata: Mutex::new(LastPassMetadata::default()),
        }
    }

    pub fn record(&self, outcome: RecordOutcome, kind: &str) {
        match outcome {
            RecordOutcome::Replayed => {
                self.replayed.fetch_add(1, Ordering::Relaxed);
            }
            RecordOutcome::Dropped => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut guard) = self.metadata.lock() {
                    guard.dropped_kind = Some(kind.to_string());
                }
            }
            RecordOutcome::Deferred => {
                self.deferred.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_pass(&self, report: &ReplayReport) {
        if report.skipped {
            return;
        }
        self.passes.fetch_add(1, Ordering::Relaxed);
        self.last_pass_ms.store(current_unix_ms(), Ordering::Relaxed);
        if report.stopped.is_some() {
            self.consecutive_stopped.fetch_add(1, Ordering::Relaxed);
        } else {
            self.consecutive_stopped.store(0, Ordering::Relaxed);
        }

        if let Ok(mut guard) = self.metadata.lock() {
            guard.stop = report.stopped;
            guard.remaining = Some(report.remaining as u64);
        }
    }

    pub fn snapshot(&self) -> ReplayMetricsSnapshot {
        let metadata = self
            .metadata
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default();

        ReplayMetricsSnapshot {
            total_replayed: self.replayed.load(Ordering::Relaxed),
            total_dropped: self.dropped.load(Ordering::Relaxed),
            total_deferred: self.deferred.load(Ordering::Relaxed),
            total_passes: self.passes.load(Ordering::Relaxed),
            consecutive_stopped_passes: self.consecutive_stopped.load(Ordering::Relaxed),
            last_pass_ms: to_option(self.last_pass_ms.load(Ordering::Relaxed)),
            last_stop: metadata.stop,
            last_remaining: metadata.remaining,
            last_dropped_kind: metadata.dropped_kind,
        }
    }
}

fn to_option(value: u64) -> Option<u64> {
    if value == 0 { None } else { Some(value) }
}

fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
