pub mod metrics;

pub use metrics::{RecordOutcome, ReplayMetrics, ReplayMetricsSnapshot};
