//! Partition consumer engine: one worker per partition feeding a shared
//! output queue, started and joined by a [`Coordinator`].

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::codec::RecordEnrichment;
use crate::enums::DecodeFailurePolicy;

pub mod coordinator;
pub mod position;
pub mod sink;
pub mod worker;

pub use coordinator::Coordinator;
pub use position::PositionTracker;
pub use sink::{OutputSink, OutputStream, output_queue};
pub use worker::PartitionWorker;

/// Parameters shared by every partition worker.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub consumer_group: String,
    /// Where to start reading a partition before any offset is known.
    pub start_time: DateTime<Utc>,
    pub receive_timeout: Duration,
    /// Fixed delay before reopening a receiver after a connection failure.
    pub retry_interval: Duration,
    pub prefetch_count: u32,
    /// Maximum number of messages requested per poll.
    pub batch_size: usize,
    pub decorate_events: bool,
    pub enrichment: RecordEnrichment,
    pub decode_failure_policy: DecodeFailurePolicy,
}
