use crate::common::{EventOffset, PartitionId};

/// Failures talking to the broker. A partition worker retries these
/// indefinitely after a fixed delay.
#[derive(thiserror::Error, Debug)]
pub enum ConnectionError {
    #[error("failed to create event hub client: {0}")]
    CreateClient(#[source] rdkafka::error::KafkaError),

    #[error("authentication rejected: {0}")]
    Authentication(String),

    #[error("event hub endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("could not resolve start position for partition {partition}: {message}")]
    ResolvePosition {
        partition: PartitionId,
        message: String,
    },

    /// Only raised by clients that enforce receiver epochs.
    #[error("epoch {epoch} rejected for partition {partition}, another receiver holds a higher or equal epoch")]
    EpochConflict { partition: PartitionId, epoch: i64 },

    #[error("error receiving from partition {partition}: {source}")]
    Receive {
        partition: PartitionId,
        #[source]
        source: rdkafka::error::KafkaError,
    },

    #[error("receiver for partition {0} is closed")]
    ReceiverClosed(PartitionId),

    #[error("{0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("blocking broker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Failures decoding a message payload.
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures that terminate a partition worker.
#[derive(thiserror::Error, Debug)]
pub enum ConsumerError {
    #[error("failed to decode message at offset {offset} on partition {partition}: {source}")]
    Decode {
        partition: PartitionId,
        offset: EventOffset,
        #[source]
        source: CodecError,
    },

    #[error("output queue closed while partition {partition} was emitting")]
    OutputClosed { partition: PartitionId },

    #[error("worker for partition {partition} panicked")]
    WorkerPanicked { partition: PartitionId },
}

/// Invalid process configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be greater than 0")]
    NotPositive { name: &'static str },

    #[error("invalid partition epochs {input:?}: {message}")]
    PartitionEpochs { input: String, message: String },

    #[error("invalid field {0:?}, expected name=value")]
    AddField(String),

    #[error("start timestamp {0} is out of range")]
    StartTimestamp(i64),
}
