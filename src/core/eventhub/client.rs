use std::time::Duration;

use async_trait::async_trait;

use crate::common::{Epoch, EventPosition, PartitionId, RawMessage};
use crate::errors::ConnectionError;

/// Settings applied to a receiver once it is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverOptions {
    /// How long a poll waits before returning no messages.
    pub receive_timeout: Duration,
    /// How many messages the broker may buffer ahead of consumption.
    pub prefetch_count: u32,
}

/// Connection to an event hub, shared by every partition worker.
#[async_trait]
pub trait EventHubClient: Send + Sync + 'static {
    type Receiver: PartitionReceiver;

    /// Opens a non-exclusive receiver on one partition.
    async fn create_receiver(
        &self,
        consumer_group: &str,
        partition: PartitionId,
        position: EventPosition,
        options: ReceiverOptions,
    ) -> Result<Self::Receiver, ConnectionError>;

    /// Opens a receiver that claims exclusive ownership of the partition with `epoch`.
    /// Clients that enforce epochs fail with [`ConnectionError::EpochConflict`] when a
    /// receiver with a higher or equal epoch already owns it. Clients that cannot
    /// enforce them open a shared receiver and say so in the log.
    async fn create_epoch_receiver(
        &self,
        consumer_group: &str,
        partition: PartitionId,
        position: EventPosition,
        epoch: Epoch,
        options: ReceiverOptions,
    ) -> Result<Self::Receiver, ConnectionError>;
}

/// An open receiver on a single partition.
#[async_trait]
pub trait PartitionReceiver: Send + 'static {
    /// Wait up to the receive timeout for at most `max_count` messages.
    /// An empty batch means nothing arrived in time.
    async fn receive(&mut self, max_count: usize) -> Result<Vec<RawMessage>, ConnectionError>;

    /// Release the underlying connection. Calling it twice is harmless.
    async fn close(&mut self) -> Result<(), ConnectionError>;
}
