use tracing::{debug, warn};

use crate::common::{Epoch, EventPosition, PartitionId, RawMessage};
use crate::core::eventhub::client::{EventHubClient, PartitionReceiver, ReceiverOptions};
use crate::errors::ConnectionError;

/// Everything needed to open a receiver on one partition.
#[derive(Debug, Clone)]
pub struct SessionRequest<'a> {
    pub consumer_group: &'a str,
    pub partition: PartitionId,
    pub epoch: Option<Epoch>,
    pub position: EventPosition,
    pub options: ReceiverOptions,
}

/// One live receiver for one partition. A session never outlives the
/// connection attempt that created it.
pub struct ReceiverSession<R: PartitionReceiver> {
    partition: PartitionId,
    receiver: Option<R>,
}

impl<R: PartitionReceiver> ReceiverSession<R> {
    /// Opens a receiver, exclusive when an epoch is given, positioned after
    /// the offset or at the enqueued time of `request.position`.
    pub async fn open<C>(client: &C, request: SessionRequest<'_>) -> Result<Self, ConnectionError>
    where
        C: EventHubClient<Receiver = R>,
    {
        let SessionRequest {
            consumer_group,
            partition,
            epoch,
            position,
            options,
        } = request;

        let receiver = match epoch {
            Some(epoch) => {
                debug!(
                    partition = %partition.padded(),
                    "Create receiver with epoch={epoch} & {position}"
                );
                client
                    .create_epoch_receiver(consumer_group, partition, position, epoch, options)
                    .await?
            }
            None => {
                debug!(partition = %partition.padded(), "Create receiver with {position}");
                client
                    .create_receiver(consumer_group, partition, position, options)
                    .await?
            }
        };

        Ok(Self {
            partition,
            receiver: Some(receiver),
        })
    }

    pub fn is_open(&self) -> bool {
        self.receiver.is_some()
    }

    pub async fn receive(&mut self, max_count: usize) -> Result<Vec<RawMessage>, ConnectionError> {
        match self.receiver.as_mut() {
            Some(receiver) => receiver.receive(max_count).await,
            None => Err(ConnectionError::ReceiverClosed(self.partition)),
        }
    }

    /// Closes the receiver. Errors while closing are logged, not returned,
    /// since the session is being discarded either way.
    pub async fn close(&mut self) {
        let Some(mut receiver) = self.receiver.take() else {
            return;
        };
        if let Err(e) = receiver.close().await {
            warn!(partition = %self.partition.padded(), error = %e, "Error closing receiver");
        }
    }
}
