use std::sync::Arc;

use tokio_retry::RetryIf;
use tokio_retry::strategy::FixedInterval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::Codec;
use crate::common::{Epoch, PartitionId, RawMessage};
use crate::constants::LOG_BODY_PREVIEW_CHARS;
use crate::core::consumer::ConsumerSettings;
use crate::core::consumer::position::PositionTracker;
use crate::core::consumer::sink::OutputSink;
use crate::core::eventhub::{EventHubClient, ReceiverOptions, ReceiverSession, SessionRequest};
use crate::enums::DecodeFailurePolicy;
use crate::errors::{ConnectionError, ConsumerError};

/// How a receiving session ended without a worker-fatal error.
enum SessionEnd {
    Stopped,
    Disconnected(ConnectionError),
}

/// Consumes one partition until stopped.
///
/// The worker opens a receiver at the tracked position, polls it in batches,
/// decodes every message and pushes the records to the output queue in
/// delivery order. Connection failures close the receiver and reopen it after
/// a fixed delay, resuming after the last processed offset. Any other failure
/// ends the worker.
pub struct PartitionWorker<C: EventHubClient> {
    partition: PartitionId,
    epoch: Option<Epoch>,
    client: Arc<C>,
    settings: Arc<ConsumerSettings>,
    codec: Arc<dyn Codec>,
    sink: OutputSink,
    position: PositionTracker,
    shutdown: CancellationToken,
}

impl<C: EventHubClient> PartitionWorker<C> {
    pub fn new(
        partition: PartitionId,
        epoch: Option<Epoch>,
        client: Arc<C>,
        settings: Arc<ConsumerSettings>,
        codec: Arc<dyn Codec>,
        sink: OutputSink,
        shutdown: CancellationToken,
    ) -> Self {
        let position = PositionTracker::new(partition, settings.start_time);
        Self {
            partition,
            epoch,
            client,
            settings,
            codec,
            sink,
            position,
            shutdown,
        }
    }

    /// Run until the shutdown token is cancelled, or a failure other than a
    /// connection error occurs.
    pub async fn run(mut self) -> Result<(), ConsumerError> {
        info!(
            partition = %self.partition.padded(),
            epoch = ?self.epoch,
            "Starting partition worker"
        );

        let result = self.consume().await;
        match &result {
            Ok(()) => info!(partition = %self.partition.padded(), "Partition worker stopped"),
            Err(e) => error!(
                partition = %self.partition.padded(),
                last_offset = ?self.position.last_offset(),
                error = ?e,
                "Partition worker failed: {e}"
            ),
        }
        result
    }

    async fn consume(&mut self) -> Result<(), ConsumerError> {
        loop {
            if self.shutdown.is_cancelled() {
                return Ok(());
            }

            let Some(mut session) = self.open_session().await else {
                return Ok(());
            };

            let end = self.receive_until_disconnect(&mut session).await;
            session.close().await;
            let error = match end? {
                SessionEnd::Stopped => return Ok(()),
                SessionEnd::Disconnected(e) => e,
            };

            warn!(
                partition = %self.partition.padded(),
                error = %error,
                "Resetting connection"
            );
            if !self.wait_before_reconnect().await {
                return Ok(());
            }
        }
    }

    /// Open a receiver at the tracked position, retrying every connection
    /// failure after the retry interval. Returns `None` once shutdown is requested.
    async fn open_session(&self) -> Option<ReceiverSession<C::Receiver>> {
        let position = self.position.current();
        let options = ReceiverOptions {
            receive_timeout: self.settings.receive_timeout,
            prefetch_count: self.settings.prefetch_count,
        };

        let open = || {
            let request = SessionRequest {
                consumer_group: &self.settings.consumer_group,
                partition: self.partition,
                epoch: self.epoch,
                position: position.clone(),
                options,
            };
            ReceiverSession::open(self.client.as_ref(), request)
        };
        let should_retry = |error: &ConnectionError| {
            warn!(
                partition = %self.partition.padded(),
                error = %error,
                "Resetting connection"
            );
            !self.shutdown.is_cancelled()
        };

        let strategy = FixedInterval::new(self.settings.retry_interval);
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            opened = RetryIf::spawn(strategy, open, should_retry) => opened.ok(),
        }
    }

    async fn receive_until_disconnect(
        &mut self,
        session: &mut ReceiverSession<C::Receiver>,
    ) -> Result<SessionEnd, ConsumerError> {
        loop {
            let received = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ok(SessionEnd::Stopped),
                received = session.receive(self.settings.batch_size) => received,
            };

            let messages = match received {
                Ok(messages) => messages,
                Err(e) => return Ok(SessionEnd::Disconnected(e)),
            };

            if messages.is_empty() {
                debug!(partition = %self.partition.padded(), "No message");
                continue;
            }

            for message in messages {
                // Unprocessed messages are redelivered from the tracked position.
                if self.shutdown.is_cancelled() {
                    return Ok(SessionEnd::Stopped);
                }
                self.process_message(message)?;
            }
        }
    }

    fn process_message(&mut self, message: RawMessage) -> Result<(), ConsumerError> {
        let properties = &message.properties;
        debug!(
            partition = %self.partition.padded(),
            "Event: {}... Offset: {} Time: {} Sequence: {}",
            message.body_preview(LOG_BODY_PREVIEW_CHARS),
            message.offset(),
            properties.enqueued_time,
            properties.sequence_number
        );

        let records = match self.codec.decode(&message.body) {
            Ok(records) => records,
            Err(source) => match self.settings.decode_failure_policy {
                DecodeFailurePolicy::Fail => {
                    return Err(ConsumerError::Decode {
                        partition: self.partition,
                        offset: properties.offset.clone(),
                        source,
                    });
                }
                DecodeFailurePolicy::Skip => {
                    warn!(
                        partition = %self.partition.padded(),
                        offset = %properties.offset,
                        error = %source,
                        "Skipping message that could not be decoded"
                    );
                    self.position.advance(message.properties.offset);
                    return Ok(());
                }
            },
        };

        for mut record in records {
            self.settings.enrichment.apply(&mut record);
            if self.settings.decorate_events {
                record.decorate(self.partition, properties);
            }
            self.sink
                .push(record)
                .map_err(|_| ConsumerError::OutputClosed {
                    partition: self.partition,
                })?;
        }

        self.position.advance(message.properties.offset);
        Ok(())
    }

    /// Sleep for the retry interval. Returns `false` if shutdown was requested meanwhile.
    async fn wait_before_reconnect(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.settings.retry_interval) => true,
        }
    }
}
