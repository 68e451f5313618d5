use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::codec::Codec;
use crate::common::{Epoch, PartitionId};
use crate::core::consumer::ConsumerSettings;
use crate::core::consumer::sink::OutputSink;
use crate::core::consumer::worker::PartitionWorker;
use crate::core::eventhub::EventHubClient;
use crate::errors::ConsumerError;

/// Runs one [`PartitionWorker`] per configured partition and waits for all of them.
pub struct Coordinator<C: EventHubClient> {
    client: Arc<C>,
    settings: Arc<ConsumerSettings>,
    codec: Arc<dyn Codec>,
    partitions: Vec<(PartitionId, Option<Epoch>)>,
    shutdown: CancellationToken,
}

impl<C: EventHubClient> Coordinator<C> {
    /// `partitions` pairs every partition to consume with its receiver epoch, if any.
    pub fn new(
        client: Arc<C>,
        settings: ConsumerSettings,
        codec: Arc<dyn Codec>,
        partitions: Vec<(PartitionId, Option<Epoch>)>,
    ) -> Self {
        Self {
            client,
            settings: Arc::new(settings),
            codec,
            partitions,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops every worker when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Consume every partition into `sink` until shutdown.
    ///
    /// Returns once all workers have stopped. If a worker fails, the others are
    /// asked to stop and the first failure is returned after they finish.
    pub async fn run(&self, sink: OutputSink) -> Result<(), ConsumerError> {
        let stop = self.shutdown.child_token();

        let mut workers: FuturesUnordered<_> = self
            .partitions
            .iter()
            .map(|&(partition, epoch)| {
                let worker = PartitionWorker::new(
                    partition,
                    epoch,
                    self.client.clone(),
                    self.settings.clone(),
                    self.codec.clone(),
                    sink.clone(),
                    stop.clone(),
                );
                let handle = tokio::spawn(worker.run());
                async move { (partition, handle.await) }
            })
            .collect();
        drop(sink);

        info!(workers = workers.len(), "Started partition workers");

        let mut first_error = None;
        while let Some((partition, joined)) = workers.next().await {
            let result = joined.unwrap_or_else(|e| {
                error!(partition = %partition.padded(), error = %e, "Partition worker panicked");
                Err(ConsumerError::WorkerPanicked { partition })
            });

            if let Err(e) = result {
                if first_error.is_none() {
                    warn!(
                        partition = %partition.padded(),
                        "Stopping remaining partition workers after failure"
                    );
                    stop.cancel();
                    first_error = Some(e);
                }
            }
        }

        info!("All partition workers stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
