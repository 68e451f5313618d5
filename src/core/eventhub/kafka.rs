//! Event hub client speaking the Kafka protocol.
//!
//! Event Hubs exposes a Kafka compatible endpoint on every namespace. This
//! client connects to it with the namespace connection string, assigns a
//! single partition per receiver and positions it manually, so no offsets are
//! committed to the broker.
//!
//! Manually assigned consumers never join a consumer group, so the Kafka
//! surface has nothing that fences an older reader. Epoch receivers opened
//! through this client are not exclusive.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::DateTime;
use futures::FutureExt;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::BorrowedMessage;
use rdkafka::{ClientConfig, Message, Offset, TopicPartitionList};
use tracing::{debug, warn};

use crate::common::{Epoch, EventOffset, EventPosition, PartitionId, RawMessage, SystemProperties};
use crate::config::EventHubConfig;
use crate::constants::{KAFKA_CONNECTION_STRING_USER, USER_AGENT};
use crate::core::eventhub::client::{EventHubClient, PartitionReceiver, ReceiverOptions};
use crate::errors::ConnectionError;

/// Timeout for broker metadata and offset lookups while opening a receiver.
const METADATA_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const SESSION_TIMEOUT_MS: &str = "30000";

pub struct KafkaEventHubClient {
    eventhub: String,
    base_config: ClientConfig,
}

impl KafkaEventHubClient {
    pub fn new(config: &EventHubConfig) -> Self {
        let mut base_config = ClientConfig::new();
        base_config
            .set("bootstrap.servers", config.endpoint())
            .set("client.id", USER_AGENT)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", SESSION_TIMEOUT_MS);
        Self::configure_sasl(&mut base_config, config);

        Self {
            eventhub: config.eventhub.clone(),
            base_config,
        }
    }

    fn configure_sasl(client_config: &mut ClientConfig, config: &EventHubConfig) {
        client_config
            .set("security.protocol", "SASL_SSL")
            .set("sasl.mechanism", "PLAIN")
            .set("sasl.username", KAFKA_CONNECTION_STRING_USER)
            .set("sasl.password", config.connection_string());
    }

    fn consumer_config(&self, consumer_group: &str, options: ReceiverOptions) -> ClientConfig {
        let mut config = self.base_config.clone();
        config
            .set("group.id", consumer_group)
            .set("queued.min.messages", options.prefetch_count.to_string());
        config
    }

    async fn open(
        &self,
        consumer_group: &str,
        partition: PartitionId,
        position: EventPosition,
        options: ReceiverOptions,
    ) -> Result<KafkaPartitionReceiver, ConnectionError> {
        let config = self.consumer_config(consumer_group, options);
        let topic = self.eventhub.clone();

        // Metadata and offset lookups block on broker round trips.
        let consumer = tokio::task::spawn_blocking(move || {
            assign_partition(&config, &topic, partition, &position)
        })
        .await??;

        Ok(KafkaPartitionReceiver {
            partition,
            consumer: Some(consumer),
            receive_timeout: options.receive_timeout,
        })
    }
}

#[async_trait]
impl EventHubClient for KafkaEventHubClient {
    type Receiver = KafkaPartitionReceiver;

    async fn create_receiver(
        &self,
        consumer_group: &str,
        partition: PartitionId,
        position: EventPosition,
        options: ReceiverOptions,
    ) -> Result<Self::Receiver, ConnectionError> {
        self.open(consumer_group, partition, position, options).await
    }

    async fn create_epoch_receiver(
        &self,
        consumer_group: &str,
        partition: PartitionId,
        position: EventPosition,
        epoch: Epoch,
        options: ReceiverOptions,
    ) -> Result<Self::Receiver, ConnectionError> {
        warn!(
            partition = %partition.padded(),
            %epoch,
            "Epochs are not enforced on the Kafka endpoint, opening a shared receiver"
        );
        self.open(consumer_group, partition, position, options).await
    }
}

fn assign_partition(
    config: &ClientConfig,
    topic: &str,
    partition: PartitionId,
    position: &EventPosition,
) -> Result<StreamConsumer, ConnectionError> {
    let kafka_id = kafka_partition(partition)?;
    let consumer: StreamConsumer = config.create().map_err(ConnectionError::CreateClient)?;

    let metadata = consumer
        .fetch_metadata(Some(topic), METADATA_FETCH_TIMEOUT)
        .map_err(classify)?;
    let known = metadata
        .topics()
        .iter()
        .flat_map(|t| t.partitions())
        .any(|p| p.id() == kafka_id);
    if !known {
        return Err(ConnectionError::ResolvePosition {
            partition,
            message: format!("event hub {topic} has no partition {partition}"),
        });
    }

    let offset = resolve_offset(&consumer, topic, partition, kafka_id, position)?;
    debug!(partition = %partition.padded(), ?offset, "Assigning partition");

    let mut tpl = TopicPartitionList::new();
    tpl.add_partition_offset(topic, kafka_id, offset)?;
    consumer.assign(&tpl).map_err(classify)?;

    Ok(consumer)
}

fn resolve_offset(
    consumer: &StreamConsumer,
    topic: &str,
    partition: PartitionId,
    kafka_id: i32,
    position: &EventPosition,
) -> Result<Offset, ConnectionError> {
    match position {
        EventPosition::Offset(offset) => {
            let last = offset
                .as_number()
                .ok_or_else(|| ConnectionError::ResolvePosition {
                    partition,
                    message: format!("offset {offset} is not numeric"),
                })?;
            Ok(Offset::Offset(last + 1))
        }
        EventPosition::EnqueuedTime(time) => {
            let mut query = TopicPartitionList::new();
            query.add_partition_offset(topic, kafka_id, Offset::Offset(time.timestamp_millis()))?;
            let resolved = consumer
                .offsets_for_times(query, METADATA_FETCH_TIMEOUT)
                .map_err(classify)?;
            let element = resolved
                .find_partition(topic, kafka_id)
                .ok_or_else(|| ConnectionError::ResolvePosition {
                    partition,
                    message: "no offset returned for enqueued time".to_owned(),
                })?;
            element.error()?;
            Ok(element.offset())
        }
    }
}

/// Map broker errors raised while opening onto the connection taxonomy.
fn classify(error: KafkaError) -> ConnectionError {
    match error.rdkafka_error_code() {
        Some(RDKafkaErrorCode::Authentication | RDKafkaErrorCode::SaslAuthenticationFailed) => {
            ConnectionError::Authentication(error.to_string())
        }
        Some(
            RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::OperationTimedOut
            | RDKafkaErrorCode::Resolve,
        ) => ConnectionError::Unreachable(error.to_string()),
        _ => ConnectionError::Kafka(error),
    }
}

/// rdkafka addresses partitions with an `i32`.
fn kafka_partition(partition: PartitionId) -> Result<i32, ConnectionError> {
    i32::try_from(partition.0).map_err(|_| ConnectionError::ResolvePosition {
        partition,
        message: "partition id is out of range for the Kafka protocol".to_owned(),
    })
}

/// Receiver over one assigned partition.
pub struct KafkaPartitionReceiver {
    partition: PartitionId,
    consumer: Option<StreamConsumer>,
    receive_timeout: Duration,
}

impl KafkaPartitionReceiver {
    fn to_raw_message(message: &BorrowedMessage<'_>) -> RawMessage {
        let offset = message.offset();
        RawMessage {
            body: message
                .payload()
                .map(Bytes::copy_from_slice)
                .unwrap_or_default(),
            properties: SystemProperties {
                offset: EventOffset::from(offset),
                enqueued_time: message
                    .timestamp()
                    .to_millis()
                    .and_then(DateTime::from_timestamp_millis)
                    .unwrap_or_default(),
                // The Kafka surface reports the sequence number as the offset.
                sequence_number: offset,
                partition_key: message
                    .key()
                    .map(|key| String::from_utf8_lossy(key).into_owned()),
            },
        }
    }

    fn receive_error(&self, source: KafkaError) -> ConnectionError {
        ConnectionError::Receive {
            partition: self.partition,
            source,
        }
    }
}

#[async_trait]
impl PartitionReceiver for KafkaPartitionReceiver {
    async fn receive(&mut self, max_count: usize) -> Result<Vec<RawMessage>, ConnectionError> {
        let consumer = self
            .consumer
            .as_ref()
            .ok_or(ConnectionError::ReceiverClosed(self.partition))?;

        let first = match tokio::time::timeout(self.receive_timeout, consumer.recv()).await {
            Err(_) => return Ok(Vec::new()),
            Ok(Err(e)) => return Err(self.receive_error(e)),
            Ok(Ok(message)) => Self::to_raw_message(&message),
        };

        let mut batch = Vec::with_capacity(max_count);
        batch.push(first);

        // Drain what is already buffered without waiting again.
        while batch.len() < max_count {
            match consumer.recv().now_or_never() {
                Some(Ok(message)) => batch.push(Self::to_raw_message(&message)),
                Some(Err(e)) => return Err(self.receive_error(e)),
                None => break,
            }
        }

        Ok(batch)
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        let Some(consumer) = self.consumer.take() else {
            return Ok(());
        };
        consumer.unassign()?;
        // Dropping the consumer closes its broker connections, which can block.
        tokio::task::spawn_blocking(move || drop(consumer)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eventhub_config() -> EventHubConfig {
        EventHubConfig {
            namespace: "contoso".to_owned(),
            domain: "servicebus.windows.net".to_owned(),
            port: 9093,
            eventhub: "telemetry".to_owned(),
            username: "listen".to_owned(),
            key: "secret".to_owned(),
        }
    }

    fn options() -> ReceiverOptions {
        ReceiverOptions {
            receive_timeout: Duration::from_secs(5),
            prefetch_count: 250,
        }
    }

    #[test]
    fn test_consumer_config() {
        let client = KafkaEventHubClient::new(&eventhub_config());

        let config = client.consumer_config("$default", options());

        assert_eq!(
            config.get("bootstrap.servers"),
            Some("contoso.servicebus.windows.net:9093")
        );
        assert_eq!(config.get("group.id"), Some("$default"));
        assert_eq!(config.get("queued.min.messages"), Some("250"));
        assert_eq!(config.get("sasl.username"), Some("$ConnectionString"));
        assert_eq!(config.get("security.protocol"), Some("SASL_SSL"));
        assert_eq!(config.get("enable.auto.commit"), Some("false"));
        assert_eq!(config.get("client.id"), Some(USER_AGENT));
        assert!(
            config
                .get("sasl.password")
                .unwrap()
                .starts_with("Endpoint=sb://contoso.servicebus.windows.net/")
        );
    }

    #[test]
    fn test_no_group_membership_is_claimed() {
        let client = KafkaEventHubClient::new(&eventhub_config());

        let config = client.consumer_config("$default", options());

        // Assigned consumers never join the group, so a static member id would
        // promise fencing that never happens.
        assert_eq!(config.get("group.instance.id"), None);
    }

    #[test]
    fn test_classify_errors() {
        let auth = KafkaError::MetadataFetch(RDKafkaErrorCode::SaslAuthenticationFailed);
        assert!(matches!(classify(auth), ConnectionError::Authentication(_)));

        let down = KafkaError::MetadataFetch(RDKafkaErrorCode::AllBrokersDown);
        assert!(matches!(classify(down), ConnectionError::Unreachable(_)));

        let fenced = KafkaError::MetadataFetch(RDKafkaErrorCode::FencedInstanceId);
        assert!(matches!(classify(fenced), ConnectionError::Kafka(_)));
    }

    #[test]
    fn test_partition_id_must_fit_kafka_range() {
        assert_eq!(kafka_partition(PartitionId(31)).unwrap(), 31);
        assert_eq!(kafka_partition(PartitionId(i32::MAX as u32)).unwrap(), i32::MAX);

        let too_large = PartitionId(i32::MAX as u32 + 1);
        assert!(matches!(
            kafka_partition(too_large),
            Err(ConnectionError::ResolvePosition { partition, .. }) if partition == too_large
        ));
    }
}
