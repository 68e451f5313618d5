use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Parser;
use once_cell::sync::Lazy;

use crate::codec::RecordEnrichment;
use crate::common::{Epoch, PartitionId};
use crate::constants::{
    DEFAULT_CONSUMER_GROUP, DEFAULT_DOMAIN, DEFAULT_PORT, DEFAULT_RECEIVE_CREDITS,
    DEFAULT_THREAD_WAIT_SEC, RECEIVE_BATCH_SIZE,
};
use crate::core::consumer::ConsumerSettings;
use crate::enums::{CodecKind, DecodeFailurePolicy};
use crate::errors::ConfigError;

pub static APP_CONFIG: Lazy<Config> = Lazy::new(|| {
    dotenvy::dotenv().ok();
    Config::parse()
});

#[derive(Clone, Parser)]
#[command(
    name = "eventhub_consumer",
    version,
    about = "Consume Event Hubs partitions into a single output stream"
)]
pub struct Config {
    /// Shared access key
    #[clap(long, env = "EVENTHUB_KEY", hide_env_values = true)]
    pub key: String,

    /// Shared access key name
    #[clap(long, env = "EVENTHUB_USERNAME")]
    pub username: String,

    #[clap(long, env = "EVENTHUB_NAMESPACE")]
    pub namespace: String,

    #[clap(long, env = "EVENTHUB_DOMAIN", default_value = DEFAULT_DOMAIN)]
    pub domain: String,

    #[clap(long, env = "EVENTHUB_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Number of messages the broker may buffer ahead of consumption
    #[clap(long, env = "EVENTHUB_RECEIVE_CREDITS", default_value_t = DEFAULT_RECEIVE_CREDITS)]
    pub receive_credits: u32,

    #[clap(long, env = "EVENTHUB_NAME")]
    pub eventhub: String,

    /// Number of partitions of the event hub
    #[clap(long, env = "EVENTHUB_PARTITIONS")]
    pub partitions: u32,

    #[clap(long, env = "EVENTHUB_CONSUMER_GROUP", default_value = DEFAULT_CONSUMER_GROUP)]
    pub consumer_group: String,

    /// Enqueued time to start from when no offset is known, defaults to process start
    #[clap(long, env = "EVENTHUB_START_TIMESTAMP_MILLIS")]
    pub start_timestamp_millis: Option<i64>,

    /// Receive timeout and reconnect delay
    #[clap(long, env = "EVENTHUB_THREAD_WAIT_SEC", default_value_t = DEFAULT_THREAD_WAIT_SEC)]
    pub thread_wait_sec: u64,

    /// JSON object mapping partition ids to receiver epochs, e.g. {"0":7}
    #[clap(long, env = "EVENTHUB_PARTITION_EPOCHS", default_value = "{}")]
    pub partition_epochs: PartitionEpochs,

    /// Explicit subset of partitions to consume
    #[clap(long, env = "EVENTHUB_PARTITION_LIST", value_delimiter = ',')]
    pub partition_list: Vec<u32>,

    #[clap(long, env = "EVENTHUB_DECORATE_EVENTS", default_value_t = false)]
    pub decorate_events: bool,

    #[clap(long, env = "EVENTHUB_CODEC", default_value_t = CodecKind::Json)]
    pub codec: CodecKind,

    /// Tags appended to every record
    #[clap(long, env = "EVENTHUB_TAGS", value_delimiter = ',')]
    pub tags: Vec<String>,

    /// name=value pairs set on every record
    #[clap(long, env = "EVENTHUB_ADD_FIELD", value_delimiter = ',', value_parser = parse_field)]
    pub add_field: Vec<(String, String)>,

    #[clap(long, env = "EVENTHUB_DECODE_FAILURE_POLICY", default_value_t = DecodeFailurePolicy::Fail)]
    pub decode_failure_policy: DecodeFailurePolicy,

    #[clap(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("key", &"<redacted>")
            .field("username", &self.username)
            .field("namespace", &self.namespace)
            .field("domain", &self.domain)
            .field("port", &self.port)
            .field("receive_credits", &self.receive_credits)
            .field("eventhub", &self.eventhub)
            .field("partitions", &self.partitions)
            .field("consumer_group", &self.consumer_group)
            .field("start_timestamp_millis", &self.start_timestamp_millis)
            .field("thread_wait_sec", &self.thread_wait_sec)
            .field("partition_epochs", &self.partition_epochs)
            .field("partition_list", &self.partition_list)
            .field("decorate_events", &self.decorate_events)
            .field("codec", &self.codec)
            .field("tags", &self.tags)
            .field("add_field", &self.add_field)
            .field("decode_failure_policy", &self.decode_failure_policy)
            .finish()
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partitions == 0 {
            return Err(ConfigError::NotPositive { name: "partitions" });
        }
        if self.thread_wait_sec == 0 {
            return Err(ConfigError::NotPositive {
                name: "thread_wait_sec",
            });
        }
        if self.receive_credits == 0 {
            return Err(ConfigError::NotPositive {
                name: "receive_credits",
            });
        }

        let consumed: HashSet<PartitionId> = self
            .partition_ids()
            .into_iter()
            .collect();
        for partition in self.partition_epochs.0.keys() {
            if !consumed.contains(partition) {
                tracing::warn!(
                    partition = %partition,
                    "Epoch configured for a partition that is not consumed"
                );
            }
        }

        Ok(())
    }

    /// Partitions to consume: the explicit list when given, otherwise every partition.
    pub fn partition_ids(&self) -> Vec<PartitionId> {
        if self.partition_list.is_empty() {
            return (0..self.partitions).map(PartitionId).collect();
        }

        let mut seen = HashSet::new();
        self.partition_list
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .map(PartitionId)
            .collect()
    }

    /// Partitions paired with the epoch configured for each, if any.
    pub fn partition_plan(&self) -> Vec<(PartitionId, Option<Epoch>)> {
        self.partition_ids()
            .into_iter()
            .map(|partition| (partition, self.partition_epochs.get(partition)))
            .collect()
    }

    pub fn eventhub_config(&self) -> EventHubConfig {
        EventHubConfig {
            namespace: self.namespace.clone(),
            domain: self.domain.clone(),
            port: self.port,
            eventhub: self.eventhub.clone(),
            username: self.username.clone(),
            key: self.key.clone(),
        }
    }

    pub fn consumer_settings(&self) -> Result<ConsumerSettings, ConfigError> {
        let start_millis = self
            .start_timestamp_millis
            .unwrap_or_else(|| Utc::now().timestamp() * 1000);
        let start_time = DateTime::from_timestamp_millis(start_millis)
            .ok_or(ConfigError::StartTimestamp(start_millis))?;
        let wait = Duration::from_secs(self.thread_wait_sec);

        Ok(ConsumerSettings {
            consumer_group: self.consumer_group.clone(),
            start_time,
            receive_timeout: wait,
            retry_interval: wait,
            prefetch_count: self.receive_credits,
            batch_size: RECEIVE_BATCH_SIZE,
            decorate_events: self.decorate_events,
            enrichment: RecordEnrichment {
                tags: self.tags.clone(),
                fields: self.add_field.clone(),
            },
            decode_failure_policy: self.decode_failure_policy,
        })
    }
}

/// Broker connection parameters.
#[derive(Clone)]
pub struct EventHubConfig {
    pub namespace: String,
    pub domain: String,
    pub port: u16,
    pub eventhub: String,
    pub username: String,
    pub key: String,
}

impl EventHubConfig {
    pub fn host(&self) -> String {
        format!("{}.{}", self.namespace, self.domain)
    }

    /// Produce a host:port address of the broker endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host(), self.port)
    }

    pub fn connection_string(&self) -> String {
        format!(
            "Endpoint=sb://{}/;SharedAccessKeyName={};SharedAccessKey={};EntityPath={}",
            self.host(),
            self.username,
            self.key,
            self.eventhub
        )
    }
}

impl fmt::Debug for EventHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHubConfig")
            .field("endpoint", &self.endpoint())
            .field("eventhub", &self.eventhub)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Receiver epochs keyed by partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionEpochs(pub BTreeMap<PartitionId, Epoch>);

impl PartitionEpochs {
    pub fn get(&self, partition: PartitionId) -> Option<Epoch> {
        self.0.get(&partition).copied()
    }
}

impl FromStr for PartitionEpochs {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: String| ConfigError::PartitionEpochs {
            input: s.to_owned(),
            message,
        };

        let raw: BTreeMap<String, i64> =
            serde_json::from_str(s).map_err(|e| invalid(e.to_string()))?;

        let mut epochs = BTreeMap::new();
        for (partition, epoch) in raw {
            let id = partition
                .trim()
                .parse::<u32>()
                .map_err(|_| invalid(format!("{partition:?} is not a partition id")))?;
            epochs.insert(PartitionId(id), Epoch(epoch));
        }

        Ok(PartitionEpochs(epochs))
    }
}

fn parse_field(s: &str) -> Result<(String, String), ConfigError> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_owned(), value.to_owned()))
        }
        _ => Err(ConfigError::AddField(s.to_owned())),
    }
}
