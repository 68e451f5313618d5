//! Scripted in-memory event hub used by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use eventhub_partition_consumer::codec::RecordEnrichment;
use eventhub_partition_consumer::common::{
    Epoch, EventOffset, EventPosition, PartitionId, RawMessage, SystemProperties,
};
use eventhub_partition_consumer::enums::DecodeFailurePolicy;
use eventhub_partition_consumer::errors::ConnectionError;
use eventhub_partition_consumer::{
    ConsumerSettings, EventHubClient, PartitionReceiver, ReceiverOptions,
};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn start_time() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
}

pub fn settings() -> ConsumerSettings {
    ConsumerSettings {
        consumer_group: "$default".to_owned(),
        start_time: start_time(),
        receive_timeout: WAIT,
        retry_interval: WAIT,
        prefetch_count: 999,
        batch_size: 10,
        decorate_events: false,
        enrichment: RecordEnrichment::default(),
        decode_failure_policy: DecodeFailurePolicy::Fail,
    }
}

pub fn message(offset: i64, body: &str) -> RawMessage {
    RawMessage {
        body: Bytes::copy_from_slice(body.as_bytes()),
        properties: SystemProperties {
            offset: EventOffset::from(offset),
            enqueued_time: start_time() + chrono::Duration::seconds(offset),
            sequence_number: offset,
            partition_key: None,
        },
    }
}

/// What a receiver does on one `receive` call.
pub enum Step {
    Deliver(Vec<RawMessage>),
    Disconnect,
    /// Never returns; only a shutdown gets the worker out.
    Block,
}

/// Outcome of one attempt to open a receiver.
pub enum Connect {
    Refuse,
    Accept(Vec<Step>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenCall {
    pub partition: PartitionId,
    pub epoch: Option<Epoch>,
    pub position: EventPosition,
    pub options: ReceiverOptions,
    pub at: Instant,
}

#[derive(Default)]
struct HubState {
    scripts: HashMap<PartitionId, VecDeque<Connect>>,
    opens: Vec<OpenCall>,
    receives: HashMap<PartitionId, usize>,
    closes: HashMap<PartitionId, usize>,
}

/// Partitions without a script, or whose script ran out, accept every open
/// and then stay idle.
#[derive(Clone, Default)]
pub struct ScriptedHub {
    state: Arc<Mutex<HubState>>,
}

impl ScriptedHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, partition: u32, connects: Vec<Connect>) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(PartitionId(partition), connects.into());
    }

    pub fn opens(&self) -> Vec<OpenCall> {
        self.state.lock().unwrap().opens.clone()
    }

    pub fn opens_for(&self, partition: u32) -> Vec<OpenCall> {
        self.opens()
            .into_iter()
            .filter(|call| call.partition == PartitionId(partition))
            .collect()
    }

    pub fn receive_calls(&self, partition: u32) -> usize {
        let state = self.state.lock().unwrap();
        state.receives.get(&PartitionId(partition)).copied().unwrap_or(0)
    }

    pub fn closes(&self, partition: u32) -> usize {
        let state = self.state.lock().unwrap();
        state.closes.get(&PartitionId(partition)).copied().unwrap_or(0)
    }

    fn open(
        &self,
        partition: PartitionId,
        epoch: Option<Epoch>,
        position: EventPosition,
        options: ReceiverOptions,
    ) -> Result<ScriptedReceiver, ConnectionError> {
        let mut state = self.state.lock().unwrap();
        state.opens.push(OpenCall {
            partition,
            epoch,
            position,
            options,
            at: Instant::now(),
        });

        let next = state
            .scripts
            .get_mut(&partition)
            .and_then(|script| script.pop_front())
            .unwrap_or(Connect::Accept(Vec::new()));

        match next {
            Connect::Refuse => Err(ConnectionError::Unreachable("scripted refusal".to_owned())),
            Connect::Accept(steps) => Ok(ScriptedReceiver {
                partition,
                steps: steps.into(),
                receive_timeout: options.receive_timeout,
                state: self.state.clone(),
            }),
        }
    }
}

#[async_trait]
impl EventHubClient for ScriptedHub {
    type Receiver = ScriptedReceiver;

    async fn create_receiver(
        &self,
        _consumer_group: &str,
        partition: PartitionId,
        position: EventPosition,
        options: ReceiverOptions,
    ) -> Result<Self::Receiver, ConnectionError> {
        self.open(partition, None, position, options)
    }

    async fn create_epoch_receiver(
        &self,
        _consumer_group: &str,
        partition: PartitionId,
        position: EventPosition,
        epoch: Epoch,
        options: ReceiverOptions,
    ) -> Result<Self::Receiver, ConnectionError> {
        self.open(partition, Some(epoch), position, options)
    }
}

pub struct ScriptedReceiver {
    partition: PartitionId,
    steps: VecDeque<Step>,
    receive_timeout: Duration,
    state: Arc<Mutex<HubState>>,
}

#[async_trait]
impl PartitionReceiver for ScriptedReceiver {
    async fn receive(&mut self, max_count: usize) -> Result<Vec<RawMessage>, ConnectionError> {
        *self
            .state
            .lock()
            .unwrap()
            .receives
            .entry(self.partition)
            .or_default() += 1;

        match self.steps.pop_front() {
            Some(Step::Deliver(messages)) => {
                assert!(messages.len() <= max_count, "scripted batch too large");
                Ok(messages)
            }
            Some(Step::Disconnect) => Err(ConnectionError::Unreachable(
                "scripted disconnect".to_owned(),
            )),
            Some(Step::Block) => futures::future::pending().await,
            None => {
                tokio::time::sleep(self.receive_timeout).await;
                Ok(Vec::new())
            }
        }
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        *self
            .state
            .lock()
            .unwrap()
            .closes
            .entry(self.partition)
            .or_default() += 1;
        Ok(())
    }
}

/// Poll `condition` on the (usually paused) tokio clock until it holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
