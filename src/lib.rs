//! Ordered, per-partition consumption of an Azure Event Hub into a single
//! output queue.
//!
//! A [`Coordinator`] runs one [`PartitionWorker`] per partition. Each worker
//! owns its receiver, decodes messages with a [`Codec`](codec::Codec), pushes
//! the records to a shared [`OutputSink`] and reconnects after transient
//! broker failures, resuming from the last processed offset.

pub mod codec;
pub mod common;
pub mod config;
pub mod constants;
pub mod core;
pub mod enums;
pub mod errors;
pub mod utils;

pub use crate::core::consumer::{
    ConsumerSettings, Coordinator, OutputSink, OutputStream, PartitionWorker, PositionTracker,
    output_queue,
};
pub use crate::core::eventhub::{
    EventHubClient, KafkaEventHubClient, PartitionReceiver, ReceiverOptions, ReceiverSession,
};
