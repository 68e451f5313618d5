pub mod client;
pub mod kafka;
pub mod session;

pub use client::{EventHubClient, PartitionReceiver, ReceiverOptions};
pub use kafka::{KafkaEventHubClient, KafkaPartitionReceiver};
pub use session::{ReceiverSession, SessionRequest};
