pub mod consumer;
pub mod eventhub;
