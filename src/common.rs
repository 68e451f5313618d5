use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of one partition of an event hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(pub u32);

impl PartitionId {
    /// Zero padded form used as a log prefix, e.g. `03`.
    pub fn padded(&self) -> String {
        format!("{:02}", self.0)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PartitionId {
    fn from(value: u32) -> Self {
        PartitionId(value)
    }
}

/// Exclusive-consumer ownership token for a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epoch(pub i64);

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broker assigned marker of a message's position in a partition.
///
/// The token is opaque to the consumer. Event Hubs hands out numeric offsets,
/// which is what [`EventOffset::is_after`] relies on for ordering checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventOffset(String);

impl EventOffset {
    pub fn new(token: impl Into<String>) -> Self {
        EventOffset(token.into())
    }

    pub fn as_number(&self) -> Option<i64> {
        self.0.parse().ok()
    }

    /// Whether `self` lies strictly after `other` in broker order.
    /// Returns `None` when either token is not numeric.
    pub fn is_after(&self, other: &EventOffset) -> Option<bool> {
        Some(self.as_number()? > other.as_number()?)
    }
}

impl fmt::Display for EventOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for EventOffset {
    fn from(value: i64) -> Self {
        EventOffset(value.to_string())
    }
}

impl From<&str> for EventOffset {
    fn from(value: &str) -> Self {
        EventOffset(value.to_owned())
    }
}

/// Point in a partition from which a receiver starts delivering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPosition {
    /// Resume strictly after the given offset.
    Offset(EventOffset),
    /// Start with the first message enqueued at or after the given time.
    EnqueuedTime(DateTime<Utc>),
}

impl fmt::Display for EventPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventPosition::Offset(offset) => write!(f, "offset > {offset}"),
            EventPosition::EnqueuedTime(time) => {
                write!(f, "timestamp > {}", time.timestamp_millis())
            }
        }
    }
}

/// Broker supplied properties of a received message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemProperties {
    pub offset: EventOffset,
    pub enqueued_time: DateTime<Utc>,
    pub sequence_number: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
}

impl fmt::Display for SystemProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}

/// A message as delivered by a partition receiver.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub body: Bytes,
    pub properties: SystemProperties,
}

impl RawMessage {
    pub fn offset(&self) -> &EventOffset {
        &self.properties.offset
    }

    /// Leading characters of the body, for log output.
    pub fn body_preview(&self, max_chars: usize) -> String {
        String::from_utf8_lossy(&self.body)
            .chars()
            .take(max_chars)
            .collect()
    }
}
