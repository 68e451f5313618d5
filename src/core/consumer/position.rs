use chrono::{DateTime, Utc};
use tracing::warn;

use crate::common::{EventOffset, EventPosition, PartitionId};

/// In-memory read position of one partition.
///
/// Starts at the configured enqueued time and switches to offsets for good
/// once the first message has been processed. Nothing is persisted, so a
/// restarted process begins again from the configured time.
#[derive(Debug, Clone)]
pub struct PositionTracker {
    partition: PartitionId,
    start_time: DateTime<Utc>,
    last_offset: Option<EventOffset>,
}

impl PositionTracker {
    pub fn new(partition: PartitionId, start_time: DateTime<Utc>) -> Self {
        Self {
            partition,
            start_time,
            last_offset: None,
        }
    }

    /// Position a new receiver should start from.
    pub fn current(&self) -> EventPosition {
        match &self.last_offset {
            Some(offset) => EventPosition::Offset(offset.clone()),
            None => EventPosition::EnqueuedTime(self.start_time),
        }
    }

    pub fn last_offset(&self) -> Option<&EventOffset> {
        self.last_offset.as_ref()
    }

    /// Record `offset` as fully processed. An offset that does not lie after the
    /// current one is ignored so the position never moves backwards.
    pub fn advance(&mut self, offset: EventOffset) -> bool {
        if let Some(last) = &self.last_offset {
            if offset.is_after(last) == Some(false) {
                warn!(
                    partition = %self.partition.padded(),
                    offset = %offset,
                    last_offset = %last,
                    "Ignoring offset that does not advance the position"
                );
                return false;
            }
        }
        self.last_offset = Some(offset);
        true
    }
}
