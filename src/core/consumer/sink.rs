use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;

use crate::codec::DecodedRecord;

/// Create the queue every partition worker appends to, and its reading end.
pub fn output_queue() -> (OutputSink, OutputStream) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (OutputSink { sender }, OutputStream { receiver })
}

/// Writing end of the output queue. Clones share the same queue, and records
/// pushed through one clone keep their relative order.
#[derive(Debug, Clone)]
pub struct OutputSink {
    sender: mpsc::UnboundedSender<DecodedRecord>,
}

impl OutputSink {
    /// Append a record. Fails only when the reading end has been dropped.
    pub fn push(&self, record: DecodedRecord) -> Result<(), SendError<DecodedRecord>> {
        self.sender.send(record)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Reading end of the output queue.
#[derive(Debug)]
pub struct OutputStream {
    receiver: mpsc::UnboundedReceiver<DecodedRecord>,
}

impl OutputStream {
    /// Wait for the next record. Returns `None` once every sink is dropped
    /// and the queue is empty.
    pub async fn recv(&mut self) -> Option<DecodedRecord> {
        self.receiver.recv().await
    }

    /// Take every record currently queued without waiting.
    pub fn drain(&mut self) -> Vec<DecodedRecord> {
        let mut records = Vec::new();
        while let Ok(record) = self.receiver.try_recv() {
            records.push(record);
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_concurrent_writers_keep_their_own_order() {
        let (sink, mut stream) = output_queue();

        let writers: Vec<_> = (0..4)
            .map(|writer| {
                let sink = sink.clone();
                tokio::spawn(async move {
                    for n in 0..100 {
                        let mut record = DecodedRecord::from_message("x");
                        record.fields.insert("writer".to_owned(), json!(writer));
                        record.fields.insert("n".to_owned(), json!(n));
                        sink.push(record).unwrap();
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }
        drop(sink);

        let mut next_expected = [0; 4];
        let mut total = 0;
        while let Some(record) = stream.recv().await {
            let writer = record.get("writer").unwrap().as_u64().unwrap() as usize;
            let n = record.get("n").unwrap().as_u64().unwrap();
            assert_eq!(n, next_expected[writer]);
            next_expected[writer] += 1;
            total += 1;
        }
        assert_eq!(total, 400);
    }

    #[test]
    fn test_push_fails_once_stream_dropped() {
        let (sink, stream) = output_queue();
        drop(stream);

        assert!(sink.is_closed());
        assert!(sink.push(DecodedRecord::from_message("lost")).is_err());
    }

    #[test]
    fn test_drain() {
        let (sink, mut stream) = output_queue();
        sink.push(DecodedRecord::from_message("a")).unwrap();
        sink.push(DecodedRecord::from_message("b")).unwrap();

        let drained = stream.drain();
        assert_eq!(drained.len(), 2);
        assert!(stream.drain().is_empty());
    }
}
