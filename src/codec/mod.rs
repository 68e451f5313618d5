//! Payload decoding and record decoration.
//!
//! A [`Codec`] turns the body of one broker message into zero or more
//! [`DecodedRecord`]s, in order. Records can then be enriched with static
//! fields and tags, and decorated with the broker metadata of the message
//! they came from.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::common::{PartitionId, SystemProperties};
use crate::constants::{MESSAGE_FIELD, TAGS_FIELD};
use crate::enums::CodecKind;
use crate::errors::CodecError;

pub trait Codec: Send + Sync {
    /// Decode one message body. The returned records keep the order in which
    /// they appear in the payload.
    fn decode(&self, body: &[u8]) -> Result<Vec<DecodedRecord>, CodecError>;
}

pub fn codec_for(kind: CodecKind) -> Arc<dyn Codec> {
    match kind {
        CodecKind::Json => Arc::new(JsonCodec),
        CodecKind::Plain => Arc::new(PlainCodec),
        CodecKind::Line => Arc::new(LineCodec),
    }
}

/// Decodes JSON objects, and arrays of them.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn decode(&self, body: &[u8]) -> Result<Vec<DecodedRecord>, CodecError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        let records = match serde_json::from_slice::<Value>(body)? {
            Value::Array(items) => items.into_iter().map(DecodedRecord::from_value).collect(),
            value => vec![DecodedRecord::from_value(value)],
        };
        Ok(records)
    }
}

/// Emits the whole body as the `message` field of a single record.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCodec;

impl Codec for PlainCodec {
    fn decode(&self, body: &[u8]) -> Result<Vec<DecodedRecord>, CodecError> {
        if body.is_empty() {
            return Ok(Vec::new());
        }
        let text = String::from_utf8_lossy(body);
        Ok(vec![DecodedRecord::from_message(&text)])
    }
}

/// Emits one record per non-empty line of the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineCodec;

impl Codec for LineCodec {
    fn decode(&self, body: &[u8]) -> Result<Vec<DecodedRecord>, CodecError> {
        let text = String::from_utf8_lossy(body);
        Ok(text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.is_empty())
            .map(DecodedRecord::from_message)
            .collect())
    }
}

/// A decoded event on its way to the output queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedRecord {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(rename = "@metadata", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RecordMetadata>,
}

/// Metadata kept apart from the record body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordMetadata {
    pub azure_eventhub: EventHubMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventHubMetadata {
    pub enqueued_time: String,
    pub properties: String,
    pub partition_id: String,
}

impl DecodedRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            metadata: None,
        }
    }

    pub fn from_message(message: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(MESSAGE_FIELD.to_owned(), Value::String(message.to_owned()));
        Self::new(fields)
    }

    fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self::new(fields),
            other => {
                let mut fields = Map::new();
                fields.insert(MESSAGE_FIELD.to_owned(), other);
                Self::new(fields)
            }
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Attach the broker metadata of the message this record was decoded from.
    pub fn decorate(&mut self, partition: PartitionId, properties: &SystemProperties) {
        self.metadata = Some(RecordMetadata {
            azure_eventhub: EventHubMetadata {
                enqueued_time: properties.enqueued_time.to_rfc3339(),
                properties: properties.to_string(),
                partition_id: partition.to_string(),
            },
        });
    }

    pub fn eventhub_metadata(&self) -> Option<&EventHubMetadata> {
        self.metadata.as_ref().map(|m| &m.azure_eventhub)
    }
}

/// Static fields and tags added to every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordEnrichment {
    pub tags: Vec<String>,
    pub fields: Vec<(String, String)>,
}

impl RecordEnrichment {
    /// Fields already present are turned into arrays holding both values.
    /// Tags already present are not added twice.
    pub fn apply(&self, record: &mut DecodedRecord) {
        for (name, value) in &self.fields {
            let value = Value::String(value.clone());
            match record.fields.get_mut(name) {
                None => {
                    record.fields.insert(name.clone(), value);
                }
                Some(Value::Array(existing)) => existing.push(value),
                Some(existing) => {
                    let previous = existing.take();
                    *existing = Value::Array(vec![previous, value]);
                }
            }
        }

        if self.tags.is_empty() {
            return;
        }
        let tags = record
            .fields
            .entry(TAGS_FIELD)
            .or_insert_with(|| Value::Array(Vec::new()));
        if !tags.is_array() {
            let previous = tags.take();
            *tags = Value::Array(vec![previous]);
        }
        if let Value::Array(existing) = tags {
            for tag in &self.tags {
                let tag = Value::String(tag.clone());
                if !existing.contains(&tag) {
                    existing.push(tag);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::EventOffset;
    use chrono::DateTime;
    use serde_json::json;

    fn properties() -> SystemProperties {
        SystemProperties {
            offset: EventOffset::from(42),
            enqueued_time: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            sequence_number: 7,
            partition_key: None,
        }
    }

    #[test]
    fn test_json_object() {
        let records = JsonCodec.decode(br#"{"a": 1, "b": "x"}"#).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("a"), Some(&json!(1)));
        assert_eq!(records[0].metadata, None);
    }

    #[test]
    fn test_json_array_keeps_order() {
        let records = JsonCodec.decode(br#"[{"n": 1}, {"n": 2}, 3]"#).unwrap();
        let values: Vec<_> = records
            .iter()
            .map(|r| r.get("n").or(r.get("message")).cloned().unwrap())
            .collect();
        assert_eq!(values, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn test_json_empty_and_invalid() {
        assert!(JsonCodec.decode(b"").unwrap().is_empty());
        assert!(JsonCodec.decode(b"  \n").unwrap().is_empty());
        assert!(JsonCodec.decode(b"{not json").is_err());
    }

    #[test]
    fn test_plain_and_line() {
        let records = PlainCodec.decode(b"hello\nworld").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("message"), Some(&json!("hello\nworld")));
        assert!(PlainCodec.decode(b"").unwrap().is_empty());

        let records = LineCodec.decode(b"one\r\n\ntwo\n").unwrap();
        let lines: Vec<_> = records.iter().map(|r| r.get("message").cloned()).collect();
        assert_eq!(lines, vec![Some(json!("one")), Some(json!("two"))]);
    }

    #[test]
    fn test_decorate_places_metadata_apart_from_body() {
        let mut record = DecodedRecord::from_message("hi");
        record.decorate(PartitionId(3), &properties());

        let metadata = record.eventhub_metadata().unwrap();
        assert_eq!(metadata.partition_id, "3");
        assert_eq!(metadata.enqueued_time, "2023-11-14T22:13:20+00:00");
        assert!(metadata.properties.contains("\"sequence_number\":7"));

        let rendered = serde_json::to_value(&record).unwrap();
        assert_eq!(rendered["message"], json!("hi"));
        assert_eq!(rendered["@metadata"]["azure_eventhub"]["partition_id"], json!("3"));
    }

    #[test]
    fn test_enrichment() {
        let enrichment = RecordEnrichment {
            tags: vec!["eventhub".to_owned(), "prod".to_owned()],
            fields: vec![
                ("source".to_owned(), "hub".to_owned()),
                ("message".to_owned(), "extra".to_owned()),
            ],
        };
        let mut record = JsonCodec
            .decode(br#"{"message": "hi", "tags": ["prod"]}"#)
            .unwrap()
            .remove(0);

        enrichment.apply(&mut record);

        assert_eq!(record.get("source"), Some(&json!("hub")));
        assert_eq!(record.get("message"), Some(&json!(["hi", "extra"])));
        assert_eq!(record.get("tags"), Some(&json!(["prod", "eventhub"])));
    }
}
