//! The inbound broker message model.
//!
//! Kept independent of `rdkafka`'s own message types so that the transform registry and
//! the sink's `upsert` logic can be unit tested without a running broker.

use chrono::{DateTime, Utc};

/// A single message read from the broker, already detached from the consumer
/// that produced it.
///
/// Once a `Record` is handed into the internal channel, the source no longer
/// references it; ownership of the bytes moves into the sink's processing of
/// that one record.
#[derive(Debug, Clone)]
pub struct Record {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Vec<u8>,
    /// Empty iff this record is a tombstone (see `Record::is_tombstone`).
    pub value: Vec<u8>,
    pub headers: Vec<(String, Vec<u8>)>,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    /// A record with an empty value is a tombstone: it carries no payload and
    /// is silently skipped rather than used to delete anything.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_empty()
    }

    /// The record key decoded as UTF-8, used verbatim as the store document's `_id`.
    pub fn key_as_string(&self) -> String {
        String::from_utf8_lossy(&self.key).into_owned()
    }

    /// Looks up a header by name, returning its value decoded as UTF-8.
    ///
    /// Mirrors `utils.GetHeader`: returns the first match, or `None` if the header
    /// is absent. Kafka technically allows repeated header names; only the first
    /// occurrence is considered, matching the original's linear scan that returns
    /// on first match.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| String::from_utf8_lossy(value).into_owned())
    }

    /// Structured fields for log correlation, mirroring `utils.GetFieldsFromMessage`.
    pub fn log_fields(&self) -> RecordLogFields<'_> {
        RecordLogFields { record: self }
    }
}

/// Thin wrapper so `Record` fields can be passed to `tracing` spans/events without
/// cloning the whole record.
pub struct RecordLogFields<'a> {
    record: &'a Record,
}

impl RecordLogFields<'_> {
    pub fn topic(&self) -> &str {
        &self.record.topic
    }
    pub fn partition(&self) -> i32 {
        self.record.partition
    }
    pub fn offset(&self) -> i64 {
        self.record.offset
    }
    pub fn key(&self) -> String {
        self.record.key_as_string()
    }
    pub fn message_type(&self) -> String {
        self.record.header("type").unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record {
            topic: "vortex".into(),
            partition: 0,
            offset: 17,
            key: b"u1".to_vec(),
            value: b"{}".to_vec(),
            headers: vec![("type".into(), b"MESSAGE".to_vec())],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn tombstone_detection() {
        let mut r = sample();
        assert!(!r.is_tombstone());
        r.value.clear();
        assert!(r.is_tombstone());
    }

    #[test]
    fn header_lookup_is_case_sensitive() {
        let r = sample();
        assert_eq!(r.header("type").as_deref(), Some("MESSAGE"));
        assert_eq!(r.header("Type"), None);
        assert_eq!(r.header("missing"), None);
    }

    #[test]
    fn key_as_string_round_trips_utf8() {
        let r = sample();
        assert_eq!(r.key_as_string(), "u1");
    }

    #[test]
    fn log_fields_expose_message_type() {
        let r = sample();
        let fields = r.log_fields();
        assert_eq!(fields.topic(), "vortex");
        assert_eq!(fields.partition(), 0);
        assert_eq!(fields.offset(), 17);
        assert_eq!(fields.message_type(), "MESSAGE");
    }
}
