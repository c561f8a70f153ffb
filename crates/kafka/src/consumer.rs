use crate::error::{Error, Result};
use crate::transport::{MessageReader, RawMessage, StartOffset};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A decoded Kafka message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    /// Flat numeric record decoded from the JSON payload
    pub value: HashMap<String, f64>,
    /// Kafka offset
    pub offset: i64,
    /// Broker-assigned timestamp, when the broker reports one
    pub timestamp: Option<DateTime<Utc>>,
}

/// Decode a JSON payload into a flat string-to-number record.
///
/// Nested values, strings, booleans and nulls are rejected.
pub fn decode_payload(payload: &[u8]) -> std::result::Result<HashMap<String, f64>, String> {
    serde_json::from_slice::<HashMap<String, f64>>(payload).map_err(|e| e.to_string())
}

fn decode_message(raw: RawMessage) -> Result<Message> {
    let payload = raw.payload.ok_or_else(|| Error::Decode {
        offset: raw.offset,
        reason: "Message has no payload".to_string(),
    })?;

    let value = decode_payload(&payload).map_err(|reason| Error::Decode {
        offset: raw.offset,
        reason,
    })?;

    Ok(Message {
        value,
        offset: raw.offset,
        timestamp: raw.timestamp_ms.and_then(DateTime::<Utc>::from_timestamp_millis),
    })
}

/// Reader bound to a single topic-partition for its whole lifetime.
///
/// Offsets are never committed; a new reader for the same partition starts
/// again from whatever offset it is opened at.
pub struct PartitionReader {
    reader: Box<dyn MessageReader>,
    topic: String,
    partition: i32,
    start_offset: StartOffset,
    closed: bool,
}

impl PartitionReader {
    pub fn new(
        reader: Box<dyn MessageReader>,
        topic: String,
        partition: i32,
        start_offset: StartOffset,
    ) -> Self {
        Self {
            reader,
            topic,
            partition,
            start_offset,
            closed: false,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub fn start_offset(&self) -> StartOffset {
        self.start_offset
    }

    /// Wait for the next message and decode it.
    ///
    /// Returns `Error::Canceled` as soon as `cancel` fires. A payload that
    /// fails to decode is dropped and reported as `Error::Decode`; the next
    /// pull continues after it.
    pub async fn pull(&mut self, cancel: &CancellationToken) -> Result<Message> {
        if cancel.is_cancelled() {
            return Err(Error::Canceled);
        }

        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Canceled),
            raw = self.reader.read_message() => raw.map_err(Error::Read)?,
        };

        decode_message(raw)
    }

    /// Close the underlying reader. Later calls do nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.reader.close();
        debug!("Closed reader for {}/{}", self.topic, self.partition);
    }
}

impl Drop for PartitionReader {
    fn drop(&mut self) {
        self.close();
    }
}
