//! Broker transport seam.
//!
//! The client never talks to the wire directly; it goes through
//! [`BrokerTransport`]. [`RdKafkaTransport`] is the librdkafka-backed
//! implementation, and `crate::testing::MockTransport` scripts broker
//! behaviour for tests.

mod librdkafka;

pub use librdkafka::RdKafkaTransport;

use crate::credentials::Dialer;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("No brokers reachable at {0}")]
    Unreachable(String),

    #[error("Partition {topic}/{partition} not found or has no leader")]
    NoLeader { topic: String, partition: i32 },

    #[error("Topic {topic} reported an error: {reason}")]
    Topic { topic: String, reason: String },

    #[error("Reader is closed")]
    Closed,

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

/// Low/high watermark pair of a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermarks {
    /// Lowest retained offset
    pub low: i64,
    /// Next offset to be written
    pub high: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub topic: String,
    pub id: i32,
    pub leader: i32,
}

/// Concrete position a reader starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOffset {
    /// Broker sentinel for the next offset to be written
    Latest,
    /// Broker sentinel for the lowest retained offset
    Earliest,
    /// A physical offset
    At(i64),
}

/// A message as it comes off the wire, before payload decoding
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub payload: Option<Vec<u8>>,
    pub offset: i64,
    /// Broker timestamp (milliseconds since epoch)
    pub timestamp_ms: Option<i64>,
}

/// Everything needed to open a reader bound to one topic-partition
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub brokers: Vec<String>,
    pub group_id: String,
    pub topic: String,
    pub partition: i32,
    pub start_offset: StartOffset,
    pub dialer: Dialer,
}

#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Open a connection to any of the bootstrap brokers
    async fn dial(
        &self,
        dialer: &Dialer,
        brokers: &[String],
    ) -> Result<Box<dyn BrokerConnection>, TransportError>;

    /// Open a connection to the leader of a topic-partition
    async fn dial_leader(
        &self,
        dialer: &Dialer,
        brokers: &[String],
        topic: &str,
        partition: i32,
    ) -> Result<Box<dyn BrokerConnection>, TransportError>;

    /// Fetch the names of all topics in the cluster metadata
    async fn fetch_topics(
        &self,
        dialer: &Dialer,
        brokers: &[String],
    ) -> Result<Vec<String>, TransportError>;

    /// Open a reader with offset commits disabled
    async fn open_reader(
        &self,
        config: ReaderConfig,
    ) -> Result<Box<dyn MessageReader>, TransportError>;
}

#[async_trait]
pub trait BrokerConnection: Send {
    async fn read_partitions(&mut self) -> Result<Vec<PartitionInfo>, TransportError>;

    async fn read_watermarks(
        &mut self,
        topic: &str,
        partition: i32,
    ) -> Result<Watermarks, TransportError>;
}

#[async_trait]
pub trait MessageReader: Send + Sync {
    /// Wait for the next message. Dropping the future abandons the wait.
    async fn read_message(&mut self) -> Result<RawMessage, TransportError>;

    /// Release the underlying connection
    fn close(&mut self);
}
