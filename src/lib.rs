//! Kafka datasource library
//!
//! Wraps the `kafka_datasource_client` crate with the pull loop the CLI (and
//! any embedding query layer) drives.
//!
//! # CLI Usage
//!
//! ```bash
//! # Check that the brokers answer within the health-check timeout
//! kafka-datasource health-check --bootstrap-servers localhost:9092
//!
//! # Check whether a topic exists
//! kafka-datasource topic-exists --bootstrap-servers localhost:9092 --topic sensors
//!
//! # Print decoded messages from one partition as JSON lines
//! kafka-datasource consume --bootstrap-servers localhost:9092 \
//!   --topic sensors --partition 0 --offset earliest --max-messages 100
//! ```

pub mod consume;

pub use consume::{run_pull_loop, PullSummary, StopReason};
pub use kafka_datasource_client as client;
pub use kafka_datasource_client::{KafkaClient, Message, Options};
