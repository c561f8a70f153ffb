//! Kafka consumer client for a datasource that reads one topic-partition at a
//! time and decodes flat numeric JSON records.
//!
//! Features:
//!
//! - SASL (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512) with optional TLS
//! - Partition assignment at `latest` or `earliest`, with a bounded-lookback
//!   option for `earliest`
//! - Blocking, cancellable pull of decoded messages; offsets are never committed
//! - Broker health check with a fixed-interval retry budget
//! - Topic existence check via cluster metadata

/// Client session: assignment, pull, probes and disposal
pub mod client;
pub mod config;

/// Partition reader and payload decoding
pub mod consumer;
pub mod credentials;
pub mod error;
pub mod health;
pub mod logging;
pub mod metadata;
pub mod offset;

/// In-memory transport for tests
pub mod testing;

/// Broker transport seam and the librdkafka implementation
pub mod transport;

// Re-export main types for easy access
pub use client::{KafkaClient, CONSUMER_GROUP_ID};
pub use config::Options;
pub use consumer::{decode_payload, Message, PartitionReader};
pub use credentials::{build_dialer, sasl_mechanism, CredentialError, Dialer, SaslMechanism};
pub use error::{Error, Result};
pub use health::{HealthChecker, HealthState, PROBE_INTERVAL};
pub use logging::{resolve_log_sinks, resolve_log_sinks_with, LogSink, LogSinks, LogWriter};
pub use offset::{EarliestStrategy, OffsetPolicy, OffsetResolver, EARLIEST_LOOKBACK_WINDOW};
pub use transport::{BrokerTransport, RdKafkaTransport, StartOffset, TransportError, Watermarks};

// Cancellation token accepted by `KafkaClient::pull`
pub use tokio_util::sync::CancellationToken;
