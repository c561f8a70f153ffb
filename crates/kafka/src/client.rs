use crate::config::Options;
use crate::consumer::{Message, PartitionReader};
use crate::credentials::{build_dialer, CredentialError, Dialer};
use crate::error::{Error, Result};
use crate::health::HealthChecker;
use crate::logging::{resolve_log_sinks, LogSinks};
use crate::metadata;
use crate::offset::{OffsetPolicy, OffsetResolver};
use crate::transport::{BrokerTransport, RdKafkaTransport, ReaderConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Group id handed to the transport. Offsets are never committed under it
/// and the reader is assigned its partition directly, so no group
/// coordination takes place.
pub const CONSUMER_GROUP_ID: &str = "kafka-datasource";

/// Kafka client session bound to at most one topic-partition.
///
/// Not internally synchronized: `assign`, `pull`, `health_check` and
/// `dispose` must not run concurrently on the same instance.
pub struct KafkaClient<T: BrokerTransport + ?Sized = RdKafkaTransport> {
    transport: Arc<T>,
    options: Options,
    sinks: LogSinks,
    dialer: Option<Dialer>,
    reader: Option<PartitionReader>,
    timestamp_mode: Option<String>,
}

impl KafkaClient<RdKafkaTransport> {
    /// Create a client that talks to Kafka through librdkafka
    pub fn new(options: Options) -> Self {
        Self::with_transport(options, Arc::new(RdKafkaTransport::new()))
    }
}

impl<T: BrokerTransport + ?Sized> KafkaClient<T> {
    pub fn with_transport(options: Options, transport: Arc<T>) -> Self {
        let sinks = resolve_log_sinks(&options.log_level);
        Self::with_sinks(options, transport, sinks)
    }

    /// Create a client whose transport logs go to the given sinks
    pub fn with_sinks(options: Options, transport: Arc<T>, sinks: LogSinks) -> Self {
        Self {
            transport,
            options,
            sinks,
            dialer: None,
            reader: None,
            timestamp_mode: None,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Timestamp mode passed to the last `assign` call
    pub fn timestamp_mode(&self) -> Option<&str> {
        self.timestamp_mode.as_deref()
    }

    /// Dialer built by the last successful `assign`
    pub fn dialer(&self) -> Option<&Dialer> {
        self.dialer.as_ref()
    }

    /// The currently bound reader, if any
    pub fn reader(&self) -> Option<&PartitionReader> {
        self.reader.as_ref()
    }

    fn build_dialer(&self) -> std::result::Result<Dialer, CredentialError> {
        build_dialer(&self.options, self.sinks.clone())
    }

    /// Bind the session to `topic`/`partition`, starting at the offset the
    /// policy resolves to. A previously bound reader is closed first.
    pub async fn assign(
        &mut self,
        topic: &str,
        partition: i32,
        auto_offset_reset: &str,
        timestamp_mode: &str,
    ) -> Result<()> {
        if partition < 0 {
            return Err(Error::InvalidConfig(format!(
                "partition must be non-negative, got {partition}"
            )));
        }
        self.options.validate()?;
        self.timestamp_mode = Some(timestamp_mode.to_string());

        let dialer = self.build_dialer().map_err(Error::Credential)?;
        let brokers = self.options.brokers();

        let start_offset = OffsetResolver::new(
            self.transport.as_ref(),
            &dialer,
            &brokers,
            self.options.earliest_strategy,
        )
        .resolve(OffsetPolicy::parse(auto_offset_reset), topic, partition)
        .await?;

        let reader = self
            .transport
            .open_reader(ReaderConfig {
                brokers,
                group_id: CONSUMER_GROUP_ID.to_string(),
                topic: topic.to_string(),
                partition,
                start_offset,
                dialer: dialer.clone(),
            })
            .await
            .map_err(|source| Error::Connection {
                context: format!("opening reader for {topic}/{partition}"),
                source,
            })?;

        info!("Assigned {topic}/{partition} starting at {start_offset:?}");
        self.replace_reader(PartitionReader::new(
            reader,
            topic.to_string(),
            partition,
            start_offset,
        ));
        self.dialer = Some(dialer);

        Ok(())
    }

    /// Close the bound reader, if any, then bind `reader` in its place
    fn replace_reader(&mut self, reader: PartitionReader) {
        if let Some(mut previous) = self.reader.take() {
            previous.close();
        }
        self.reader = Some(reader);
    }

    /// Wait for the next message on the assigned partition.
    ///
    /// A `Error::Decode` only drops that message; keep pulling.
    pub async fn pull(&mut self, cancel: &CancellationToken) -> Result<Message> {
        let reader = self.reader.as_mut().ok_or(Error::NotAssigned)?;
        reader.pull(cancel).await
    }

    /// Probe the bootstrap brokers using the configured timeout
    pub async fn health_check(&self) -> Result<()> {
        self.health_check_with_timeout(Duration::from_millis(self.options.healthcheck_timeout))
            .await
    }

    pub async fn health_check_with_timeout(&self, timeout: Duration) -> Result<()> {
        let dialer = self.build_dialer().map_err(Error::InitFailed)?;
        HealthChecker::new(self.transport.as_ref(), dialer, self.options.brokers())
            .run(timeout)
            .await
    }

    /// Check whether a topic exists in the cluster metadata
    pub async fn topic_exists(&self, topic: &str) -> Result<bool> {
        let dialer = self.build_dialer().map_err(Error::Credential)?;
        metadata::topic_exists(
            self.transport.as_ref(),
            &dialer,
            &self.options.brokers(),
            topic,
        )
        .await
    }

    /// Close the bound reader. Safe to call repeatedly or before `assign`.
    pub fn dispose(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.close();
        }
        self.dialer = None;
    }
}
