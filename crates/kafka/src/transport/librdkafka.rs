use super::{
    BrokerConnection, BrokerTransport, MessageReader, PartitionInfo, RawMessage, ReaderConfig,
    StartOffset, TransportError, Watermarks,
};
use crate::credentials::Dialer;
use crate::logging::LogSinks;
use async_trait::async_trait;
use rdkafka::client::ClientContext;
use rdkafka::config::{ClientConfig, RDKafkaLogLevel};
use rdkafka::consumer::{BaseConsumer, Consumer, ConsumerContext, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message as _;
use rdkafka::metadata::Metadata;
use rdkafka::{Offset, TopicPartitionList};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Longest single blocking metadata request while waiting for a broker
const METADATA_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Broker connection failures reported by librdkafka since the last check
#[derive(Debug, Default)]
struct TransportFailure {
    reason: Option<String>,
    all_brokers_down: bool,
}

/// Forwards librdkafka log and error callbacks into the resolved log sinks
struct SinkContext {
    sinks: LogSinks,
    failure: Mutex<TransportFailure>,
}

impl SinkContext {
    fn new(sinks: LogSinks) -> Self {
        Self {
            sinks,
            failure: Mutex::new(TransportFailure::default()),
        }
    }

    fn record_failure(&self, error: &KafkaError, reason: &str) {
        let mut failure = self.failure.lock().unwrap_or_else(|e| e.into_inner());
        match error.rdkafka_error_code() {
            Some(RDKafkaErrorCode::BrokerTransportFailure) => {
                failure.reason = Some(format!("{error}: {reason}"));
            }
            Some(RDKafkaErrorCode::AllBrokersDown) => {
                failure.all_brokers_down = true;
                failure
                    .reason
                    .get_or_insert_with(|| format!("{error}: {reason}"));
            }
            _ => {}
        }
    }

    /// Reason the brokers are unreachable, once every one of them is down
    fn take_all_brokers_down(&self) -> Option<String> {
        let mut failure = self.failure.lock().unwrap_or_else(|e| e.into_inner());
        if !failure.all_brokers_down {
            return None;
        }
        std::mem::take(&mut *failure).reason
    }
}

impl ClientContext for SinkContext {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        let line = format!("{fac}: {log_message}");
        match level {
            RDKafkaLogLevel::Emerg
            | RDKafkaLogLevel::Alert
            | RDKafkaLogLevel::Critical
            | RDKafkaLogLevel::Error => self.sinks.error.log(&line),
            _ => self.sinks.debug.log(&line),
        }
    }

    fn error(&self, error: KafkaError, reason: &str) {
        self.sinks.error.log(&format!("{error}: {reason}"));
        self.record_failure(&error, reason);
    }
}

/// A metadata request that ran out of time without a usable broker
fn is_pending(error: &KafkaError) -> bool {
    matches!(
        error.rdkafka_error_code(),
        Some(RDKafkaErrorCode::OperationTimedOut | RDKafkaErrorCode::BrokerTransportFailure)
    )
}

impl ConsumerContext for SinkContext {}

type MetadataConsumer = BaseConsumer<SinkContext>;

/// Base librdkafka configuration for a dialer: brokers, security and logging
fn client_config(dialer: &Dialer, brokers: &[String]) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", brokers.join(","))
        .set(
            "socket.connection.setup.timeout.ms",
            dialer.timeout.as_millis().to_string(),
        )
        .set("security.protocol", dialer.security_protocol());

    if let Some(sasl) = &dialer.sasl {
        config
            .set("sasl.mechanism", sasl.name())
            .set("sasl.username", sasl.username())
            .set("sasl.password", sasl.password());
    }

    if dialer.tls {
        config.set("ssl.endpoint.identification.algorithm", "https");
    }

    let level = if dialer.sinks.debug.is_enabled() {
        RDKafkaLogLevel::Debug
    } else if dialer.sinks.error.is_enabled() {
        RDKafkaLogLevel::Error
    } else {
        RDKafkaLogLevel::Emerg
    };
    config.set_log_level(level);

    config
}

fn to_rdkafka_offset(offset: StartOffset) -> Offset {
    match offset {
        StartOffset::Latest => Offset::End,
        StartOffset::Earliest => Offset::Beginning,
        StartOffset::At(offset) => Offset::Offset(offset),
    }
}

/// Transport backed by librdkafka through the `rdkafka` crate
#[derive(Debug, Clone, Default)]
pub struct RdKafkaTransport;

impl RdKafkaTransport {
    pub fn new() -> Self {
        Self
    }

    fn metadata_consumer(
        dialer: &Dialer,
        brokers: &[String],
    ) -> Result<Arc<MetadataConsumer>, TransportError> {
        let consumer: MetadataConsumer = client_config(dialer, brokers)
            .create_with_context(SinkContext::new(dialer.sinks.clone()))?;
        Ok(Arc::new(consumer))
    }
}

/// Set when the future waiting on a blocking metadata poll is dropped
struct AbandonOnDrop(Arc<AtomicBool>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Fetch cluster metadata, giving up after `timeout`.
///
/// The blocking request runs in short slices. Between slices queued client
/// events are served, so once librdkafka reports every broker down the wait
/// ends early instead of running out the full timeout. Dropping the
/// returned future stops the blocking loop after the current slice.
async fn fetch_metadata(
    consumer: &Arc<MetadataConsumer>,
    topic: Option<&str>,
    timeout: Duration,
) -> Result<Metadata, TransportError> {
    let abandoned = Arc::new(AtomicBool::new(false));
    let _guard = AbandonOnDrop(Arc::clone(&abandoned));

    let consumer = Arc::clone(consumer);
    let topic = topic.map(str::to_string);
    tokio::task::spawn_blocking(move || {
        poll_metadata(&consumer, topic.as_deref(), timeout, &abandoned)
    })
    .await?
}

fn poll_metadata(
    consumer: &MetadataConsumer,
    topic: Option<&str>,
    timeout: Duration,
    abandoned: &AtomicBool,
) -> Result<Metadata, TransportError> {
    let deadline = Instant::now() + timeout;

    loop {
        let slice = deadline
            .saturating_duration_since(Instant::now())
            .min(METADATA_POLL_INTERVAL);
        let err = match consumer.fetch_metadata(topic, slice) {
            Ok(metadata) => return Ok(metadata),
            Err(e) if is_pending(&e) => e,
            Err(e) => return Err(e.into()),
        };

        while let Some(event) = consumer.poll(Duration::ZERO) {
            if let Err(e) = event {
                consumer.context().record_failure(&e, "reported while polling");
            }
        }
        if let Some(reason) = consumer.context().take_all_brokers_down() {
            return Err(TransportError::Unreachable(reason));
        }

        if abandoned.load(Ordering::Relaxed) || Instant::now() >= deadline {
            return Err(err.into());
        }
    }
}

#[async_trait]
impl BrokerTransport for RdKafkaTransport {
    async fn dial(
        &self,
        dialer: &Dialer,
        brokers: &[String],
    ) -> Result<Box<dyn BrokerConnection>, TransportError> {
        let consumer = Self::metadata_consumer(dialer, brokers)?;

        let metadata = fetch_metadata(&consumer, None, dialer.timeout).await?;
        if metadata.brokers().is_empty() {
            return Err(TransportError::Unreachable(brokers.join(",")));
        }
        debug!(
            "Dialed {} (cluster reports {} brokers)",
            brokers.join(","),
            metadata.brokers().len()
        );

        Ok(Box::new(RdKafkaConnection {
            consumer,
            timeout: dialer.timeout,
        }))
    }

    async fn dial_leader(
        &self,
        dialer: &Dialer,
        brokers: &[String],
        topic: &str,
        partition: i32,
    ) -> Result<Box<dyn BrokerConnection>, TransportError> {
        let consumer = Self::metadata_consumer(dialer, brokers)?;

        let metadata = fetch_metadata(&consumer, Some(topic), dialer.timeout).await?;
        let leader = metadata
            .topics()
            .iter()
            .filter(|t| t.name() == topic)
            .flat_map(|t| t.partitions())
            .find(|p| p.id() == partition)
            .map(|p| p.leader())
            .filter(|leader| *leader >= 0)
            .ok_or_else(|| TransportError::NoLeader {
                topic: topic.to_string(),
                partition,
            })?;
        debug!("Leader for {topic}/{partition} is broker {leader}");

        Ok(Box::new(RdKafkaConnection {
            consumer,
            timeout: dialer.timeout,
        }))
    }

    async fn fetch_topics(
        &self,
        dialer: &Dialer,
        brokers: &[String],
    ) -> Result<Vec<String>, TransportError> {
        let consumer = Self::metadata_consumer(dialer, brokers)?;
        let metadata = fetch_metadata(&consumer, None, dialer.timeout).await?;

        Ok(metadata
            .topics()
            .iter()
            .map(|t| t.name().to_string())
            .collect())
    }

    async fn open_reader(
        &self,
        config: ReaderConfig,
    ) -> Result<Box<dyn MessageReader>, TransportError> {
        let consumer: StreamConsumer<SinkContext> = client_config(&config.dialer, &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false")
            .create_with_context(SinkContext::new(config.dialer.sinks.clone()))?;

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &config.topic,
            config.partition,
            to_rdkafka_offset(config.start_offset),
        )?;
        consumer.assign(&tpl)?;

        Ok(Box::new(RdKafkaReader {
            consumer: Some(consumer),
        }))
    }
}

struct RdKafkaConnection {
    consumer: Arc<MetadataConsumer>,
    timeout: Duration,
}

#[async_trait]
impl BrokerConnection for RdKafkaConnection {
    async fn read_partitions(&mut self) -> Result<Vec<PartitionInfo>, TransportError> {
        let metadata = fetch_metadata(&self.consumer, None, self.timeout).await?;

        let mut partitions = Vec::new();
        for topic in metadata.topics() {
            if let Some(err) = topic.error() {
                return Err(TransportError::Topic {
                    topic: topic.name().to_string(),
                    reason: format!("{err:?}"),
                });
            }
            for partition in topic.partitions() {
                partitions.push(PartitionInfo {
                    topic: topic.name().to_string(),
                    id: partition.id(),
                    leader: partition.leader(),
                });
            }
        }

        Ok(partitions)
    }

    async fn read_watermarks(
        &mut self,
        topic: &str,
        partition: i32,
    ) -> Result<Watermarks, TransportError> {
        let consumer = Arc::clone(&self.consumer);
        let topic = topic.to_string();
        let timeout = self.timeout;
        let (low, high) = tokio::task::spawn_blocking(move || {
            consumer.fetch_watermarks(&topic, partition, timeout)
        })
        .await??;

        Ok(Watermarks { low, high })
    }
}

struct RdKafkaReader {
    consumer: Option<StreamConsumer<SinkContext>>,
}

#[async_trait]
impl MessageReader for RdKafkaReader {
    async fn read_message(&mut self) -> Result<RawMessage, TransportError> {
        let consumer = self.consumer.as_ref().ok_or(TransportError::Closed)?;
        let msg = consumer.recv().await?;

        Ok(RawMessage {
            payload: msg.payload().map(|p| p.to_vec()),
            offset: msg.offset(),
            timestamp_ms: msg.timestamp().to_millis(),
        })
    }

    fn close(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            if let Err(e) = consumer.unassign() {
                debug!("Failed to unassign partitions on close: {e}");
            }
        }
    }
}
