//! Scriptable in-memory broker transport for tests.
//!
//! Clones share state, so a test can hand one clone to a client and keep
//! another to script broker behaviour and inspect recorded calls.

use crate::credentials::Dialer;
use crate::transport::{
    BrokerConnection, BrokerTransport, MessageReader, PartitionInfo, RawMessage, ReaderConfig,
    StartOffset, TransportError, Watermarks,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Calls observed by a [`MockTransport`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Calls {
    pub dials: usize,
    /// Connection timeout each dial was made with
    pub dial_timeouts: Vec<Duration>,
    pub leader_dials: usize,
    pub partition_lists: usize,
    pub metadata_fetches: usize,
    pub readers_opened: Vec<(String, i32, StartOffset)>,
    pub readers_closed: usize,
}

enum Delivery {
    Message(RawMessage),
    Error(String),
}

#[derive(Default)]
struct MockState {
    dial_failures: VecDeque<String>,
    dial_delay: Option<Duration>,
    partition_list_error: Option<String>,
    partitions: Vec<PartitionInfo>,
    leader_dial_error: Option<String>,
    watermarks: HashMap<(String, i32), Watermarks>,
    topics: Vec<String>,
    metadata_error: Option<String>,
    open_reader_error: Option<String>,
    deliveries: VecDeque<Delivery>,
    calls: Calls,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    notify: Arc<Notify>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail the next `count` dials with `reason`; later dials succeed
    pub fn fail_dials(&self, count: usize, reason: &str) {
        let mut state = self.state();
        for _ in 0..count {
            state.dial_failures.push_back(reason.to_string());
        }
    }

    /// Make every dial take `delay` (on the tokio clock) before resolving
    pub fn set_dial_delay(&self, delay: Duration) {
        self.state().dial_delay = Some(delay);
    }

    pub fn fail_partition_list(&self, reason: &str) {
        self.state().partition_list_error = Some(reason.to_string());
    }

    pub fn set_partitions(&self, partitions: Vec<PartitionInfo>) {
        self.state().partitions = partitions;
    }

    pub fn fail_leader_dial(&self, reason: &str) {
        self.state().leader_dial_error = Some(reason.to_string());
    }

    pub fn set_watermarks(&self, topic: &str, partition: i32, watermarks: Watermarks) {
        self.state()
            .watermarks
            .insert((topic.to_string(), partition), watermarks);
    }

    pub fn set_topics(&self, topics: &[&str]) {
        self.state().topics = topics.iter().map(|t| t.to_string()).collect();
    }

    pub fn fail_metadata(&self, reason: &str) {
        self.state().metadata_error = Some(reason.to_string());
    }

    pub fn fail_open_reader(&self, reason: &str) {
        self.state().open_reader_error = Some(reason.to_string());
    }

    /// Queue a message for whichever reader reads next
    pub fn push_message(&self, offset: i64, payload: &[u8], timestamp_ms: Option<i64>) {
        self.state().deliveries.push_back(Delivery::Message(RawMessage {
            payload: Some(payload.to_vec()),
            offset,
            timestamp_ms,
        }));
        self.notify.notify_one();
    }

    /// Queue a raw message, e.g. one without payload
    pub fn push_raw(&self, message: RawMessage) {
        self.state().deliveries.push_back(Delivery::Message(message));
        self.notify.notify_one();
    }

    /// Queue a read failure
    pub fn push_read_error(&self, reason: &str) {
        self.state()
            .deliveries
            .push_back(Delivery::Error(reason.to_string()));
        self.notify.notify_one();
    }

    pub fn calls(&self) -> Calls {
        self.state().calls.clone()
    }
}

#[async_trait]
impl BrokerTransport for MockTransport {
    async fn dial(
        &self,
        dialer: &Dialer,
        brokers: &[String],
    ) -> Result<Box<dyn BrokerConnection>, TransportError> {
        self.state().calls.dial_timeouts.push(dialer.timeout);
        let delay = self.state().dial_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = {
            let mut state = self.state();
            state.calls.dials += 1;
            state.dial_failures.pop_front()
        };
        if let Some(reason) = failure {
            return Err(TransportError::Unreachable(format!(
                "{}: {reason}",
                brokers.join(",")
            )));
        }

        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }

    async fn dial_leader(
        &self,
        _dialer: &Dialer,
        _brokers: &[String],
        topic: &str,
        partition: i32,
    ) -> Result<Box<dyn BrokerConnection>, TransportError> {
        let mut state = self.state();
        state.calls.leader_dials += 1;
        if let Some(reason) = &state.leader_dial_error {
            return Err(TransportError::Other(format!(
                "{topic}/{partition}: {reason}"
            )));
        }

        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }

    async fn fetch_topics(
        &self,
        _dialer: &Dialer,
        _brokers: &[String],
    ) -> Result<Vec<String>, TransportError> {
        let mut state = self.state();
        state.calls.metadata_fetches += 1;
        match &state.metadata_error {
            Some(reason) => Err(TransportError::Other(reason.clone())),
            None => Ok(state.topics.clone()),
        }
    }

    async fn open_reader(
        &self,
        config: ReaderConfig,
    ) -> Result<Box<dyn MessageReader>, TransportError> {
        let mut state = self.state();
        if let Some(reason) = &state.open_reader_error {
            return Err(TransportError::Other(reason.clone()));
        }
        state
            .calls
            .readers_opened
            .push((config.topic, config.partition, config.start_offset));

        Ok(Box::new(MockReader {
            state: Arc::clone(&self.state),
            notify: Arc::clone(&self.notify),
            closed: false,
        }))
    }
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BrokerConnection for MockConnection {
    async fn read_partitions(&mut self) -> Result<Vec<PartitionInfo>, TransportError> {
        let mut state = self.state();
        state.calls.partition_lists += 1;
        match &state.partition_list_error {
            Some(reason) => Err(TransportError::Other(reason.clone())),
            None => Ok(state.partitions.clone()),
        }
    }

    async fn read_watermarks(
        &mut self,
        topic: &str,
        partition: i32,
    ) -> Result<Watermarks, TransportError> {
        self.state()
            .watermarks
            .get(&(topic.to_string(), partition))
            .copied()
            .ok_or_else(|| TransportError::NoLeader {
                topic: topic.to_string(),
                partition,
            })
    }
}

struct MockReader {
    state: Arc<Mutex<MockState>>,
    notify: Arc<Notify>,
    closed: bool,
}

#[async_trait]
impl MessageReader for MockReader {
    async fn read_message(&mut self) -> Result<RawMessage, TransportError> {
        loop {
            if self.closed {
                return Err(TransportError::Closed);
            }
            let next = self
                .state
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .deliveries
                .pop_front();
            match next {
                Some(Delivery::Message(msg)) => return Ok(msg),
                Some(Delivery::Error(reason)) => return Err(TransportError::Other(reason)),
                None => self.notify.notified().await,
            }
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .calls
                .readers_closed += 1;
        }
    }
}
