//! Broker health probe.
//!
//! ```text
//! INIT -> PROBING -> SUCCESS
//!                 -> TIMED_OUT
//! ```
//!
//! While probing, a dial is attempted on every tick. Dial failures are
//! retried; a partition-listing failure after a successful dial ends the
//! probe immediately. When the deadline and a tick are ready together the
//! deadline wins. Each probe's connection timeout is cut down to the time
//! left before the deadline, and a probe still in flight when the deadline
//! passes is abandoned.

use crate::credentials::Dialer;
use crate::error::{Error, Result};
use crate::transport::{BrokerTransport, TransportError};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Interval between probe attempts
pub const PROBE_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Init,
    Probing,
    Success,
    TimedOut,
}

enum Probe {
    Healthy,
    DialFailed(TransportError),
    ListFailed(TransportError),
}

pub struct HealthChecker<'a, T: BrokerTransport + ?Sized> {
    transport: &'a T,
    dialer: Dialer,
    brokers: Vec<String>,
    interval: Duration,
    state: HealthState,
}

impl<'a, T: BrokerTransport + ?Sized> HealthChecker<'a, T> {
    pub fn new(transport: &'a T, dialer: Dialer, brokers: Vec<String>) -> Self {
        Self {
            transport,
            dialer,
            brokers,
            interval: PROBE_INTERVAL,
            state: HealthState::Init,
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    /// Probe until the brokers answer or `timeout` elapses.
    pub async fn run(&mut self, timeout: Duration) -> Result<()> {
        let deadline_at = Instant::now() + timeout;
        let deadline = tokio::time::sleep_until(deadline_at);
        tokio::pin!(deadline);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.state = HealthState::Probing;
        let mut last_error: Option<TransportError> = None;
        let mut attempts = 0usize;

        loop {
            tokio::select! {
                biased;
                _ = &mut deadline => {
                    return Err(self.timed_out(timeout, last_error));
                }
                _ = ticker.tick() => {
                    attempts += 1;
                    let probe = tokio::select! {
                        biased;
                        _ = &mut deadline => {
                            return Err(self.timed_out(timeout, last_error));
                        }
                        probe = self.probe(deadline_at) => probe,
                    };

                    match probe {
                        Probe::Healthy => {
                            self.state = HealthState::Success;
                            info!("Kafka health check succeeded after {attempts} attempt(s)");
                            return Ok(());
                        }
                        Probe::DialFailed(e) => {
                            debug!("Health check dial attempt {attempts} failed: {e}");
                            last_error = Some(e);
                        }
                        Probe::ListFailed(e) => {
                            return Err(Error::PartitionListFailed(e));
                        }
                    }
                }
            }
        }
    }

    async fn probe(&self, deadline: Instant) -> Probe {
        let dialer = self
            .dialer
            .bounded_by(deadline.saturating_duration_since(Instant::now()));
        let mut conn = match self.transport.dial(&dialer, &self.brokers).await {
            Ok(conn) => conn,
            Err(e) => return Probe::DialFailed(e),
        };

        match conn.read_partitions().await {
            Ok(partitions) => {
                debug!("Brokers reported {} partitions", partitions.len());
                Probe::Healthy
            }
            Err(e) => Probe::ListFailed(e),
        }
    }

    fn timed_out(&mut self, timeout: Duration, last_error: Option<TransportError>) -> Error {
        self.state = HealthState::TimedOut;
        Error::HealthCheckTimeout {
            timeout_ms: timeout.as_millis() as u64,
            last_error,
        }
    }
}
