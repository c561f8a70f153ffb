//! Pull loop over an assigned client.

use anyhow::Context;
use kafka_datasource_client::{BrokerTransport, CancellationToken, Error, KafkaClient, Message};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Canceled,
    LimitReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullSummary {
    /// Messages handed to the handler
    pub delivered: u64,
    /// Messages dropped because their payload did not decode
    pub skipped: u64,
    pub stop: StopReason,
}

/// Pull messages from an assigned client and hand each one to `handler`.
///
/// Decode failures are logged and skipped. The loop ends when `cancel`
/// fires, after `limit` delivered messages, or on the first fatal error
/// (from the client or the handler).
pub async fn run_pull_loop<T, F>(
    client: &mut KafkaClient<T>,
    cancel: &CancellationToken,
    limit: Option<u64>,
    mut handler: F,
) -> anyhow::Result<PullSummary>
where
    T: BrokerTransport + ?Sized,
    F: FnMut(Message) -> anyhow::Result<()>,
{
    let mut delivered = 0u64;
    let mut skipped = 0u64;

    loop {
        if limit.is_some_and(|limit| delivered >= limit) {
            return Ok(PullSummary {
                delivered,
                skipped,
                stop: StopReason::LimitReached,
            });
        }

        match client.pull(cancel).await {
            Ok(message) => {
                let offset = message.offset;
                handler(message)
                    .with_context(|| format!("Failed to handle message at offset {offset}"))?;
                delivered += 1;
            }
            Err(e @ Error::Decode { .. }) => {
                warn!("Skipping message: {e}");
                skipped += 1;
            }
            Err(Error::Canceled) => {
                debug!("Pull loop canceled after {delivered} messages");
                return Ok(PullSummary {
                    delivered,
                    skipped,
                    stop: StopReason::Canceled,
                });
            }
            Err(e) => return Err(e).context("Failed to pull message from Kafka"),
        }
    }
}
