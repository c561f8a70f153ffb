use crate::credentials::Dialer;
use crate::error::{Error, Result};
use crate::transport::BrokerTransport;
use tracing::debug;

/// Check whether `topic` appears in the cluster metadata.
///
/// One metadata round trip, no retries.
pub async fn topic_exists<T: BrokerTransport + ?Sized>(
    transport: &T,
    dialer: &Dialer,
    brokers: &[String],
    topic: &str,
) -> Result<bool> {
    let topics = transport
        .fetch_topics(dialer, brokers)
        .await
        .map_err(Error::MetadataFailed)?;

    let exists = topics.iter().any(|t| t == topic);
    debug!(
        "Topic {topic} {} in metadata ({} topics)",
        if exists { "found" } else { "not found" },
        topics.len()
    );

    Ok(exists)
}
