//! Start-offset resolution for a partition assignment.
//!
//! `latest` and any unrecognized policy resolve to the broker's next-write
//! sentinel without a round trip. `earliest` depends on the configured
//! [`EarliestStrategy`].

use crate::credentials::Dialer;
use crate::error::{Error, Result};
use crate::transport::{BrokerTransport, StartOffset, Watermarks};
use clap::ValueEnum;
use serde::Deserialize;
use tracing::debug;

/// Maximum number of messages the bounded-lookback strategy replays
pub const EARLIEST_LOOKBACK_WINDOW: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetPolicy {
    Latest,
    Earliest,
    /// Anything unrecognized; behaves like `Latest`
    Default,
}

impl OffsetPolicy {
    pub fn parse(policy: &str) -> Self {
        match policy {
            "latest" => OffsetPolicy::Latest,
            "earliest" => OffsetPolicy::Earliest,
            _ => OffsetPolicy::Default,
        }
    }
}

impl From<&str> for OffsetPolicy {
    fn from(policy: &str) -> Self {
        Self::parse(policy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EarliestStrategy {
    /// Start at most `EARLIEST_LOOKBACK_WINDOW` messages behind the high watermark
    #[default]
    BoundedLookback,
    /// Start at the lowest retained offset, however far back that is
    TrueEarliest,
}

/// Start offset for the bounded-lookback strategy.
pub fn bounded_start(watermarks: Watermarks, window: i64) -> i64 {
    if watermarks.high - watermarks.low > window {
        watermarks.high - window
    } else {
        watermarks.low
    }
}

pub struct OffsetResolver<'a, T: BrokerTransport + ?Sized> {
    transport: &'a T,
    dialer: &'a Dialer,
    brokers: &'a [String],
    strategy: EarliestStrategy,
}

impl<'a, T: BrokerTransport + ?Sized> OffsetResolver<'a, T> {
    pub fn new(
        transport: &'a T,
        dialer: &'a Dialer,
        brokers: &'a [String],
        strategy: EarliestStrategy,
    ) -> Self {
        Self {
            transport,
            dialer,
            brokers,
            strategy,
        }
    }

    pub async fn resolve(
        &self,
        policy: OffsetPolicy,
        topic: &str,
        partition: i32,
    ) -> Result<StartOffset> {
        match (policy, self.strategy) {
            (OffsetPolicy::Latest | OffsetPolicy::Default, _) => Ok(StartOffset::Latest),
            (OffsetPolicy::Earliest, EarliestStrategy::TrueEarliest) => Ok(StartOffset::Earliest),
            (OffsetPolicy::Earliest, EarliestStrategy::BoundedLookback) => {
                let watermarks = self.read_watermarks(topic, partition).await?;
                let start = bounded_start(watermarks, EARLIEST_LOOKBACK_WINDOW);
                debug!(
                    "Resolved earliest offset for {topic}/{partition}: {start} (low={}, high={})",
                    watermarks.low, watermarks.high
                );
                Ok(StartOffset::At(start))
            }
        }
    }

    async fn read_watermarks(&self, topic: &str, partition: i32) -> Result<Watermarks> {
        let failed = |source| Error::OffsetResolutionFailed {
            topic: topic.to_string(),
            partition,
            source,
        };

        let mut conn = self
            .transport
            .dial_leader(self.dialer, self.brokers, topic, partition)
            .await
            .map_err(failed)?;

        conn.read_watermarks(topic, partition).await.map_err(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::build_dialer;
    use crate::logging::LogSinks;
    use crate::testing::MockTransport;
    use crate::Options;

    fn dialer() -> Dialer {
        build_dialer(&Options::default(), LogSinks::disabled()).unwrap()
    }

    fn brokers() -> Vec<String> {
        vec!["localhost:9092".to_string()]
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(OffsetPolicy::parse("latest"), OffsetPolicy::Latest);
        assert_eq!(OffsetPolicy::parse("earliest"), OffsetPolicy::Earliest);
        assert_eq!(OffsetPolicy::parse("Earliest"), OffsetPolicy::Default);
        assert_eq!(OffsetPolicy::parse(""), OffsetPolicy::Default);
        assert_eq!(OffsetPolicy::parse("beginning"), OffsetPolicy::Default);
    }

    #[test]
    fn test_bounded_start_within_window() {
        let w = Watermarks { low: 10, high: 110 };
        assert_eq!(bounded_start(w, EARLIEST_LOOKBACK_WINDOW), 10);

        let w = Watermarks { low: 0, high: 0 };
        assert_eq!(bounded_start(w, EARLIEST_LOOKBACK_WINDOW), 0);
    }

    #[test]
    fn test_bounded_start_beyond_window() {
        let w = Watermarks { low: 10, high: 111 };
        assert_eq!(bounded_start(w, EARLIEST_LOOKBACK_WINDOW), 11);

        let w = Watermarks { low: 0, high: 5000 };
        assert_eq!(bounded_start(w, EARLIEST_LOOKBACK_WINDOW), 4900);
    }

    #[tokio::test]
    async fn test_latest_and_unknown_skip_broker() {
        let transport = MockTransport::new();
        let dialer = dialer();
        let brokers = brokers();

        for strategy in [EarliestStrategy::BoundedLookback, EarliestStrategy::TrueEarliest] {
            let resolver = OffsetResolver::new(&transport, &dialer, &brokers, strategy);
            for policy in ["latest", "newest", "", "EARLIEST"] {
                let offset = resolver
                    .resolve(OffsetPolicy::parse(policy), "t", 0)
                    .await
                    .unwrap();
                assert_eq!(offset, StartOffset::Latest);
            }
        }

        assert_eq!(transport.calls().dials, 0);
        assert_eq!(transport.calls().leader_dials, 0);
    }

    #[tokio::test]
    async fn test_true_earliest_uses_sentinel() {
        let transport = MockTransport::new();
        let dialer = dialer();
        let brokers = brokers();
        let resolver =
            OffsetResolver::new(&transport, &dialer, &brokers, EarliestStrategy::TrueEarliest);

        let offset = resolver.resolve(OffsetPolicy::Earliest, "t", 0).await.unwrap();

        assert_eq!(offset, StartOffset::Earliest);
        assert_eq!(transport.calls().leader_dials, 0);
    }

    #[tokio::test]
    async fn test_bounded_lookback_reads_leader_watermarks() {
        let transport = MockTransport::new();
        transport.set_watermarks("t", 2, Watermarks { low: 0, high: 1000 });
        transport.set_watermarks("t", 3, Watermarks { low: 40, high: 90 });
        let dialer = dialer();
        let brokers = brokers();
        let resolver =
            OffsetResolver::new(&transport, &dialer, &brokers, EarliestStrategy::BoundedLookback);

        let far = resolver.resolve(OffsetPolicy::Earliest, "t", 2).await.unwrap();
        let near = resolver.resolve(OffsetPolicy::Earliest, "t", 3).await.unwrap();

        assert_eq!(far, StartOffset::At(900));
        assert_eq!(near, StartOffset::At(40));
        assert_eq!(transport.calls().leader_dials, 2);
    }

    #[tokio::test]
    async fn test_bounded_lookback_leader_failure() {
        let transport = MockTransport::new();
        transport.fail_leader_dial("leader unavailable");
        let dialer = dialer();
        let brokers = brokers();
        let resolver =
            OffsetResolver::new(&transport, &dialer, &brokers, EarliestStrategy::BoundedLookback);

        let err = resolver.resolve(OffsetPolicy::Earliest, "t", 1).await.unwrap_err();

        assert!(matches!(
            err,
            Error::OffsetResolutionFailed { ref topic, partition: 1, .. } if topic == "t"
        ));
    }

    #[tokio::test]
    async fn test_bounded_lookback_missing_watermarks() {
        let transport = MockTransport::new();
        let dialer = dialer();
        let brokers = brokers();
        let resolver =
            OffsetResolver::new(&transport, &dialer, &brokers, EarliestStrategy::BoundedLookback);

        let err = resolver.resolve(OffsetPolicy::Earliest, "unknown", 0).await.unwrap_err();

        assert!(matches!(err, Error::OffsetResolutionFailed { .. }));
    }
}
