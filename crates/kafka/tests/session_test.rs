//! Client session tests against the in-memory transport.
//!
//! These cover the full assign -> pull -> dispose lifecycle and the two
//! probes without a running broker.

use kafka_datasource_client::testing::MockTransport;
use kafka_datasource_client::transport::RawMessage;
use kafka_datasource_client::{
    CancellationToken, EarliestStrategy, Error, KafkaClient, Options, StartOffset, Watermarks,
};
use std::sync::Arc;
use std::time::Duration;

fn client_with(transport: &MockTransport, options: Options) -> KafkaClient<MockTransport> {
    KafkaClient::with_transport(options, Arc::new(transport.clone()))
}

fn client(transport: &MockTransport) -> KafkaClient<MockTransport> {
    client_with(transport, Options::default())
}

#[tokio::test]
async fn test_pull_decodes_messages_in_order() -> anyhow::Result<()> {
    let transport = MockTransport::new();
    let mut client = client(&transport);
    client.assign("sensors", 0, "latest", "message").await?;

    transport.push_message(10, br#"{"a": 1.5, "b": 2}"#, Some(1_700_000_000_000));
    transport.push_message(11, br#"{"a": -3}"#, None);

    let cancel = CancellationToken::new();
    let first = client.pull(&cancel).await?;
    let second = client.pull(&cancel).await?;

    assert_eq!(first.offset, 10);
    assert_eq!(first.value["a"], 1.5);
    assert_eq!(first.value["b"], 2.0);
    assert_eq!(
        first.timestamp.map(|t| t.timestamp_millis()),
        Some(1_700_000_000_000)
    );
    assert_eq!(second.offset, 11);
    assert_eq!(second.value["a"], -3.0);
    assert!(second.timestamp.is_none());

    client.dispose();
    Ok(())
}

#[tokio::test]
async fn test_decode_error_keeps_session_usable() -> anyhow::Result<()> {
    let transport = MockTransport::new();
    let mut client = client(&transport);
    client.assign("sensors", 0, "latest", "message").await?;

    transport.push_message(1, br#"{"a": "x"}"#, None);
    transport.push_message(2, b"not json", None);
    transport.push_message(3, br#"{"a": 4}"#, None);

    let cancel = CancellationToken::new();

    let err = client.pull(&cancel).await.unwrap_err();
    assert!(err.is_decode());
    assert!(matches!(err, Error::Decode { offset: 1, .. }));

    let err = client.pull(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::Decode { offset: 2, .. }));

    let message = client.pull(&cancel).await?;
    assert_eq!(message.offset, 3);
    assert_eq!(message.value["a"], 4.0);

    Ok(())
}

#[tokio::test]
async fn test_message_without_payload_is_decode_error() -> anyhow::Result<()> {
    let transport = MockTransport::new();
    let mut client = client(&transport);
    client.assign("sensors", 0, "latest", "message").await?;

    transport.push_raw(RawMessage {
        payload: None,
        offset: 7,
        timestamp_ms: Some(1_700_000_000_000),
    });
    transport.push_message(8, br#"{"a": 1}"#, None);

    let cancel = CancellationToken::new();
    let err = client.pull(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::Decode { offset: 7, .. }));

    let message = client.pull(&cancel).await?;
    assert_eq!(message.offset, 8);
    Ok(())
}

#[tokio::test]
async fn test_read_error_is_reported() -> anyhow::Result<()> {
    let transport = MockTransport::new();
    let mut client = client(&transport);
    client.assign("sensors", 0, "latest", "message").await?;

    transport.push_read_error("broker went away");

    let err = client.pull(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, Error::Read(_)));
    Ok(())
}

#[tokio::test]
async fn test_pull_unblocks_on_cancel() -> anyhow::Result<()> {
    let transport = MockTransport::new();
    let mut client = client(&transport);
    client.assign("sensors", 0, "latest", "message").await?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(Duration::from_secs(5), client.pull(&cancel))
        .await
        .expect("pull should unblock on cancellation")
        .unwrap_err();
    assert!(matches!(err, Error::Canceled));

    // already-cancelled token fails without waiting, even with data queued
    transport.push_message(1, br#"{"a": 1}"#, None);
    let err = client.pull(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::Canceled));

    // a fresh token still sees the queued message
    let message = client.pull(&CancellationToken::new()).await?;
    assert_eq!(message.offset, 1);
    Ok(())
}

#[tokio::test]
async fn test_earliest_bounded_lookback_through_client() -> anyhow::Result<()> {
    let transport = MockTransport::new();
    transport.set_watermarks("t", 0, Watermarks { low: 5, high: 500 });
    transport.set_watermarks("t", 1, Watermarks { low: 5, high: 105 });
    let mut client = client(&transport);

    client.assign("t", 0, "earliest", "").await?;
    client.assign("t", 1, "earliest", "").await?;

    let opened = transport.calls().readers_opened;
    assert_eq!(opened[0], ("t".to_string(), 0, StartOffset::At(400)));
    assert_eq!(opened[1], ("t".to_string(), 1, StartOffset::At(5)));
    Ok(())
}

#[tokio::test]
async fn test_earliest_true_earliest_through_client() -> anyhow::Result<()> {
    let transport = MockTransport::new();
    let options = Options {
        earliest_strategy: EarliestStrategy::TrueEarliest,
        ..Default::default()
    };
    let mut client = client_with(&transport, options);

    client.assign("t", 0, "earliest", "").await?;

    let calls = transport.calls();
    assert_eq!(calls.leader_dials, 0);
    assert_eq!(
        calls.readers_opened,
        vec![("t".to_string(), 0, StartOffset::Earliest)]
    );
    Ok(())
}

#[tokio::test]
async fn test_offset_resolution_failure_aborts_assign() {
    let transport = MockTransport::new();
    transport.fail_leader_dial("leader not available");
    let mut client = client(&transport);

    let err = client.assign("t", 0, "earliest", "").await.unwrap_err();

    assert!(matches!(err, Error::OffsetResolutionFailed { .. }));
    assert!(client.reader().is_none());
    assert!(transport.calls().readers_opened.is_empty());
}

#[tokio::test]
async fn test_open_reader_failure_keeps_previous_reader() -> anyhow::Result<()> {
    let transport = MockTransport::new();
    let mut client = client(&transport);
    client.assign("a", 0, "latest", "").await?;

    transport.fail_open_reader("connection refused");
    let err = client.assign("b", 0, "latest", "").await.unwrap_err();

    assert!(matches!(err, Error::Connection { .. }));
    assert_eq!(client.reader().map(|r| r.topic()), Some("a"));
    assert_eq!(transport.calls().readers_closed, 0);
    Ok(())
}

#[tokio::test]
async fn test_dispose_is_idempotent() -> anyhow::Result<()> {
    let transport = MockTransport::new();
    let mut client = client(&transport);

    client.dispose();
    client.assign("t", 0, "latest", "").await?;
    client.dispose();
    client.dispose();

    assert_eq!(transport.calls().readers_closed, 1);
    assert!(matches!(
        client.pull(&CancellationToken::new()).await,
        Err(Error::NotAssigned)
    ));
    Ok(())
}

#[tokio::test]
async fn test_topic_exists() -> anyhow::Result<()> {
    let transport = MockTransport::new();
    transport.set_topics(&["t1", "t2"]);
    let client = client(&transport);

    assert!(client.topic_exists("t2").await?);
    assert!(!client.topic_exists("t3").await?);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_health_check_uses_configured_timeout() {
    let transport = MockTransport::new();
    transport.fail_dials(100, "connection refused");
    let options = Options {
        healthcheck_timeout: 1000,
        ..Default::default()
    };
    let client = client_with(&transport, options);
    let started = tokio::time::Instant::now();

    let err = client.health_check().await.unwrap_err();

    assert!(matches!(
        err,
        Error::HealthCheckTimeout {
            timeout_ms: 1000,
            last_error: Some(_),
        }
    ));
    assert_eq!(started.elapsed(), Duration::from_millis(1000));
    // ticks at 0, 200, ..., 800; the tick at 1000 loses to the deadline
    assert_eq!(transport.calls().dials, 5);
}

#[tokio::test(start_paused = true)]
async fn test_health_check_n_failures_then_success() {
    for n in [1usize, 3, 7] {
        let budget = (n as u64) * 200;

        let transport = MockTransport::new();
        transport.fail_dials(n, "connection refused");
        let client = client_with(&transport, Options::default());
        client
            .health_check_with_timeout(Duration::from_millis(budget + 100))
            .await
            .unwrap();

        let transport = MockTransport::new();
        transport.fail_dials(n, "connection refused");
        let client = client_with(&transport, Options::default());
        let err = client
            .health_check_with_timeout(Duration::from_millis(budget - 100))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HealthCheckTimeout { .. }));
    }
}

#[tokio::test(start_paused = true)]
async fn test_health_check_partition_list_failure_short_circuits() {
    let transport = MockTransport::new();
    transport.fail_dials(2, "connection refused");
    transport.fail_partition_list("cluster authorization failed");
    let client = client(&transport);
    let started = tokio::time::Instant::now();

    let err = client
        .health_check_with_timeout(Duration::from_secs(30))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PartitionListFailed(_)));
    assert_eq!(started.elapsed(), Duration::from_millis(400));
    assert_eq!(transport.calls().dials, 3);
    assert_eq!(transport.calls().partition_lists, 1);
}
