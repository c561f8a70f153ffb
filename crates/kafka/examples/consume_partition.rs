use kafka_datasource_client::{CancellationToken, KafkaClient, Options};

/// Example: read decoded messages from one partition
///
/// Publishes are expected to be flat JSON objects of numbers, e.g.
/// `{"temperature": 21.5, "humidity": 40}`.
///
/// To run this example:
/// 1. Start Kafka with Docker
///   docker run -d --name kafka -p 9092:9092 apache/kafka:latest
/// 2. Run the example
///   cargo run --example consume_partition

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    match run_main().await {
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {e:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<()> {
    let options = Options {
        bootstrap_servers: "localhost:9092".to_string(),
        healthcheck_timeout: 5000,
        log_level: "error".to_string(),
        ..Default::default()
    };

    let mut client = KafkaClient::new(options);
    client.health_check().await?;

    if !client.topic_exists("sensor-readings").await? {
        anyhow::bail!("Topic sensor-readings does not exist");
    }

    client.assign("sensor-readings", 0, "earliest", "message").await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        ctrl_c.cancel();
    });

    for _ in 0..10 {
        match client.pull(&cancel).await {
            Ok(message) => println!(
                "offset={} timestamp={:?} value={:?}",
                message.offset, message.timestamp, message.value
            ),
            Err(e) if e.is_decode() => eprintln!("Skipping message: {e}"),
            Err(e) if e.is_canceled() => break,
            Err(e) => {
                client.dispose();
                return Err(e.into());
            }
        }
    }

    client.dispose();
    Ok(())
}
