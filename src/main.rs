//! Command-line interface for kafka-datasource
//!
//! # Usage Examples
//!
//! ```bash
//! # Probe the brokers (SASL over TLS)
//! kafka-datasource health-check \
//!   --bootstrap-servers broker-1:9093,broker-2:9093 \
//!   --security-protocol SASL_SSL \
//!   --sasl-mechanisms SCRAM-SHA-512 \
//!   --sasl-username app --sasl-password secret \
//!   --healthcheck-timeout 5000
//!
//! # Read 100 messages starting at most 100 behind the head of partition 0
//! kafka-datasource consume --topic sensors --partition 0 \
//!   --offset earliest --max-messages 100
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use kafka_datasource::client::{CancellationToken, KafkaClient, Options};
use kafka_datasource::{run_pull_loop, StopReason};
use tracing::info;

#[derive(Parser)]
#[command(name = "kafka-datasource")]
#[command(about = "Read decoded messages from a Kafka topic-partition and probe broker health")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the bootstrap brokers answer within the health-check timeout
    HealthCheck {
        #[command(flatten)]
        options: Options,
    },

    /// Check whether a topic exists in the cluster metadata
    TopicExists {
        /// Topic name
        #[arg(long)]
        topic: String,

        #[command(flatten)]
        options: Options,
    },

    /// Print decoded messages from one topic-partition as JSON lines
    Consume {
        /// Topic to read from
        #[arg(long)]
        topic: String,

        /// Partition index
        #[arg(long, default_value_t = 0)]
        partition: i32,

        /// Offset policy: latest or earliest (anything else means latest)
        #[arg(long, default_value = "latest")]
        offset: String,

        /// Timestamp mode forwarded to the session
        #[arg(long, default_value = "message")]
        timestamp_mode: String,

        /// Stop after this many decoded messages
        #[arg(long)]
        max_messages: Option<u64>,

        #[command(flatten)]
        options: Options,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::HealthCheck { options } => {
            options.validate()?;
            let client = KafkaClient::new(options);
            client.health_check().await.context("Health check failed")?;
            println!("ok");
        }
        Commands::TopicExists { topic, options } => {
            options.validate()?;
            let client = KafkaClient::new(options);
            let exists = client
                .topic_exists(&topic)
                .await
                .with_context(|| format!("Failed to look up topic {topic}"))?;
            println!("{exists}");
        }
        Commands::Consume {
            topic,
            partition,
            offset,
            timestamp_mode,
            max_messages,
            options,
        } => {
            options.validate()?;
            let mut client = KafkaClient::new(options);
            client
                .assign(&topic, partition, &offset, &timestamp_mode)
                .await
                .with_context(|| format!("Failed to assign {topic}/{partition}"))?;

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl-C, stopping");
                    on_signal.cancel();
                }
            });

            let result = run_pull_loop(&mut client, &cancel, max_messages, |message| {
                println!("{}", serde_json::to_string(&message)?);
                Ok(())
            })
            .await;
            client.dispose();

            let summary = result?;
            info!(
                "Consumed {} messages from {topic}/{partition} ({} skipped, {})",
                summary.delivered,
                summary.skipped,
                match summary.stop {
                    StopReason::Canceled => "canceled",
                    StopReason::LimitReached => "limit reached",
                }
            );
        }
    }

    Ok(())
}
