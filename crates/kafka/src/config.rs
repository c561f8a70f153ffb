//! Client connection options.
//!
//! The same struct is used as a set of CLI flags (flattened into the binary's
//! subcommands) and as the camelCase JSON settings document a datasource is
//! configured with.

use crate::error::{Error, Result};
use crate::offset::EarliestStrategy;
use clap::Args;
use serde::Deserialize;

/// Default time budget for the health-check probe loop, in milliseconds
pub const DEFAULT_HEALTHCHECK_TIMEOUT_MS: u64 = 2000;

/// Security protocol value that wraps broker connections in TLS
pub const SASL_SSL: &str = "SASL_SSL";

#[derive(Debug, Clone, Args, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    /// Kafka bootstrap servers (comma-separated host:port list)
    #[arg(long, default_value = "localhost:9092", env = "KAFKA_BOOTSTRAP_SERVERS")]
    pub bootstrap_servers: String,

    /// Security protocol: PLAINTEXT or SASL_SSL
    #[arg(long, default_value = "PLAINTEXT", env = "KAFKA_SECURITY_PROTOCOL")]
    pub security_protocol: String,

    /// SASL mechanism: PLAIN, SCRAM-SHA-256 or SCRAM-SHA-512 (empty disables SASL)
    #[arg(long, default_value = "", env = "KAFKA_SASL_MECHANISMS")]
    pub sasl_mechanisms: String,

    /// SASL username
    #[arg(long, default_value = "", env = "KAFKA_SASL_USERNAME")]
    pub sasl_username: String,

    /// SASL password
    #[arg(long, default_value = "", env = "KAFKA_SASL_PASSWORD", hide_env_values = true)]
    pub sasl_password: String,

    /// Health check timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_HEALTHCHECK_TIMEOUT_MS, env = "KAFKA_HEALTHCHECK_TIMEOUT")]
    pub healthcheck_timeout: u64,

    /// Transport log level: debug, error (anything else disables transport logs)
    #[arg(long, default_value = "", env = "KAFKA_LOG_LEVEL")]
    pub log_level: String,

    /// How the "earliest" offset policy picks its start offset
    #[arg(long, value_enum, default_value_t = EarliestStrategy::default())]
    pub earliest_strategy: EarliestStrategy,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            security_protocol: "PLAINTEXT".to_string(),
            sasl_mechanisms: String::new(),
            sasl_username: String::new(),
            sasl_password: String::new(),
            healthcheck_timeout: DEFAULT_HEALTHCHECK_TIMEOUT_MS,
            log_level: String::new(),
            earliest_strategy: EarliestStrategy::default(),
        }
    }
}

impl Options {
    /// Parse a JSON settings document such as
    /// `{"bootstrapServers": "kafka:9092", "healthcheckTimeout": 5000}`.
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Options = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    /// Bootstrap servers split on commas, blanks dropped
    pub fn brokers(&self) -> Vec<String> {
        self.bootstrap_servers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn uses_tls(&self) -> bool {
        self.security_protocol == SASL_SSL
    }

    pub fn validate(&self) -> Result<()> {
        if self.brokers().is_empty() {
            return Err(Error::InvalidConfig(
                "bootstrap servers cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
