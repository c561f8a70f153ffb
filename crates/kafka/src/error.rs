use crate::credentials::CredentialError;
use crate::transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unable to build credentials: {0}")]
    Credential(#[source] CredentialError),

    #[error("Unable to initialize Kafka client: {0}")]
    InitFailed(#[source] CredentialError),

    #[error("Connection error while {context}: {source}")]
    Connection {
        context: String,
        #[source]
        source: TransportError,
    },

    #[error("Failed to resolve earliest offset for {topic}/{partition}: {source}")]
    OffsetResolutionFailed {
        topic: String,
        partition: i32,
        #[source]
        source: TransportError,
    },

    #[error("Error unmarshalling message at offset {offset}: {reason}")]
    Decode { offset: i64, reason: String },

    #[error("Health check timed out after {timeout_ms} ms{}", last_error_suffix(.last_error))]
    HealthCheckTimeout {
        timeout_ms: u64,
        #[source]
        last_error: Option<TransportError>,
    },

    #[error("Error reading partitions: {0}")]
    PartitionListFailed(#[source] TransportError),

    #[error("Failed to fetch cluster metadata: {0}")]
    MetadataFailed(#[source] TransportError),

    #[error("Error reading message from Kafka: {0}")]
    Read(#[source] TransportError),

    #[error("Pull canceled")]
    Canceled,

    #[error("No topic-partition assigned")]
    NotAssigned,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Decode failures drop a single message; the session stays usable.
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled)
    }
}

fn last_error_suffix(last_error: &Option<TransportError>) -> String {
    match last_error {
        Some(e) => format!(": {e}"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
