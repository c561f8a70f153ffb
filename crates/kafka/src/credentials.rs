//! SASL credential and dialer construction.
//!
//! A [`Dialer`] is a plain value: building one has no side effects and the
//! result can be cloned and shared freely. Assignment and the health check
//! each build their own.

use crate::config::Options;
use crate::logging::LogSinks;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Connection-establishment timeout, independent of the health-check budget
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("unsupported mechanism SASL: {0}")]
    UnsupportedMechanism(String),

    #[error("SASL mechanism {0} requires a username and password")]
    MissingCredentials(String),
}

#[derive(Clone, PartialEq, Eq)]
pub enum SaslMechanism {
    Plain { username: String, password: String },
    ScramSha256 { username: String, password: String },
    ScramSha512 { username: String, password: String },
}

impl SaslMechanism {
    /// Mechanism name as the broker negotiates it
    pub fn name(&self) -> &'static str {
        match self {
            SaslMechanism::Plain { .. } => "PLAIN",
            SaslMechanism::ScramSha256 { .. } => "SCRAM-SHA-256",
            SaslMechanism::ScramSha512 { .. } => "SCRAM-SHA-512",
        }
    }

    pub fn username(&self) -> &str {
        match self {
            SaslMechanism::Plain { username, .. }
            | SaslMechanism::ScramSha256 { username, .. }
            | SaslMechanism::ScramSha512 { username, .. } => username,
        }
    }

    pub fn password(&self) -> &str {
        match self {
            SaslMechanism::Plain { password, .. }
            | SaslMechanism::ScramSha256 { password, .. }
            | SaslMechanism::ScramSha512 { password, .. } => password,
        }
    }
}

impl fmt::Debug for SaslMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslMechanism")
            .field("name", &self.name())
            .field("username", &self.username())
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Build the SASL capability for a mechanism name.
///
/// An empty name means no SASL. Any other name outside PLAIN and the two
/// SCRAM variants is rejected.
pub fn sasl_mechanism(
    name: &str,
    username: &str,
    password: &str,
) -> Result<Option<SaslMechanism>, CredentialError> {
    let (username, password) = (username.to_string(), password.to_string());
    let mechanism = match name {
        "" => return Ok(None),
        "PLAIN" => SaslMechanism::Plain { username, password },
        "SCRAM-SHA-256" => SaslMechanism::ScramSha256 { username, password },
        "SCRAM-SHA-512" => SaslMechanism::ScramSha512 { username, password },
        other => return Err(CredentialError::UnsupportedMechanism(other.to_string())),
    };

    if mechanism.username().is_empty() {
        return Err(CredentialError::MissingCredentials(name.to_string()));
    }

    Ok(Some(mechanism))
}

/// Everything a transport needs to open an authenticated connection.
#[derive(Debug, Clone)]
pub struct Dialer {
    pub timeout: Duration,
    pub sasl: Option<SaslMechanism>,
    /// TLS is required on every broker connection. Broker certificates are
    /// verified against the default trust store, and the minimum protocol
    /// version (TLS 1.2) is the one the linked OpenSSL enforces by default.
    pub tls: bool,
    pub sinks: LogSinks,
}

impl Dialer {
    /// Security protocol string the broker expects for this dialer
    pub fn security_protocol(&self) -> &'static str {
        match (&self.sasl, self.tls) {
            (Some(_), true) => "SASL_SSL",
            (None, true) => "SSL",
            (Some(_), false) => "SASL_PLAINTEXT",
            (None, false) => "PLAINTEXT",
        }
    }

    /// Copy of this dialer whose connection attempts give up after at most
    /// `budget`
    pub fn bounded_by(&self, budget: Duration) -> Dialer {
        Dialer {
            timeout: self.timeout.min(budget),
            ..self.clone()
        }
    }
}

/// Build a fresh dialer from the client options and the resolved log sinks.
pub fn build_dialer(options: &Options, sinks: LogSinks) -> Result<Dialer, CredentialError> {
    let sasl = sasl_mechanism(
        &options.sasl_mechanisms,
        &options.sasl_username,
        &options.sasl_password,
    )?;

    Ok(Dialer {
        timeout: DIAL_TIMEOUT,
        sasl,
        tls: options.uses_tls(),
        sinks,
    })
}
