//! Connection parameters for the broker cluster.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::BootstrapError;

/// Transport security protocol, passed to the admin client verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityProtocol {
    /// No encryption, no authentication.
    #[default]
    Plaintext,
    /// TLS, no authentication.
    Ssl,
    /// SASL authentication without encryption.
    SaslPlaintext,
    /// SASL authentication over TLS.
    SaslSsl,
}

impl SecurityProtocol {
    /// Returns the client configuration value, e.g. `SASL_SSL`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SecurityProtocol::Plaintext => "PLAINTEXT",
            SecurityProtocol::Ssl => "SSL",
            SecurityProtocol::SaslPlaintext => "SASL_PLAINTEXT",
            SecurityProtocol::SaslSsl => "SASL_SSL",
        }
    }

    /// Returns `true` for the SASL protocols.
    #[must_use]
    pub fn requires_credentials(self) -> bool {
        matches!(self, SecurityProtocol::SaslPlaintext | SecurityProtocol::SaslSsl)
    }
}

impl fmt::Display for SecurityProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown [`SecurityProtocol`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown security protocol '{0}'")]
pub struct ParseProtocolError(pub String);

impl FromStr for SecurityProtocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "PLAINTEXT" => Ok(SecurityProtocol::Plaintext),
            "SSL" => Ok(SecurityProtocol::Ssl),
            "SASL_PLAINTEXT" => Ok(SecurityProtocol::SaslPlaintext),
            "SASL_SSL" => Ok(SecurityProtocol::SaslSsl),
            _ => Err(ParseProtocolError(s.to_owned())),
        }
    }
}

fn default_mechanism() -> String {
    "PLAIN".to_owned()
}

/// SASL credential bundle.
///
/// `Debug` output redacts the password.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct SaslCredentials {
    /// SASL mechanism, e.g. `PLAIN` or `SCRAM-SHA-512`.
    #[serde(default = "default_mechanism")]
    pub mechanism: String,
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl SaslCredentials {
    /// Creates `PLAIN` credentials.
    pub fn plain(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            mechanism: default_mechanism(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Sets the mechanism.
    #[must_use]
    pub fn with_mechanism(mut self, mechanism: impl Into<String>) -> Self {
        self.mechanism = mechanism.into();
        self
    }
}

impl fmt::Debug for SaslCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslCredentials")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything needed to reach the broker cluster.
///
/// Built once every broker's address has resolved and consumed by one call
/// to [`configure_topics`](crate::configure_topics).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapSpec {
    /// Broker endpoints, `host:port`.
    pub brokers: Vec<String>,
    /// Transport security protocol.
    pub protocol: SecurityProtocol,
    /// Credentials for the SASL protocols.
    pub credentials: Option<SaslCredentials>,
}

impl BootstrapSpec {
    /// Creates a spec without credentials.
    pub fn new<I, S>(brokers: I, protocol: SecurityProtocol) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            brokers: brokers.into_iter().map(Into::into).collect(),
            protocol,
            credentials: None,
        }
    }

    /// Attaches SASL credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: SaslCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Returns the comma-joined broker list.
    #[must_use]
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }

    /// Checks the broker list and credentials without any I/O.
    ///
    /// # Errors
    ///
    /// [`BootstrapError::NoBrokers`] for an empty broker list, and
    /// [`BootstrapError::MissingCredentials`] for a SASL protocol without
    /// credentials.
    pub fn validate(&self) -> Result<(), BootstrapError> {
        if self.brokers.is_empty() {
            return Err(BootstrapError::NoBrokers);
        }
        if self.protocol.requires_credentials() && self.credentials.is_none() {
            return Err(BootstrapError::MissingCredentials {
                protocol: self.protocol,
            });
        }
        Ok(())
    }

    /// Renders the admin client configuration.
    ///
    /// SASL settings are only included for the SASL protocols.
    #[must_use]
    pub fn client_config(&self) -> BTreeMap<String, String> {
        let mut config = BTreeMap::new();
        config.insert("bootstrap.servers".to_owned(), self.bootstrap_servers());
        config.insert("security.protocol".to_owned(), self.protocol.to_string());

        if let (true, Some(credentials)) = (self.protocol.requires_credentials(), &self.credentials)
        {
            config.insert("sasl.mechanism".to_owned(), credentials.mechanism.clone());
            config.insert("sasl.username".to_owned(), credentials.username.clone());
            config.insert("sasl.password".to_owned(), credentials.password.clone());
        }
        config
    }
}
