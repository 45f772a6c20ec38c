//! Configuration errors.

use std::path::PathBuf;

/// Errors raised while loading or validating a [`StackConfig`](crate::StackConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        /// The file path.
        path: PathBuf,
        /// The I/O error.
        source: std::io::Error,
    },

    /// The work directory could not be made absolute.
    #[error("failed to resolve work directory {}: {source}", path.display())]
    WorkDir {
        /// The configured directory.
        path: PathBuf,
        /// The I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for a stack configuration.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// An environment override could not be applied.
    #[error("invalid value '{value}' for {var}: {reason}")]
    InvalidEnv {
        /// The variable name.
        var: String,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Two brokers share an ID.
    #[error("broker id {0} is declared more than once")]
    DuplicateBrokerId(u8),

    /// Two services would publish the same host port.
    #[error("host port {port} is used by both {first} and {second}")]
    PortConflict {
        /// The contested port.
        port: u16,
        /// The first service using it.
        first: String,
        /// The second service using it.
        second: String,
    },

    /// Any other invalid setting.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
