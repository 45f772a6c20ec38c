//! Bootstrap errors.

use core::fmt;

use crate::spec::SecurityProtocol;
use crate::topic::TopicConflict;

/// Errors reported by an admin transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdminError {
    /// No broker in the bootstrap list answered.
    #[error("brokers unreachable: {0}")]
    Unreachable(String),

    /// A request reached the cluster and was rejected.
    #[error("admin request failed: {0}")]
    Request(String),
}

/// Errors from [`configure_topics`](crate::configure_topics).
///
/// Nothing is rolled back: provisioned containers stay up and topics created
/// before a failure remain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    /// The bootstrap spec lists no brokers.
    #[error("no broker endpoints to bootstrap against")]
    NoBrokers,

    /// A SASL protocol was requested without credentials.
    #[error("security protocol {protocol} requires credentials")]
    MissingCredentials {
        /// The requested protocol.
        protocol: SecurityProtocol,
    },

    /// A topic definition is malformed.
    #[error("invalid topic '{topic}': {reason}")]
    InvalidTopic {
        /// Topic name.
        topic: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The broker cluster could not be reached.
    #[error("cannot reach brokers {servers}: {reason}")]
    BootstrapUnreachable {
        /// The bootstrap server list.
        servers: String,
        /// Transport-provided reason.
        reason: String,
    },

    /// Existing topics differ from their declarations; nothing was changed.
    #[error("topic configuration conflict: {}", Conflicts(.conflicts))]
    TopicConfigConflict {
        /// Every conflicting topic.
        conflicts: Vec<TopicConflict>,
    },

    /// Creating a topic failed.
    #[error("failed to create topic '{topic}': {reason}")]
    TopicCreateFailed {
        /// Topic name.
        topic: String,
        /// Transport-provided reason.
        reason: String,
    },

    /// Listing topics failed for a reason other than reachability.
    #[error(transparent)]
    Admin(AdminError),
}

impl BootstrapError {
    /// Returns `true` if retrying later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, BootstrapError::BootstrapUnreachable { .. })
    }

    pub(crate) fn from_admin(servers: &str, error: AdminError) -> Self {
        match error {
            AdminError::Unreachable(reason) => BootstrapError::BootstrapUnreachable {
                servers: servers.to_owned(),
                reason,
            },
            other => BootstrapError::Admin(other),
        }
    }
}

struct Conflicts<'a>(&'a [TopicConflict]);

impl fmt::Display for Conflicts<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, conflict) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{conflict}")?;
        }
        Ok(())
    }
}
