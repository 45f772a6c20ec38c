//! Broker admin transport.

use async_trait::async_trait;

use crate::error::AdminError;
use crate::spec::BootstrapSpec;
use crate::topic::TopicDef;

/// Opens admin sessions against a broker cluster.
///
/// Implementations take the security settings from
/// [`BootstrapSpec::client_config`] verbatim.
#[async_trait]
pub trait BrokerAdmin: Send + Sync {
    /// Connects to the cluster described by `spec`.
    ///
    /// # Errors
    ///
    /// [`AdminError::Unreachable`] if no broker answers.
    async fn connect(&self, spec: &BootstrapSpec) -> Result<Box<dyn AdminSession>, AdminError>;
}

/// An open admin session.
#[async_trait]
pub trait AdminSession: Send + Sync {
    /// Lists every topic with its current configuration.
    async fn list_topics(&self) -> Result<Vec<TopicDef>, AdminError>;

    /// Creates a topic.
    async fn create_topic(&self, topic: &TopicDef) -> Result<(), AdminError>;
}
