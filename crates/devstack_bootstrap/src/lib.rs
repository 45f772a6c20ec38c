//! Post-provision broker bootstrap for devstack.
//!
//! Once every broker container has an address, the stack builds a
//! [`BootstrapSpec`] from their endpoints and calls [`configure_topics`] to
//! make sure the declared topics exist. The call is idempotent and never
//! alters an existing topic.
//!
//! The broker cluster is reached through the [`BrokerAdmin`] transport;
//! [`InMemoryCluster`] implements it without a real cluster.

mod admin;
mod configure;
mod error;
mod memory;
mod spec;
mod topic;

pub use admin::{AdminSession, BrokerAdmin};
pub use configure::configure_topics;
pub use error::{AdminError, BootstrapError};
pub use memory::InMemoryCluster;
pub use spec::{BootstrapSpec, ParseProtocolError, SaslCredentials, SecurityProtocol};
pub use topic::{TopicConflict, TopicDef, TopicReport, validate_topics};
