//! The devstack topology.
//!
//! A [`Stack`] declares Materialize, Zookeeper, a configurable set of Kafka
//! brokers and an optional REST proxy on one network, provisions them with a
//! [`ProvisioningEngine`](devstack_engine::ProvisioningEngine), and creates
//! the configured topics as soon as every broker has published its endpoint.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use devstack_backend::{Backends, SimulatedBackend};
//! use devstack_bootstrap::{InMemoryCluster, TopicDef};
//! use devstack_core::StackConfig;
//! use devstack_stack::{Stack, exports};
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
//! # rt.block_on(async {
//! let mut config = StackConfig::default();
//! config.bootstrap.topics.push(TopicDef::new("orders", 3, 1));
//!
//! let cluster = InMemoryCluster::new();
//! let stack = Stack::new(
//!     config,
//!     Backends::shared(Arc::new(SimulatedBackend::new())),
//!     Arc::new(cluster.clone()),
//! )
//! .unwrap();
//!
//! let outcome = stack.up().await.unwrap();
//! assert_eq!(outcome.exports.get(exports::MATERIALIZE_URL), Some("127.0.0.1:6875"));
//! assert!(cluster.topic("orders").is_some());
//! # });
//! ```

mod error;
pub mod exports;
mod runtime;
mod stack;
pub mod topology;

pub use error::StackError;
pub use exports::Exports;
pub use runtime::connect;
pub use stack::{Stack, StackOutcome};
pub use topology::{BrokerWiring, Topology, kafka_broker};
