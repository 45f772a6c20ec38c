//! Configuration and logging for devstack.
//!
//! - [`StackConfig`] - the stack's configuration, loaded from defaults, an
//!   optional JSON file and `DEVSTACK_*` environment variables
//! - [`TracingSetup`] - installs the `tracing` subscriber

pub mod config;
mod error;
mod tracing_setup;

pub use config::{
    BootstrapConfig, BrokerConfig, ENV_PREFIX, KafkaConfig, ListenerRole, MaterializeConfig,
    RestProxyConfig, Runtime, StackConfig, ZookeeperConfig,
};
pub use error::ConfigError;
pub use tracing_setup::{TracingFormat, TracingSetup};
