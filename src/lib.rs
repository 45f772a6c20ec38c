//! Declarative provisioning of a local development stack.
//!
//! Resources are declared into a dependency graph, created in dependency
//! order, and their runtime outputs (addresses, endpoints) drive the steps
//! that need them, such as creating Kafka topics once every broker is up.

pub use devstack_backend as backend;
pub use devstack_bootstrap as bootstrap;
pub use devstack_core as config;
pub use devstack_engine as engine;
pub use devstack_graph as graph;
pub use devstack_stack as stack;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use devstack_backend::{Backends, BackendError, SimulatedBackend};
    pub use devstack_bootstrap::{
        BootstrapError, BootstrapSpec, BrokerAdmin, InMemoryCluster, SaslCredentials,
        SecurityProtocol, TopicDef, configure_topics,
    };
    pub use devstack_core::{StackConfig, TracingFormat, TracingSetup};
    pub use devstack_engine::hooks::ProvisionEvent;
    pub use devstack_engine::{
        ApplyError, ApplyReport, EngineConfig, ProvisioningEngine, ResourceAction,
    };
    pub use devstack_graph::prelude::*;
    pub use devstack_stack::{Exports, Stack, StackError, StackOutcome};
}
