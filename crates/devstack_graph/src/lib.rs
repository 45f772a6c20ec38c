//! Declarative resource graph for devstack.
//!
//! `devstack_graph` provides the core abstractions for describing a local
//! development environment as a directed acyclic graph of infrastructure
//! resources, and for reacting to the values those resources produce once
//! they exist.
//!
//! # Core Concepts
//!
//! - [`Resource`] - A declared network, image or container
//! - [`DependencyGraph`] - Resources plus "must be ready before" edges
//! - [`OutputResolver`] - Write-once outputs with single-fire continuations
//!
//! # Example
//!
//! ```
//! use devstack_graph::{DependencyGraph, OutputResolver};
//! use devstack_graph::resource::{ContainerSpec, ImageSpec, NetworkSpec, Outputs, keys};
//!
//! let mut graph = DependencyGraph::new();
//! let net = graph.add("net", NetworkSpec::new("devstack-network"))?;
//! let image = graph.add("kafka-image", ImageSpec::new("bitnami/kafka:latest"))?;
//! let broker = graph.add("broker", ContainerSpec::new("kafka-broker1", image, net))?;
//! graph.validate()?;
//!
//! let resolver = OutputResolver::new();
//! resolver.subscribe(&broker, |outputs| {
//!     println!("broker is at {:?}", outputs.address());
//! });
//! resolver.publish(&broker, Outputs::new().with(keys::ADDRESS, "172.18.0.3"));
//! # Ok::<(), devstack_graph::GraphError>(())
//! ```

/// Dependency graph construction, validation and ordering.
pub mod graph;

/// Write-once outputs and continuations.
pub mod output;

/// Resource identity, specs, states and outputs.
pub mod resource;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::graph::{DependencyGraph, GraphError};
    pub use crate::output::{Continuation, Delivery, OutputHandle, OutputResolver};
    pub use crate::resource::{
        ContainerSpec, ImageSpec, NetworkSpec, Outputs, PortMapping, Resource, ResourceId,
        ResourceKind, ResourceSpec, ResourceState, RestartPolicy, VolumeMount, keys,
    };
}

pub use graph::{DependencyGraph, GraphError};
pub use output::{OutputHandle, OutputResolver};
pub use resource::{Outputs, Resource, ResourceId, ResourceKind, ResourceSpec, ResourceState};
