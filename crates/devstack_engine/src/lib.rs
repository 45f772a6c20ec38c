//! Dependency-ordered provisioning for devstack.
//!
//! [`ProvisioningEngine::apply`] walks a validated
//! [`DependencyGraph`](devstack_graph::DependencyGraph), creating each
//! resource through the configured [`Backends`](devstack_backend::Backends)
//! once everything it depends on is ready, and publishing its outputs into an
//! [`OutputResolver`](devstack_graph::OutputResolver).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use devstack_backend::{Backends, SimulatedBackend};
//! use devstack_engine::{EngineConfig, ProvisioningEngine};
//! use devstack_graph::resource::{ContainerSpec, ImageSpec, NetworkSpec, PortMapping};
//! use devstack_graph::{DependencyGraph, OutputResolver};
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let mut graph = DependencyGraph::new();
//! let net = graph.add("net", NetworkSpec::new("devstack-network")).unwrap();
//! let image = graph.add("mtz-image", ImageSpec::new("materialize/materialized:v0.6.1")).unwrap();
//! let mtz = graph
//!     .add(
//!         "mtz",
//!         ContainerSpec::new("mtz-container", image, net).with_port(PortMapping::same(6875)),
//!     )
//!     .unwrap();
//!
//! let engine = ProvisioningEngine::new(
//!     Backends::shared(Arc::new(SimulatedBackend::new())),
//!     EngineConfig::default(),
//! );
//! let resolver = OutputResolver::new();
//! let report = engine.apply(&graph, &resolver).await.unwrap();
//!
//! assert!(report.is_success());
//! assert_eq!(resolver.get(&mtz).unwrap().endpoint(), Some("127.0.0.1:6875"));
//! # });
//! ```

mod config;
mod engine;
mod error;
pub mod hooks;
mod report;
mod state;

pub use config::{DEFAULT_ADVERTISED_HOST, DEFAULT_MAX_CONCURRENCY, EngineConfig};
pub use engine::ProvisioningEngine;
pub use error::{ApplyError, ProvisioningFailure};
pub use report::{ApplyReport, ResourceAction, ResourceReport};
