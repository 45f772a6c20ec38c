//! Backend interfaces for devstack.
//!
//! The provisioning engine never talks to a container runtime directly. It
//! drives three collaborator traits:
//!
//! - [`ImageBackend`] - fetches images
//! - [`NetworkBackend`] - creates the shared network
//! - [`ContainerBackend`] - creates, starts, inspects and removes containers
//!
//! Each trait also exposes an inspect operation so that a re-apply can adopt
//! resources that already satisfy their declaration. [`Backends`] bundles one
//! implementation of each.
//!
//! [`SimulatedBackend`] implements all three in memory. With the `docker`
//! feature, `DockerBackend` implements them against the local Docker daemon.

mod backend;
#[cfg(feature = "docker")]
pub mod docker;
mod error;
pub mod simulated;
mod types;

pub use backend::{Backends, ContainerBackend, ImageBackend, NetworkBackend};
#[cfg(feature = "docker")]
pub use docker::DockerBackend;
pub use error::BackendError;
pub use simulated::{BackendCall, SimulatedBackend};
pub use types::{
    AddressFuture, ContainerId, ContainerRecord, ContainerRequest, ContainerStatus, ImageId,
    NetworkRef,
};
