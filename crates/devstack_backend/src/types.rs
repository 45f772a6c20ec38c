//! Values exchanged with backends.

use core::fmt;

use devstack_graph::resource::ContainerSpec;
use futures::future::BoxFuture;

use crate::error::BackendError;

/// Backend identifier of a fetched image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageId(pub String);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend identifier of a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(pub String);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A created network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRef {
    /// Backend identifier.
    pub id: String,
    /// Runtime name.
    pub name: String,
}

/// Resolves to the address a started container was assigned on its network.
///
/// Fails if the container is removed or never starts.
pub type AddressFuture = BoxFuture<'static, Result<String, BackendError>>;

/// Everything the container backend needs to create a container.
#[derive(Debug, Clone, Copy)]
pub struct ContainerRequest<'a> {
    /// Declared container configuration.
    pub spec: &'a ContainerSpec,
    /// The fetched image to run.
    pub image: &'a ImageId,
    /// Fingerprint of `spec`, stored with the container for later inspection.
    pub fingerprint: &'a str,
}

/// Observed runtime status of an existing container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    /// Created but never started.
    Created,
    /// Running.
    Running,
    /// Stopped, normally or with an error.
    Exited,
}

/// What the backend knows about an existing container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    /// Backend identifier.
    pub id: ContainerId,
    /// Fingerprint stored at creation.
    pub fingerprint: String,
    /// Current status.
    pub status: ContainerStatus,
    /// Address on the network, once started.
    pub address: Option<String>,
}

impl ContainerRecord {
    /// Returns `true` if the container is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == ContainerStatus::Running
    }
}
