//! Backend traits consumed by the provisioning engine.

use core::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use devstack_graph::resource::{ImageSpec, NetworkSpec};

use crate::error::BackendError;
use crate::types::{AddressFuture, ContainerId, ContainerRecord, ContainerRequest, ImageId, NetworkRef};

/// Retrieves container images.
#[async_trait]
pub trait ImageBackend: Send + Sync + 'static {
    /// Fetches `spec.reference`, pulling it if it is not cached.
    ///
    /// # Errors
    ///
    /// [`BackendError::ImageNotFound`] if no registry knows the reference,
    /// [`BackendError::ImagePullFailed`] if the pull itself fails.
    async fn fetch(&self, spec: &ImageSpec) -> Result<ImageId, BackendError>;

    /// Returns the cached image for `reference`, if any.
    async fn inspect_image(&self, reference: &str) -> Result<Option<ImageId>, BackendError>;
}

/// Creates virtual networks.
#[async_trait]
pub trait NetworkBackend: Send + Sync + 'static {
    /// Creates the network.
    async fn create_network(&self, spec: &NetworkSpec) -> Result<NetworkRef, BackendError>;

    /// Returns the existing network called `name`, if any.
    async fn inspect_network(&self, name: &str) -> Result<Option<NetworkRef>, BackendError>;
}

/// Runs containers.
#[async_trait]
pub trait ContainerBackend: Send + Sync + 'static {
    /// Creates a container attached to `network`.
    ///
    /// The returned [`AddressFuture`] resolves once the container has been
    /// started and assigned an address.
    async fn create(
        &self,
        request: ContainerRequest<'_>,
        network: &NetworkRef,
    ) -> Result<(ContainerId, AddressFuture), BackendError>;

    /// Starts a created container.
    async fn start(&self, id: &ContainerId) -> Result<(), BackendError>;

    /// Returns the existing container called `name`, if any.
    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerRecord>, BackendError>;

    /// Removes a container, stopping it first if necessary.
    async fn remove(&self, id: &ContainerId) -> Result<(), BackendError>;
}

/// The set of backends an apply runs against.
#[derive(Clone)]
pub struct Backends {
    /// Image backend.
    pub images: Arc<dyn ImageBackend>,
    /// Network backend.
    pub networks: Arc<dyn NetworkBackend>,
    /// Container backend.
    pub containers: Arc<dyn ContainerBackend>,
}

impl Backends {
    /// Bundles three separate backends.
    pub fn new(
        images: Arc<dyn ImageBackend>,
        networks: Arc<dyn NetworkBackend>,
        containers: Arc<dyn ContainerBackend>,
    ) -> Self {
        Self {
            images,
            networks,
            containers,
        }
    }

    /// Uses one value that implements every backend trait.
    pub fn shared<B>(backend: Arc<B>) -> Self
    where
        B: ImageBackend + NetworkBackend + ContainerBackend,
    {
        Self {
            images: backend.clone(),
            networks: backend.clone(),
            containers: backend,
        }
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}
