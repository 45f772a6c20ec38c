//! An in-memory backend for tests and dry runs.
//!
//! [`SimulatedBackend`] implements every backend trait without touching a
//! container runtime. Networks get subnets `172.18.0.0/16`, `172.19.0.0/16`
//! and so on, in creation order; containers get host addresses from `.2`
//! upward on their network, in start order. Failures can be injected per
//! image reference, network name or container name, and every operation can
//! be slowed down by a fixed latency.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use devstack_graph::resource::{ImageSpec, NetworkSpec};
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::backend::{ContainerBackend, ImageBackend, NetworkBackend};
use crate::error::BackendError;
use crate::types::{
    AddressFuture, ContainerId, ContainerRecord, ContainerRequest, ContainerStatus, ImageId,
    NetworkRef,
};

const HEX: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
];

fn backend_id() -> String {
    nanoid::nanoid!(12, &HEX)
}

/// A backend operation, as recorded by [`SimulatedBackend::calls`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    /// `fetch` of an image reference.
    FetchImage(String),
    /// `create_network` of a network name.
    CreateNetwork(String),
    /// `create` of a container name.
    CreateContainer(String),
    /// `start` of a container name.
    StartContainer(String),
    /// `remove` of a container name.
    RemoveContainer(String),
}

struct SimNetwork {
    reference: NetworkRef,
    subnet: u8,
    next_host: u8,
}

struct SimContainer {
    id: ContainerId,
    network: String,
    fingerprint: String,
    status: ContainerStatus,
    address: Option<String>,
    address_tx: Option<oneshot::Sender<String>>,
}

impl SimContainer {
    fn record(&self) -> ContainerRecord {
        ContainerRecord {
            id: self.id.clone(),
            fingerprint: self.fingerprint.clone(),
            status: self.status,
            address: self.address.clone(),
        }
    }
}

#[derive(Default)]
struct SimState {
    networks: HashMap<String, SimNetwork>,
    images: HashMap<String, ImageId>,
    containers: HashMap<String, SimContainer>,
    names: HashMap<ContainerId, String>,
    missing_images: HashSet<String>,
    image_failures: HashMap<String, String>,
    network_failures: HashMap<String, String>,
    container_failures: HashMap<String, String>,
    calls: Vec<BackendCall>,
}

/// Decrements the in-flight counter when an operation finishes.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory image, network and container backend.
#[derive(Default)]
pub struct SimulatedBackend {
    state: Mutex<SimState>,
    latency: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl core::fmt::Debug for SimulatedBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimulatedBackend")
            .field("networks", &state.networks.len())
            .field("images", &state.images.len())
            .field("containers", &state.containers.len())
            .field("latency", &self.latency)
            .finish()
    }
}

impl SimulatedBackend {
    /// Creates an empty backend with no latency.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every operation by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes `fetch` of `reference` fail with `ImageNotFound`.
    pub fn missing_image(&self, reference: impl Into<String>) {
        self.state.lock().missing_images.insert(reference.into());
    }

    /// Makes `fetch` of `reference` fail with `ImagePullFailed`.
    pub fn fail_image(&self, reference: impl Into<String>, reason: impl Into<String>) {
        self.state
            .lock()
            .image_failures
            .insert(reference.into(), reason.into());
    }

    /// Makes `create_network` of `name` fail with `NetworkCreateFailed`.
    pub fn fail_network(&self, name: impl Into<String>, reason: impl Into<String>) {
        self.state
            .lock()
            .network_failures
            .insert(name.into(), reason.into());
    }

    /// Makes `create` of the container `name` fail with `ContainerCreateFailed`.
    pub fn fail_container(&self, name: impl Into<String>, reason: impl Into<String>) {
        self.state
            .lock()
            .container_failures
            .insert(name.into(), reason.into());
    }

    /// Removes every injected failure.
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.missing_images.clear();
        state.image_failures.clear();
        state.network_failures.clear();
        state.container_failures.clear();
    }

    /// Marks the running container `name` as exited. Returns `false` if no
    /// such container exists.
    pub fn stop_container(&self, name: &str) -> bool {
        match self.state.lock().containers.get_mut(name) {
            Some(container) => {
                container.status = ContainerStatus::Exited;
                true
            }
            None => false,
        }
    }

    /// Returns the current record of the container `name`.
    #[must_use]
    pub fn container(&self, name: &str) -> Option<ContainerRecord> {
        self.state.lock().containers.get(name).map(SimContainer::record)
    }

    /// Returns every operation performed so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }

    /// Returns the largest number of operations that were in progress at
    /// the same time.
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn begin(&self, call: BackendCall) -> InFlight<'_> {
        self.state.lock().calls.push(call);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        guard
    }
}

#[async_trait]
impl ImageBackend for SimulatedBackend {
    async fn fetch(&self, spec: &ImageSpec) -> Result<ImageId, BackendError> {
        let _op = self
            .begin(BackendCall::FetchImage(spec.reference.clone()))
            .await;

        let mut state = self.state.lock();
        if state.missing_images.contains(&spec.reference) {
            return Err(BackendError::ImageNotFound {
                reference: spec.reference.clone(),
            });
        }
        if let Some(reason) = state.image_failures.get(&spec.reference) {
            return Err(BackendError::ImagePullFailed {
                reference: spec.reference.clone(),
                reason: reason.clone(),
            });
        }

        let id = state
            .images
            .entry(spec.reference.clone())
            .or_insert_with(|| ImageId(format!("sha256:{}", backend_id())))
            .clone();
        tracing::debug!(reference = %spec.reference, id = %id, "image fetched");
        Ok(id)
    }

    async fn inspect_image(&self, reference: &str) -> Result<Option<ImageId>, BackendError> {
        Ok(self.state.lock().images.get(reference).cloned())
    }
}

#[async_trait]
impl NetworkBackend for SimulatedBackend {
    async fn create_network(&self, spec: &NetworkSpec) -> Result<NetworkRef, BackendError> {
        let _op = self
            .begin(BackendCall::CreateNetwork(spec.name.clone()))
            .await;

        let mut state = self.state.lock();
        let failed = |reason: &str| BackendError::NetworkCreateFailed {
            name: spec.name.clone(),
            reason: reason.to_owned(),
        };
        if let Some(reason) = state.network_failures.get(&spec.name) {
            return Err(failed(reason));
        }
        if state.networks.contains_key(&spec.name) {
            return Err(failed("a network with this name already exists"));
        }
        let subnet = u8::try_from(state.networks.len())
            .ok()
            .filter(|index| *index < 200)
            .ok_or_else(|| failed("no free subnet"))?;

        let reference = NetworkRef {
            id: backend_id(),
            name: spec.name.clone(),
        };
        state.networks.insert(
            spec.name.clone(),
            SimNetwork {
                reference: reference.clone(),
                subnet,
                next_host: 2,
            },
        );
        tracing::debug!(name = %spec.name, id = %reference.id, "network created");
        Ok(reference)
    }

    async fn inspect_network(&self, name: &str) -> Result<Option<NetworkRef>, BackendError> {
        Ok(self
            .state
            .lock()
            .networks
            .get(name)
            .map(|network| network.reference.clone()))
    }
}

#[async_trait]
impl ContainerBackend for SimulatedBackend {
    async fn create(
        &self,
        request: ContainerRequest<'_>,
        network: &NetworkRef,
    ) -> Result<(ContainerId, AddressFuture), BackendError> {
        let name = request.spec.name.clone();
        let _op = self
            .begin(BackendCall::CreateContainer(name.clone()))
            .await;

        let mut state = self.state.lock();
        let failed = |reason: &str| BackendError::container_create_failed(name.clone(), reason);
        if let Some(reason) = state.container_failures.get(&name) {
            return Err(failed(reason));
        }
        if state.containers.contains_key(&name) {
            return Err(failed("a container with this name already exists"));
        }
        if !state.networks.contains_key(&network.name) {
            return Err(failed(&format!("network '{}' does not exist", network.name)));
        }
        if !state.images.values().any(|image| image == request.image) {
            return Err(failed(&format!("image '{}' is not present", request.image)));
        }

        let id = ContainerId(backend_id());
        let (address_tx, address_rx) = oneshot::channel();
        state.names.insert(id.clone(), name.clone());
        state.containers.insert(
            name.clone(),
            SimContainer {
                id: id.clone(),
                network: network.name.clone(),
                fingerprint: request.fingerprint.to_owned(),
                status: ContainerStatus::Created,
                address: None,
                address_tx: Some(address_tx),
            },
        );
        tracing::debug!(name = %name, id = %id, "container created");

        let address: AddressFuture = Box::pin(async move {
            address_rx.await.map_err(|_| {
                BackendError::container_create_failed(
                    name,
                    "container was removed before it was assigned an address",
                )
            })
        });
        Ok((id, address))
    }

    async fn start(&self, id: &ContainerId) -> Result<(), BackendError> {
        let name = self
            .state
            .lock()
            .names
            .get(id)
            .cloned()
            .ok_or_else(|| BackendError::backend(format!("no such container: {id}")))?;
        let _op = self.begin(BackendCall::StartContainer(name.clone())).await;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let container = state.containers.get_mut(&name).ok_or_else(|| {
            BackendError::container_create_failed(name.clone(), "container was removed")
        })?;

        if container.address.is_none() {
            let network = state.networks.get_mut(&container.network).ok_or_else(|| {
                BackendError::container_create_failed(name.clone(), "network was removed")
            })?;
            if network.next_host == u8::MAX {
                return Err(BackendError::container_create_failed(
                    name,
                    "network address pool exhausted",
                ));
            }
            let address = format!("172.{}.0.{}", 18 + network.subnet, network.next_host);
            network.next_host += 1;
            container.address = Some(address);
        }
        container.status = ContainerStatus::Running;

        if let (Some(tx), Some(address)) = (container.address_tx.take(), &container.address) {
            let _ = tx.send(address.clone());
        }
        tracing::debug!(name = %name, address = ?container.address, "container started");
        Ok(())
    }

    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerRecord>, BackendError> {
        Ok(self.container(name))
    }

    async fn remove(&self, id: &ContainerId) -> Result<(), BackendError> {
        let name = self
            .state
            .lock()
            .names
            .get(id)
            .cloned()
            .ok_or_else(|| BackendError::backend(format!("no such container: {id}")))?;
        let _op = self
            .begin(BackendCall::RemoveContainer(name.clone()))
            .await;

        let mut state = self.state.lock();
        state.names.remove(id);
        state.containers.remove(&name);
        tracing::debug!(name = %name, id = %id, "container removed");
        Ok(())
    }
}
