//! Resource types for the provisioning graph.
//!
//! A [`Resource`] is the atomic declarative unit: a network, an image, or a
//! container. Each resource carries an immutable [`ResourceSpec`], the set of
//! resources it depends on, and (once provisioned) a write-once set of
//! [`Outputs`].

use core::fmt;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// ResourceId
// ─────────────────────────────────────────────────────────────────────────────

/// Unique, process-wide name of a declared resource.
///
/// Internally uses `Arc<str>` for cheap cloning (reference count bump only).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(Arc<str>);

impl ResourceId {
    /// Creates a resource ID from a name.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ResourceId {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&ResourceId> for ResourceId {
    fn from(id: &ResourceId) -> Self {
        id.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ResourceKind / ResourceState
// ─────────────────────────────────────────────────────────────────────────────

/// The kind of infrastructure a resource declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A shared virtual network.
    Network,
    /// A container image.
    Image,
    /// A running container.
    Container,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Network => f.write_str("network"),
            ResourceKind::Image => f.write_str("image"),
            ResourceKind::Container => f.write_str("container"),
        }
    }
}

/// Lifecycle state of a resource during an apply.
///
/// ```text
/// Pending ──► Creating ──► Ready
///    │            └──────► Failed
///    └──────► Skipped
/// ```
///
/// `Ready`, `Failed` and `Skipped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    /// Declared, not yet started.
    #[default]
    Pending,
    /// Creation in progress.
    Creating,
    /// Created and outputs published.
    Ready,
    /// Creation failed.
    Failed,
    /// Never started because an ancestor failed.
    Skipped,
}

impl ResourceState {
    /// Returns `true` for `Ready`, `Failed` and `Skipped`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ResourceState::Ready | ResourceState::Failed | ResourceState::Skipped
        )
    }

    /// Returns `true` if moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, next: ResourceState) -> bool {
        matches!(
            (self, next),
            (ResourceState::Pending, ResourceState::Creating)
                | (ResourceState::Pending, ResourceState::Skipped)
                | (ResourceState::Creating, ResourceState::Ready)
                | (ResourceState::Creating, ResourceState::Failed)
        )
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceState::Pending => "pending",
            ResourceState::Creating => "creating",
            ResourceState::Ready => "ready",
            ResourceState::Failed => "failed",
            ResourceState::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Declared specs
// ─────────────────────────────────────────────────────────────────────────────

/// Declared configuration of a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Name of the network in the container runtime.
    pub name: String,
}

impl NetworkSpec {
    /// Creates a network spec.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Declared configuration of an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    /// Registry reference, e.g. `bitnami/kafka:latest`.
    pub reference: String,
    /// Keep the image in the local cache after the stack is torn down.
    pub keep_locally: bool,
}

impl ImageSpec {
    /// Creates an image spec that is kept locally.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            keep_locally: true,
        }
    }
}

/// A published container port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMapping {
    /// Port inside the container.
    pub internal: u16,
    /// Port on the host.
    pub external: u16,
}

impl PortMapping {
    /// Publishes `port` on the same host port.
    #[must_use]
    pub fn same(port: u16) -> Self {
        Self {
            internal: port,
            external: port,
        }
    }
}

/// A host path mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Absolute path on the host.
    pub host: PathBuf,
    /// Path inside the container.
    pub container: String,
    /// Mount read-only.
    pub read_only: bool,
}

impl VolumeMount {
    /// Mounts `host` read-only at `container`.
    #[must_use]
    pub fn read_only(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            read_only: true,
        }
    }
}

/// Container restart policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Never restart.
    No,
    /// Restart when the container exits with an error.
    ///
    /// A container found stopped on re-apply is recreated.
    #[default]
    OnFailure,
    /// Always restart.
    Always,
}

/// Declared configuration of a container.
///
/// `image` and `network` name other resources in the graph; declaring a
/// container adds them to its dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Container name in the runtime.
    pub name: String,
    /// The image resource this container runs.
    pub image: ResourceId,
    /// The network resource this container joins.
    pub network: ResourceId,
    /// Published ports.
    pub ports: Vec<PortMapping>,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
    /// Command arguments.
    pub command: Vec<String>,
    /// Host paths mounted into the container.
    pub mounts: Vec<VolumeMount>,
    /// Restart policy.
    pub restart: RestartPolicy,
}

impl ContainerSpec {
    /// Creates a container spec with no ports, environment or command.
    #[must_use]
    pub fn new(name: impl Into<String>, image: ResourceId, network: ResourceId) -> Self {
        Self {
            name: name.into(),
            image,
            network,
            ports: Vec::new(),
            env: BTreeMap::new(),
            command: Vec::new(),
            mounts: Vec::new(),
            restart: RestartPolicy::default(),
        }
    }

    /// Adds a published port.
    #[must_use]
    pub fn with_port(mut self, port: PortMapping) -> Self {
        self.ports.push(port);
        self
    }

    /// Sets an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.env.insert(key.into(), value.to_string());
        self
    }

    /// Sets the command arguments.
    #[must_use]
    pub fn with_command<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = args.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a mounted host path.
    #[must_use]
    pub fn with_mount(mut self, mount: VolumeMount) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Sets the restart policy.
    #[must_use]
    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }
}

/// The declared, immutable configuration of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    /// A network.
    Network(NetworkSpec),
    /// An image.
    Image(ImageSpec),
    /// A container.
    Container(ContainerSpec),
}

impl ResourceSpec {
    /// Returns the kind of resource this spec declares.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Network(_) => ResourceKind::Network,
            ResourceSpec::Image(_) => ResourceKind::Image,
            ResourceSpec::Container(_) => ResourceKind::Container,
        }
    }

    /// Resources this spec references by ID, with the kind each must have.
    #[must_use]
    pub fn references(&self) -> Vec<(ResourceId, ResourceKind)> {
        match self {
            ResourceSpec::Container(spec) => vec![
                (spec.network.clone(), ResourceKind::Network),
                (spec.image.clone(), ResourceKind::Image),
            ],
            ResourceSpec::Network(_) | ResourceSpec::Image(_) => Vec::new(),
        }
    }

    /// Stable textual fingerprint of the declared configuration.
    ///
    /// Two specs have equal fingerprints exactly when they are equal. Backends
    /// store it alongside created resources so a re-apply can tell whether an
    /// existing resource already satisfies the declaration.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

impl From<NetworkSpec> for ResourceSpec {
    fn from(spec: NetworkSpec) -> Self {
        ResourceSpec::Network(spec)
    }
}

impl From<ImageSpec> for ResourceSpec {
    fn from(spec: ImageSpec) -> Self {
        ResourceSpec::Image(spec)
    }
}

impl From<ContainerSpec> for ResourceSpec {
    fn from(spec: ContainerSpec) -> Self {
        ResourceSpec::Container(spec)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resource
// ─────────────────────────────────────────────────────────────────────────────

/// A declared resource: identity, spec and explicit dependencies.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Unique name.
    pub id: ResourceId,
    /// Declared configuration.
    pub spec: ResourceSpec,
    /// Resources that must be `Ready` before this one is created, in
    /// declaration order without duplicates.
    pub dependencies: Vec<ResourceId>,
}

impl Resource {
    /// Returns the resource's kind.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }

    /// Returns `true` if this resource directly depends on `other`.
    #[must_use]
    pub fn depends_on(&self, other: &ResourceId) -> bool {
        self.dependencies.contains(other)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outputs
// ─────────────────────────────────────────────────────────────────────────────

/// Well-known output keys.
pub mod keys {
    /// Backend identifier of the resource.
    pub const ID: &str = "id";
    /// Runtime name of the resource.
    pub const NAME: &str = "name";
    /// Image reference that was fetched.
    pub const REFERENCE: &str = "reference";
    /// Address assigned on the shared network.
    pub const ADDRESS: &str = "address";
    /// Externally reachable `host:port`.
    pub const ENDPOINT: &str = "endpoint";
}

/// Runtime-determined values a resource exposes once `Ready`.
///
/// Outputs are assembled by the provisioning engine and frozen when
/// published; consumers only ever see them behind a shared reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Outputs(BTreeMap<String, String>);

impl Outputs {
    /// Creates an empty output set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key/value pair.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns the assigned network address, if any.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.get(keys::ADDRESS)
    }

    /// Returns the externally reachable endpoint, if any.
    #[must_use]
    pub fn endpoint(&self) -> Option<&str> {
        self.get(keys::ENDPOINT)
    }

    /// Iterates over all outputs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of outputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no outputs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
