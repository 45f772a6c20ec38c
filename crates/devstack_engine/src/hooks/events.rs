use core::time::Duration;

use devstack_backend::BackendError;
use devstack_graph::resource::{ResourceId, ResourceKind};

use crate::report::ResourceAction;

/// Event emitted during an apply.
///
/// Observers match on the variants they care about.
#[derive(Debug, Clone)]
pub enum ProvisionEvent {
    // ─────────────────────────────────────────────────────────────────────────
    // Apply-Level Events
    // ─────────────────────────────────────────────────────────────────────────
    /// The graph validated and provisioning is about to start.
    ApplyStart {
        /// Number of declared resources.
        resource_count: usize,
    },

    /// Every resource reached a terminal state.
    ApplyComplete {
        /// Resources that are `Ready`.
        ready: usize,
        /// Resources that are `Failed`.
        failed: usize,
        /// Resources that are `Skipped`.
        skipped: usize,
        /// Wall time of the apply.
        duration: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Resource Events
    // ─────────────────────────────────────────────────────────────────────────
    /// A resource moved to `Creating`.
    ResourceCreating {
        /// The resource.
        resource: ResourceId,
        /// Its kind.
        kind: ResourceKind,
    },

    /// A resource moved to `Ready` and its outputs were published.
    ResourceReady {
        /// The resource.
        resource: ResourceId,
        /// Its kind.
        kind: ResourceKind,
        /// What the engine did to make it ready.
        action: ResourceAction,
        /// Time spent in `Creating`.
        duration: Duration,
    },

    /// A resource moved to `Failed`.
    ResourceFailed {
        /// The resource.
        resource: ResourceId,
        /// Its kind.
        kind: ResourceKind,
        /// The backend error.
        error: BackendError,
    },

    /// A resource was skipped because an ancestor failed.
    ResourceSkipped {
        /// The resource.
        resource: ResourceId,
        /// Its kind.
        kind: ResourceKind,
        /// The failed ancestor.
        cause: ResourceId,
    },
}

impl ProvisionEvent {
    /// Returns the resource this event concerns, if it is a resource event.
    #[must_use]
    pub fn resource(&self) -> Option<&ResourceId> {
        match self {
            ProvisionEvent::ApplyStart { .. } | ProvisionEvent::ApplyComplete { .. } => None,
            ProvisionEvent::ResourceCreating { resource, .. }
            | ProvisionEvent::ResourceReady { resource, .. }
            | ProvisionEvent::ResourceFailed { resource, .. }
            | ProvisionEvent::ResourceSkipped { resource, .. } => Some(resource),
        }
    }
}
