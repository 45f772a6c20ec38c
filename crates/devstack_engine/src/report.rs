//! Per-resource results of an apply.

use core::fmt;
use core::time::Duration;

use devstack_backend::BackendError;
use devstack_graph::resource::{ResourceId, ResourceKind, ResourceState};

/// What the engine did to bring a resource to `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceAction {
    /// Nothing existed; the resource was created.
    Created,
    /// An existing resource already satisfied the declaration and was adopted.
    Unchanged,
    /// An existing resource was removed and created again.
    Replaced,
}

impl fmt::Display for ResourceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceAction::Created => f.write_str("created"),
            ResourceAction::Unchanged => f.write_str("unchanged"),
            ResourceAction::Replaced => f.write_str("replaced"),
        }
    }
}

/// Final status of one resource.
#[derive(Debug, Clone)]
pub struct ResourceReport {
    /// The resource.
    pub id: ResourceId,
    /// Its kind.
    pub kind: ResourceKind,
    /// Terminal state.
    pub state: ResourceState,
    /// Set when `state` is `Ready`.
    pub action: Option<ResourceAction>,
    /// Set when `state` is `Failed`.
    pub error: Option<BackendError>,
    /// Set when `state` is `Skipped`: the failed ancestor that caused it.
    pub cause: Option<ResourceId>,
}

/// Outcome of an apply: the status of every declared resource, in
/// topological order.
#[derive(Debug, Clone)]
pub struct ApplyReport {
    resources: Vec<ResourceReport>,
    duration: Duration,
}

impl ApplyReport {
    pub(crate) fn new(resources: Vec<ResourceReport>, duration: Duration) -> Self {
        Self {
            resources,
            duration,
        }
    }

    /// Returns every resource report in topological order.
    #[must_use]
    pub fn resources(&self) -> &[ResourceReport] {
        &self.resources
    }

    /// Returns the report for `id`.
    #[must_use]
    pub fn get(&self, id: &ResourceId) -> Option<&ResourceReport> {
        self.resources.iter().find(|report| &report.id == id)
    }

    /// Returns the terminal state of `id`.
    #[must_use]
    pub fn state(&self, id: &ResourceId) -> Option<ResourceState> {
        self.get(id).map(|report| report.state)
    }

    /// Returns the action taken for `id`, if it is `Ready`.
    #[must_use]
    pub fn action(&self, id: &ResourceId) -> Option<ResourceAction> {
        self.get(id).and_then(|report| report.action)
    }

    /// Returns the resources in `state`, in topological order.
    #[must_use]
    pub fn in_state(&self, state: ResourceState) -> Vec<&ResourceId> {
        self.resources
            .iter()
            .filter(|report| report.state == state)
            .map(|report| &report.id)
            .collect()
    }

    /// Returns the failed resources and their errors.
    #[must_use]
    pub fn failures(&self) -> Vec<(&ResourceId, &BackendError)> {
        self.resources
            .iter()
            .filter_map(|report| report.error.as_ref().map(|error| (&report.id, error)))
            .collect()
    }

    /// Returns `true` if every resource is `Ready`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.resources
            .iter()
            .all(|report| report.state == ResourceState::Ready)
    }

    /// Returns the wall time of the apply.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }
}
