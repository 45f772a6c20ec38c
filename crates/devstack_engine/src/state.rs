//! Per-resource state table for one apply.

use core::time::Duration;

use devstack_backend::BackendError;
use devstack_graph::graph::DependencyGraph;
use devstack_graph::resource::{ResourceId, ResourceState};
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::report::{ApplyReport, ResourceAction, ResourceReport};

#[derive(Default)]
struct Entry {
    state: ResourceState,
    action: Option<ResourceAction>,
    error: Option<BackendError>,
    cause: Option<ResourceId>,
}

/// Lifecycle state of every resource, each behind its own lock.
///
/// Locks are only held for the duration of a transition, never across a
/// backend call.
pub(crate) struct StateTable {
    entries: IndexMap<ResourceId, Mutex<Entry>>,
}

impl StateTable {
    pub(crate) fn new(order: &[ResourceId]) -> Self {
        Self {
            entries: order
                .iter()
                .map(|id| (id.clone(), Mutex::new(Entry::default())))
                .collect(),
        }
    }

    pub(crate) fn state(&self, id: &ResourceId) -> Option<ResourceState> {
        self.entries.get(id).map(|entry| entry.lock().state)
    }

    /// # Panics
    ///
    /// Panics on an illegal transition.
    fn transition(&self, id: &ResourceId, next: ResourceState, update: impl FnOnce(&mut Entry)) {
        let Some(entry) = self.entries.get(id) else {
            panic!("resource '{id}' is not part of this apply");
        };
        let mut entry = entry.lock();
        assert!(
            entry.state.can_transition_to(next),
            "illegal state transition for '{id}': {} -> {next}",
            entry.state
        );
        entry.state = next;
        update(&mut entry);
    }

    pub(crate) fn begin(&self, id: &ResourceId) {
        self.transition(id, ResourceState::Creating, |_| {});
    }

    pub(crate) fn ready(&self, id: &ResourceId, action: ResourceAction) {
        self.transition(id, ResourceState::Ready, |entry| entry.action = Some(action));
    }

    pub(crate) fn fail(&self, id: &ResourceId, error: BackendError) {
        self.transition(id, ResourceState::Failed, |entry| entry.error = Some(error));
    }

    /// Skips `id` if it is still pending. Returns `true` if it was skipped.
    pub(crate) fn skip(&self, id: &ResourceId, cause: &ResourceId) -> bool {
        if self.state(id) != Some(ResourceState::Pending) {
            return false;
        }
        self.transition(id, ResourceState::Skipped, |entry| {
            entry.cause = Some(cause.clone());
        });
        true
    }

    /// Resources that did not reach `Ready`.
    pub(crate) fn unresolved(&self) -> Vec<ResourceId> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.lock().state != ResourceState::Ready)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub(crate) fn into_report(self, graph: &DependencyGraph, duration: Duration) -> ApplyReport {
        let resources = self
            .entries
            .into_iter()
            .filter_map(|(id, entry)| {
                let kind = graph.get(&id)?.kind();
                let entry = entry.into_inner();
                Some(ResourceReport {
                    id,
                    kind,
                    state: entry.state,
                    action: entry.action,
                    error: entry.error,
                    cause: entry.cause,
                })
            })
            .collect();
        ApplyReport::new(resources, duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_only_applies_to_pending() {
        let ids = [ResourceId::from("a"), ResourceId::from("b")];
        let table = StateTable::new(&ids);
        table.begin(&ids[0]);

        assert!(!table.skip(&ids[0], &ids[1]));
        assert!(table.skip(&ids[1], &ids[0]));
        assert!(!table.skip(&ids[1], &ids[0]));
        assert_eq!(table.state(&ids[1]), Some(ResourceState::Skipped));
    }

    #[test]
    #[should_panic(expected = "illegal state transition")]
    fn terminal_state_cannot_be_left() {
        let ids = [ResourceId::from("a")];
        let table = StateTable::new(&ids);
        table.begin(&ids[0]);
        table.ready(&ids[0], ResourceAction::Created);
        table.begin(&ids[0]);
    }
}
