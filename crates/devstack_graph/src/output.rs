//! Output resolution.
//!
//! Resources expose runtime-determined [`Outputs`] (an assigned address, a
//! backend ID) only once they are ready. The [`OutputResolver`] hands out
//! [`OutputHandle`]s to those eventual values and runs single-fire
//! continuations when they arrive.
//!
//! # Guarantees
//!
//! - `publish` happens exactly once per resource; a second call panics.
//! - A continuation registered before `publish` runs exactly once, after it.
//! - A continuation registered after `publish` runs immediately, on the
//!   calling thread.
//! - Continuations for the same resource never run concurrently with each
//!   other.
//! - A resource that will never resolve (it failed, or was skipped) is
//!   abandoned: its queued continuations are dropped unrun and waiters
//!   observe `None`.
//!
//! # Example
//!
//! ```
//! use devstack_graph::output::OutputResolver;
//! use devstack_graph::resource::{Outputs, ResourceId, keys};
//!
//! let resolver = OutputResolver::new();
//! let broker = ResourceId::from("kafka-broker1");
//!
//! resolver.subscribe(&broker, |outputs| {
//!     assert_eq!(outputs.address(), Some("172.18.0.4"));
//! });
//!
//! resolver.publish(&broker, Outputs::new().with(keys::ADDRESS, "172.18.0.4"));
//! assert!(resolver.handle(&broker).is_resolved());
//! ```

use core::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, ReentrantMutex, RwLock};

use crate::resource::{Outputs, ResourceId};

/// A single-fire callback receiving a resource's published outputs.
pub type Continuation = Box<dyn FnOnce(Arc<Outputs>) + Send + 'static>;

/// What happened to a continuation passed to `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The outputs were already published; the continuation has run.
    Immediate,
    /// The continuation is queued until the outputs are published.
    Queued,
    /// The resource was abandoned; the continuation was dropped unrun.
    Dropped,
}

enum SlotState {
    Pending(Vec<Continuation>),
    Resolved(Arc<Outputs>),
    Abandoned,
}

/// Storage for one resource's eventual outputs.
struct OutputSlot {
    state: Mutex<SlotState>,
    /// Held while continuations run, so that late subscribers wait for the
    /// publisher to finish dispatching. Reentrant so a continuation may
    /// subscribe to its own resource.
    dispatch: ReentrantMutex<()>,
}

impl OutputSlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending(Vec::new())),
            dispatch: ReentrantMutex::new(()),
        }
    }

    fn get(&self) -> Option<Arc<Outputs>> {
        match &*self.state.lock() {
            SlotState::Resolved(outputs) => Some(Arc::clone(outputs)),
            SlotState::Pending(_) | SlotState::Abandoned => None,
        }
    }

    fn subscribe(&self, continuation: Continuation) -> Delivery {
        let ready = {
            let mut state = self.state.lock();
            match &mut *state {
                SlotState::Pending(queue) => {
                    queue.push(continuation);
                    return Delivery::Queued;
                }
                SlotState::Resolved(outputs) => Arc::clone(outputs),
                SlotState::Abandoned => return Delivery::Dropped,
            }
        };

        let _dispatch = self.dispatch.lock();
        continuation(ready);
        Delivery::Immediate
    }

    fn publish(&self, resource: &ResourceId, outputs: Outputs) -> usize {
        let _dispatch = self.dispatch.lock();
        let (queue, outputs) = {
            let mut state = self.state.lock();
            let outputs = Arc::new(outputs);
            match core::mem::replace(&mut *state, SlotState::Resolved(Arc::clone(&outputs))) {
                SlotState::Pending(queue) => (queue, outputs),
                SlotState::Resolved(_) => {
                    panic!("outputs for resource '{resource}' were already published")
                }
                SlotState::Abandoned => {
                    panic!("resource '{resource}' was abandoned and cannot publish outputs")
                }
            }
        };

        let fired = queue.len();
        for continuation in queue {
            continuation(Arc::clone(&outputs));
        }
        fired
    }

    fn abandon(&self) -> Option<usize> {
        let mut state = self.state.lock();
        match &*state {
            SlotState::Pending(queue) => {
                let dropped = queue.len();
                *state = SlotState::Abandoned;
                Some(dropped)
            }
            SlotState::Resolved(_) | SlotState::Abandoned => None,
        }
    }

    fn is_pending(&self) -> bool {
        matches!(&*self.state.lock(), SlotState::Pending(_))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OutputHandle
// ─────────────────────────────────────────────────────────────────────────────

/// A shared, read-only reference to one resource's eventual outputs.
#[derive(Clone)]
pub struct OutputHandle {
    resource: ResourceId,
    slot: Arc<OutputSlot>,
}

impl fmt::Debug for OutputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputHandle")
            .field("resource", &self.resource)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl OutputHandle {
    /// Returns the resource this handle refers to.
    #[must_use]
    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    /// Returns the outputs if they have been published.
    #[must_use]
    pub fn get(&self) -> Option<Arc<Outputs>> {
        self.slot.get()
    }

    /// Returns `true` once the outputs have been published.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Registers a single-fire continuation. See [`OutputResolver::subscribe`].
    pub fn subscribe<F>(&self, continuation: F) -> Delivery
    where
        F: FnOnce(Arc<Outputs>) + Send + 'static,
    {
        self.slot.subscribe(Box::new(continuation))
    }

    /// Waits until the outputs are published.
    ///
    /// Returns `None` if the resource is abandoned instead.
    pub async fn wait(&self) -> Option<Arc<Outputs>> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.subscribe(move |outputs| {
            let _ = tx.send(outputs);
        });
        rx.await.ok()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OutputResolver
// ─────────────────────────────────────────────────────────────────────────────

/// Registry of output slots, keyed by resource.
///
/// One resolver serves one apply: the provisioning engine publishes each
/// ready resource into it exactly once, and abandons the rest when the apply
/// finishes.
#[derive(Default)]
pub struct OutputResolver {
    slots: RwLock<HashMap<ResourceId, Arc<OutputSlot>>>,
}

impl fmt::Debug for OutputResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputResolver")
            .field("slots", &self.slots.read().len())
            .finish()
    }
}

impl OutputResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, resource: &ResourceId) -> Arc<OutputSlot> {
        if let Some(slot) = self.slots.read().get(resource) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write();
        Arc::clone(
            slots
                .entry(resource.clone())
                .or_insert_with(|| Arc::new(OutputSlot::new())),
        )
    }

    /// Returns a handle to `resource`'s eventual outputs.
    #[must_use]
    pub fn handle(&self, resource: &ResourceId) -> OutputHandle {
        OutputHandle {
            resource: resource.clone(),
            slot: self.slot(resource),
        }
    }

    /// Returns `resource`'s outputs if already published.
    #[must_use]
    pub fn get(&self, resource: &ResourceId) -> Option<Arc<Outputs>> {
        self.slots.read().get(resource).and_then(|slot| slot.get())
    }

    /// Publishes `resource`'s outputs and runs every queued continuation, in
    /// registration order, on the calling thread.
    ///
    /// # Panics
    ///
    /// Panics if outputs for `resource` were already published, or the
    /// resource was abandoned. Only the provisioning engine publishes, once,
    /// on the `Ready` transition.
    pub fn publish(&self, resource: &ResourceId, outputs: Outputs) {
        let fired = self.slot(resource).publish(resource, outputs);
        tracing::debug!(resource = %resource, continuations = fired, "outputs published");
    }

    /// Registers a continuation that runs once `resource` is published.
    ///
    /// If the outputs are already available the continuation runs before
    /// this call returns.
    pub fn subscribe<F>(&self, resource: &ResourceId, continuation: F) -> Delivery
    where
        F: FnOnce(Arc<Outputs>) + Send + 'static,
    {
        self.slot(resource).subscribe(Box::new(continuation))
    }

    /// Registers a continuation that runs once, after every resource in
    /// `resources` has been published. Outputs are passed in the same order
    /// as `resources`.
    ///
    /// If any of the resources is abandoned the continuation never runs.
    pub fn subscribe_all<F>(&self, resources: &[ResourceId], continuation: F)
    where
        F: FnOnce(Vec<Arc<Outputs>>) + Send + 'static,
    {
        if resources.is_empty() {
            continuation(Vec::new());
            return;
        }

        struct Join<F> {
            collected: Vec<Option<Arc<Outputs>>>,
            remaining: usize,
            continuation: Option<F>,
        }

        let join = Arc::new(Mutex::new(Join {
            collected: vec![None; resources.len()],
            remaining: resources.len(),
            continuation: Some(continuation),
        }));

        for (index, resource) in resources.iter().enumerate() {
            let join = Arc::clone(&join);
            self.subscribe(resource, move |outputs| {
                let fire = {
                    let mut join = join.lock();
                    if join.collected[index].replace(outputs).is_none() {
                        join.remaining -= 1;
                    }
                    if join.remaining == 0 {
                        join.continuation.take().map(|continuation| {
                            let collected = join.collected.iter().flatten().cloned().collect();
                            (continuation, collected)
                        })
                    } else {
                        None
                    }
                };
                if let Some((continuation, collected)) = fire {
                    continuation(collected);
                }
            });
        }
    }

    /// Waits until every resource in `resources` is published.
    ///
    /// Returns `None` if any of them is abandoned.
    pub async fn wait_all(&self, resources: &[ResourceId]) -> Option<Vec<Arc<Outputs>>> {
        let handles: Vec<OutputHandle> = resources.iter().map(|id| self.handle(id)).collect();
        let results = futures::future::join_all(handles.iter().map(OutputHandle::wait)).await;
        results.into_iter().collect()
    }

    /// Marks `resource` as never resolving. Queued continuations are dropped
    /// unrun and waiters observe `None`. Has no effect on published outputs.
    pub fn abandon(&self, resource: &ResourceId) {
        if let Some(dropped) = self.slot(resource).abandon() {
            tracing::debug!(resource = %resource, dropped, "outputs abandoned");
        }
    }

    /// Abandons every slot that is still unpublished.
    pub fn abandon_pending(&self) {
        let pending: Vec<(ResourceId, Arc<OutputSlot>)> = self
            .slots
            .read()
            .iter()
            .filter(|(_, slot)| slot.is_pending())
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect();

        for (resource, slot) in pending {
            if let Some(dropped) = slot.abandon() {
                tracing::debug!(resource = %resource, dropped, "outputs abandoned");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::keys;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn outputs(address: &str) -> Outputs {
        Outputs::new().with(keys::ADDRESS, address)
    }

    #[test]
    fn late_subscriber_runs_immediately() {
        let resolver = OutputResolver::new();
        let id = ResourceId::from("a");
        resolver.publish(&id, outputs("10.0.0.2"));

        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let delivery = resolver.subscribe(&id, move |out| {
            *sink.lock() = out.address().map(str::to_owned);
        });

        assert_eq!(delivery, Delivery::Immediate);
        assert_eq!(seen.lock().as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn early_subscriber_runs_once_after_publish() {
        let resolver = OutputResolver::new();
        let id = ResourceId::from("a");
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        let delivery = resolver.subscribe(&id, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(delivery, Delivery::Queued);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        resolver.publish(&id, outputs("10.0.0.2"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "already published")]
    fn double_publish_panics() {
        let resolver = OutputResolver::new();
        let id = ResourceId::from("a");
        resolver.publish(&id, outputs("10.0.0.2"));
        resolver.publish(&id, outputs("10.0.0.3"));
    }

    #[test]
    fn abandoned_resource_drops_continuations() {
        let resolver = OutputResolver::new();
        let id = ResourceId::from("a");
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        resolver.subscribe(&id, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        resolver.abandon(&id);

        let counter = Arc::clone(&count);
        let delivery = resolver.subscribe(&id, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(delivery, Delivery::Dropped);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn continuation_may_subscribe_to_its_own_resource() {
        let resolver = Arc::new(OutputResolver::new());
        let id = ResourceId::from("a");
        let count = Arc::new(AtomicUsize::new(0));

        let inner_resolver = Arc::clone(&resolver);
        let inner_id = id.clone();
        let counter = Arc::clone(&count);
        resolver.subscribe(&id, move |_| {
            let counter = Arc::clone(&counter);
            inner_resolver.subscribe(&inner_id, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        });

        resolver.publish(&id, outputs("10.0.0.2"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
