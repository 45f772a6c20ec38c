//! An in-memory broker cluster.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::admin::{AdminSession, BrokerAdmin};
use crate::error::AdminError;
use crate::spec::BootstrapSpec;
use crate::topic::TopicDef;

#[derive(Default)]
struct ClusterState {
    topics: Mutex<IndexMap<String, TopicDef>>,
    unreachable_for: AtomicUsize,
    down: AtomicBool,
    connections: AtomicUsize,
    creates: AtomicUsize,
    last_config: Mutex<Option<BTreeMap<String, String>>>,
}

/// Broker cluster kept in memory, implementing [`BrokerAdmin`].
///
/// Clones share the same cluster.
#[derive(Clone, Default)]
pub struct InMemoryCluster {
    state: Arc<ClusterState>,
}

impl core::fmt::Debug for InMemoryCluster {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryCluster")
            .field("topics", &self.state.topics.lock().len())
            .field("down", &self.state.down.load(Ordering::SeqCst))
            .finish()
    }
}

impl InMemoryCluster {
    /// Creates an empty, reachable cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a topic as if it had been created out of band.
    pub fn insert_topic(&self, topic: TopicDef) {
        self.state.topics.lock().insert(topic.name.clone(), topic);
    }

    /// Returns the current configuration of `name`.
    #[must_use]
    pub fn topic(&self, name: &str) -> Option<TopicDef> {
        self.state.topics.lock().get(name).cloned()
    }

    /// Returns every topic, in creation order.
    #[must_use]
    pub fn topics(&self) -> Vec<TopicDef> {
        self.state.topics.lock().values().cloned().collect()
    }

    /// Makes every connection attempt fail until [`set_down(false)`](Self::set_down).
    pub fn set_down(&self, down: bool) {
        self.state.down.store(down, Ordering::SeqCst);
    }

    /// Makes the next `attempts` connection attempts fail.
    pub fn unreachable_for(&self, attempts: usize) {
        self.state.unreachable_for.store(attempts, Ordering::SeqCst);
    }

    /// Returns the number of connection attempts so far.
    #[must_use]
    pub fn connection_attempts(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Returns the number of `create_topic` requests so far.
    #[must_use]
    pub fn create_requests(&self) -> usize {
        self.state.creates.load(Ordering::SeqCst)
    }

    /// Returns the client configuration of the last connection attempt.
    #[must_use]
    pub fn last_client_config(&self) -> Option<BTreeMap<String, String>> {
        self.state.last_config.lock().clone()
    }
}

#[async_trait]
impl BrokerAdmin for InMemoryCluster {
    async fn connect(&self, spec: &BootstrapSpec) -> Result<Box<dyn AdminSession>, AdminError> {
        let state = &self.state;
        state.connections.fetch_add(1, Ordering::SeqCst);
        *state.last_config.lock() = Some(spec.client_config());

        let transient = state
            .unreachable_for
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if transient || state.down.load(Ordering::SeqCst) {
            return Err(AdminError::Unreachable(format!(
                "connection refused by {}",
                spec.bootstrap_servers()
            )));
        }
        Ok(Box::new(InMemorySession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct InMemorySession {
    state: Arc<ClusterState>,
}

#[async_trait]
impl AdminSession for InMemorySession {
    async fn list_topics(&self) -> Result<Vec<TopicDef>, AdminError> {
        Ok(self.state.topics.lock().values().cloned().collect())
    }

    async fn create_topic(&self, topic: &TopicDef) -> Result<(), AdminError> {
        self.state.creates.fetch_add(1, Ordering::SeqCst);
        let mut topics = self.state.topics.lock();
        if topics.contains_key(&topic.name) {
            return Err(AdminError::Request(format!(
                "topic '{}' already exists",
                topic.name
            )));
        }
        topics.insert(topic.name.clone(), topic.clone());
        Ok(())
    }
}
