//! Named values published after a successful bring-up.

use core::fmt;

use devstack_graph::resource::keys;
use devstack_graph::{OutputResolver, ResourceId};
use indexmap::IndexMap;

use crate::error::StackError;
use crate::topology::Topology;

/// Endpoint of the Materialize SQL port.
pub const MATERIALIZE_URL: &str = "MATERIALIZE_URL";
/// Comma-joined client endpoints of every broker.
pub const KAFKA_BROKERS: &str = "KAFKA_BROKERS";
/// Endpoint of Zookeeper.
pub const ZOOKEEPER_URL: &str = "ZOOKEEPER_URL";
/// HTTP URL of the REST proxy, when enabled.
pub const REST_PROXY_URL: &str = "REST_PROXY_URL";

/// Ordered `name -> value` exports.
///
/// `Display` renders one `NAME=value` line per export, suitable for a
/// `.env` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exports {
    values: IndexMap<&'static str, String>,
}

impl Exports {
    /// Reads the published endpoints of `topology` from `resolver`.
    ///
    /// # Errors
    ///
    /// [`StackError::MissingOutput`] if a resource has not published an
    /// endpoint.
    pub fn collect(topology: &Topology, resolver: &OutputResolver) -> Result<Self, StackError> {
        let mut exports = Self::default();

        exports.insert(MATERIALIZE_URL, endpoint(resolver, topology.materialize())?);
        exports.insert(ZOOKEEPER_URL, endpoint(resolver, topology.zookeeper())?);

        let brokers = topology
            .brokers()
            .iter()
            .map(|broker| endpoint(resolver, broker))
            .collect::<Result<Vec<_>, _>>()?;
        exports.insert(KAFKA_BROKERS, brokers.join(","));

        if let Some(proxy) = topology.rest_proxy() {
            let url = format!("http://{}", endpoint(resolver, proxy)?);
            exports.insert(REST_PROXY_URL, url);
        }
        Ok(exports)
    }

    fn insert(&mut self, name: &'static str, value: String) {
        self.values.insert(name, value);
    }

    /// Returns the value of export `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Iterates exports in publication order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(name, value)| (*name, value.as_str()))
    }

    /// Returns the number of exports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing was exported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for Exports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            writeln!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

fn endpoint(resolver: &OutputResolver, resource: &ResourceId) -> Result<String, StackError> {
    resolver
        .get(resource)
        .and_then(|outputs| outputs.endpoint().map(str::to_owned))
        .ok_or_else(|| StackError::MissingOutput {
            resource: resource.clone(),
            key: keys::ENDPOINT,
        })
}
