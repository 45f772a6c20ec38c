//! Bringing a stack up.

use core::time::Duration;
use std::sync::Arc;

use devstack_backend::Backends;
use devstack_bootstrap::{
    BootstrapError, BootstrapSpec, BrokerAdmin, TopicReport, configure_topics,
};
use devstack_core::StackConfig;
use devstack_engine::hooks::ProvisionHooks;
use devstack_engine::{ApplyReport, ProvisioningEngine};
use devstack_graph::resource::keys;
use devstack_graph::{OutputResolver, Resource};

use crate::error::StackError;
use crate::exports::Exports;
use crate::topology::Topology;

/// Result of a successful [`Stack::up`].
#[derive(Debug)]
pub struct StackOutcome {
    /// Per-resource provisioning report.
    pub report: ApplyReport,
    /// Topics created or found in place.
    pub topics: TopicReport,
    /// Published endpoints.
    pub exports: Exports,
}

/// A configured stack bound to its provisioning backends and broker admin
/// transport.
pub struct Stack {
    config: StackConfig,
    topology: Topology,
    engine: ProvisioningEngine,
    admin: Arc<dyn BrokerAdmin>,
}

impl core::fmt::Debug for Stack {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stack")
            .field("network", &self.config.network)
            .field("resources", &self.topology.graph().len())
            .finish_non_exhaustive()
    }
}

impl Stack {
    /// Validates `config` and declares its topology.
    ///
    /// # Errors
    ///
    /// [`StackError::Config`] or [`StackError::Topology`]; nothing is created.
    pub fn new(
        config: StackConfig,
        backends: Backends,
        admin: Arc<dyn BrokerAdmin>,
    ) -> Result<Self, StackError> {
        config.validate()?;
        let topology = Topology::build(&config)?;
        topology.graph().validate()?;
        let engine = ProvisioningEngine::new(backends, config.engine_config());
        Ok(Self {
            config,
            topology,
            engine,
            admin,
        })
    }

    /// The configuration the stack was built from.
    #[must_use]
    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// The declared topology.
    #[must_use]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Provisioning hooks, for progress reporting.
    #[must_use]
    pub fn hooks(&self) -> &Arc<ProvisionHooks> {
        self.engine.hooks()
    }

    /// Resources in the order they would be created.
    ///
    /// # Errors
    ///
    /// [`StackError::Topology`] if the graph is cyclic.
    pub fn plan(&self) -> Result<Vec<&Resource>, StackError> {
        let order = self.topology.graph().topological_order()?;
        Ok(order
            .iter()
            .filter_map(|id| self.topology.graph().get(id))
            .collect())
    }

    /// Provisions every resource, then configures topics once all brokers
    /// have published their endpoints.
    ///
    /// Topic bootstrap waits on the brokers' outputs while the rest of the
    /// stack is still being created, so it runs even if an unrelated resource
    /// fails. Unreachable clusters are retried `bootstrap.retries` times,
    /// `bootstrap.backoff_ms` apart.
    ///
    /// # Errors
    ///
    /// - [`StackError::Apply`] if provisioning failed. It carries the
    ///   bootstrap outcome when every broker came up.
    /// - [`StackError::Bootstrap`] if topic configuration failed. Provisioned
    ///   resources are left running.
    #[tracing::instrument(name = "stack_up", skip_all, fields(network = %self.config.network))]
    pub async fn up(&self) -> Result<StackOutcome, StackError> {
        let resolver = OutputResolver::new();

        let provision = async {
            let result = self.engine.apply(self.topology.graph(), &resolver).await;
            // Bootstrap must not wait on outputs that will never arrive.
            resolver.abandon_pending();
            result
        };
        let bootstrap = async {
            let endpoints = self.broker_endpoints(&resolver).await?;
            tracing::info!(brokers = %endpoints.join(","), "brokers ready, configuring topics");
            Ok::<_, StackError>(self.bootstrap(endpoints).await)
        };

        let (applied, bootstrapped) = tokio::join!(provision, bootstrap);
        let report = match applied {
            Ok(report) => report,
            Err(error) => {
                return Err(StackError::Apply {
                    error,
                    bootstrap: bootstrapped.ok(),
                });
            }
        };
        let topics = bootstrapped??;

        let exports = Exports::collect(&self.topology, &resolver)?;
        tracing::info!(
            created = topics.created.len(),
            unchanged = topics.unchanged.len(),
            exports = exports.len(),
            "stack is up"
        );
        Ok(StackOutcome {
            report,
            topics,
            exports,
        })
    }

    /// Waits for every broker's endpoint, in configuration order.
    async fn broker_endpoints(
        &self,
        resolver: &OutputResolver,
    ) -> Result<Vec<String>, StackError> {
        let mut endpoints = Vec::with_capacity(self.topology.brokers().len());
        for broker in self.topology.brokers() {
            let endpoint = resolver
                .handle(broker)
                .wait()
                .await
                .and_then(|outputs| outputs.endpoint().map(str::to_owned))
                .ok_or_else(|| StackError::MissingOutput {
                    resource: broker.clone(),
                    key: keys::ENDPOINT,
                })?;
            endpoints.push(endpoint);
        }
        Ok(endpoints)
    }

    async fn bootstrap(&self, endpoints: Vec<String>) -> Result<TopicReport, BootstrapError> {
        let settings = &self.config.bootstrap;
        let mut spec = BootstrapSpec::new(endpoints, settings.protocol);
        if let Some(credentials) = &settings.credentials {
            spec = spec.with_credentials(credentials.clone());
        }
        let backoff = Duration::from_millis(settings.backoff_ms);

        let mut attempt = 0;
        loop {
            match configure_topics(self.admin.as_ref(), &spec, &settings.topics).await {
                Err(error) if error.is_retryable() && attempt < settings.retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        retries = settings.retries,
                        %error,
                        "broker cluster unreachable, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                result => return result,
            }
        }
    }
}
