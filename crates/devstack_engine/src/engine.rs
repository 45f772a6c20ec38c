//! The provisioning engine.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use devstack_backend::{
    Backends, BackendError, ContainerRecord, ContainerRequest, ImageId, NetworkRef,
};
use devstack_graph::graph::DependencyGraph;
use devstack_graph::output::OutputResolver;
use devstack_graph::resource::{
    ContainerSpec, ImageSpec, NetworkSpec, Outputs, Resource, ResourceId, ResourceSpec,
    ResourceState, RestartPolicy, keys,
};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use hashbrown::HashMap;

use crate::config::EngineConfig;
use crate::error::{ApplyError, ProvisioningFailure};
use crate::hooks::{ProvisionEvent, ProvisionHooks};
use crate::report::{ApplyReport, ResourceAction};
use crate::state::StateTable;

/// How an existing container relates to its declaration.
enum Existing {
    /// Running with the declared configuration at this address.
    Adopt(String),
    /// Declared configuration, stopped, and not covered by `on-failure`.
    Restart,
    /// Must be removed and created again.
    Replace,
}

impl Existing {
    fn classify(spec: &ContainerSpec, fingerprint: &str, record: &ContainerRecord) -> Self {
        if record.fingerprint != fingerprint {
            return Existing::Replace;
        }
        match (&record.address, record.is_running()) {
            (Some(address), true) => Existing::Adopt(address.clone()),
            (None, true) => Existing::Replace,
            (_, false) if spec.restart == RestartPolicy::OnFailure => Existing::Replace,
            (_, false) => Existing::Restart,
        }
    }
}

/// Applies a [`DependencyGraph`] against a set of [`Backends`].
///
/// # Scheduling
///
/// A resource starts `Creating` only once every dependency is `Ready`. Among
/// the resources that may start, the one earliest in topological order goes
/// first, and at most [`EngineConfig::max_concurrency`] are in `Creating` at
/// once. When a resource fails, every transitive dependent still `Pending`
/// is `Skipped`; independent branches run to completion.
///
/// # Outputs
///
/// Each resource's outputs are published into the caller's
/// [`OutputResolver`] on its `Ready` transition. Resources that end `Failed`
/// or `Skipped` are abandoned in the resolver when the apply finishes, so
/// nobody waits on them forever.
pub struct ProvisioningEngine {
    backends: Backends,
    config: EngineConfig,
    hooks: Arc<ProvisionHooks>,
}

impl core::fmt::Debug for ProvisioningEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProvisioningEngine")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl ProvisioningEngine {
    /// Creates an engine with an empty hook registry.
    #[must_use]
    pub fn new(backends: Backends, config: EngineConfig) -> Self {
        Self {
            backends,
            config,
            hooks: Arc::new(ProvisionHooks::new()),
        }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the hook registry.
    #[must_use]
    pub fn hooks(&self) -> &Arc<ProvisionHooks> {
        &self.hooks
    }

    /// Creates every resource in `graph`, honoring its dependency edges.
    ///
    /// Re-applying a graph is idempotent: resources that already exist with
    /// their declared configuration are adopted (`Unchanged`).
    ///
    /// # Errors
    ///
    /// - [`ApplyError::Graph`] if the graph is cyclic; nothing is created.
    /// - [`ApplyError::Provisioning`] if any resource failed; the error holds
    ///   the full per-resource report.
    ///
    /// # Panics
    ///
    /// Panics if `resolver` already holds outputs for one of the resources.
    #[tracing::instrument(name = "apply", skip_all, fields(resources = graph.len()))]
    pub async fn apply(
        &self,
        graph: &DependencyGraph,
        resolver: &OutputResolver,
    ) -> Result<ApplyReport, ApplyError> {
        let order = graph.topological_order()?;
        let started = Instant::now();
        let limit = self.config.worker_limit();

        tracing::info!(resources = order.len(), max_concurrency = limit, "apply started");
        self.hooks.invoke(&ProvisionEvent::ApplyStart {
            resource_count: order.len(),
        });

        let table = StateTable::new(&order);
        let position: HashMap<&ResourceId, usize> =
            order.iter().enumerate().map(|(index, id)| (id, index)).collect();
        let mut waiting: Vec<usize> = order
            .iter()
            .map(|id| graph.dependencies_of(id).len())
            .collect();
        let mut runnable: BTreeSet<usize> = waiting
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(index, _)| index)
            .collect();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < limit {
                let Some(index) = runnable.pop_first() else {
                    break;
                };
                let Some(resource) = graph.get(&order[index]) else {
                    continue;
                };

                table.begin(&resource.id);
                tracing::debug!(resource = %resource.id, kind = %resource.kind(), "creating");
                self.hooks.invoke(&ProvisionEvent::ResourceCreating {
                    resource: resource.id.clone(),
                    kind: resource.kind(),
                });

                in_flight.push(async move {
                    let started = Instant::now();
                    let result = self.provision(resource, resolver).await;
                    (resource, started.elapsed(), result)
                });
            }

            let Some((resource, elapsed, result)) = in_flight.next().await else {
                break;
            };
            let id = &resource.id;

            match result {
                Ok((outputs, action)) => {
                    table.ready(id, action);
                    tracing::info!(resource = %id, %action, elapsed = ?elapsed, "resource ready");
                    resolver.publish(id, outputs);
                    self.hooks.invoke(&ProvisionEvent::ResourceReady {
                        resource: id.clone(),
                        kind: resource.kind(),
                        action,
                        duration: elapsed,
                    });

                    for dependent in graph.dependents_of(id) {
                        let Some(&index) = position.get(&dependent) else {
                            continue;
                        };
                        waiting[index] -= 1;
                        if waiting[index] == 0
                            && table.state(&dependent) == Some(ResourceState::Pending)
                        {
                            runnable.insert(index);
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(resource = %id, %error, "resource failed");
                    table.fail(id, error.clone());
                    self.hooks.invoke(&ProvisionEvent::ResourceFailed {
                        resource: id.clone(),
                        kind: resource.kind(),
                        error,
                    });

                    for dependent in graph.transitive_dependents(id) {
                        if !table.skip(&dependent, id) {
                            continue;
                        }
                        if let Some(index) = position.get(&dependent) {
                            runnable.remove(index);
                        }
                        tracing::warn!(resource = %dependent, cause = %id, "resource skipped");
                        if let Some(skipped) = graph.get(&dependent) {
                            self.hooks.invoke(&ProvisionEvent::ResourceSkipped {
                                resource: dependent.clone(),
                                kind: skipped.kind(),
                                cause: id.clone(),
                            });
                        }
                    }
                }
            }
        }

        for id in table.unresolved() {
            resolver.abandon(&id);
        }
        resolver.abandon_pending();

        let report = table.into_report(graph, started.elapsed());
        let ready = report.in_state(ResourceState::Ready).len();
        let failed = report.in_state(ResourceState::Failed).len();
        let skipped = report.in_state(ResourceState::Skipped).len();
        tracing::info!(ready, failed, skipped, duration = ?report.duration(), "apply finished");
        self.hooks.invoke(&ProvisionEvent::ApplyComplete {
            ready,
            failed,
            skipped,
            duration: report.duration(),
        });

        if failed == 0 {
            Ok(report)
        } else {
            Err(ApplyError::Provisioning(Box::new(ProvisioningFailure::new(
                report,
            ))))
        }
    }

    async fn provision(
        &self,
        resource: &Resource,
        resolver: &OutputResolver,
    ) -> Result<(Outputs, ResourceAction), BackendError> {
        match &resource.spec {
            ResourceSpec::Network(spec) => self.provision_network(spec).await,
            ResourceSpec::Image(spec) => self.provision_image(spec).await,
            ResourceSpec::Container(spec) => {
                let fingerprint = resource.spec.fingerprint();
                self.provision_container(spec, &fingerprint, resolver).await
            }
        }
    }

    async fn provision_network(
        &self,
        spec: &NetworkSpec,
    ) -> Result<(Outputs, ResourceAction), BackendError> {
        let networks = &self.backends.networks;
        let (network, action) = match networks.inspect_network(&spec.name).await? {
            Some(existing) => (existing, ResourceAction::Unchanged),
            None => (networks.create_network(spec).await?, ResourceAction::Created),
        };
        let outputs = Outputs::new()
            .with(keys::ID, network.id)
            .with(keys::NAME, network.name);
        Ok((outputs, action))
    }

    async fn provision_image(
        &self,
        spec: &ImageSpec,
    ) -> Result<(Outputs, ResourceAction), BackendError> {
        let images = &self.backends.images;
        let (image, action) = match images.inspect_image(&spec.reference).await? {
            Some(existing) => (existing, ResourceAction::Unchanged),
            None => (images.fetch(spec).await?, ResourceAction::Created),
        };
        let outputs = Outputs::new()
            .with(keys::ID, image.0)
            .with(keys::REFERENCE, spec.reference.clone());
        Ok((outputs, action))
    }

    async fn provision_container(
        &self,
        spec: &ContainerSpec,
        fingerprint: &str,
        resolver: &OutputResolver,
    ) -> Result<(Outputs, ResourceAction), BackendError> {
        let containers = &self.backends.containers;
        let network = NetworkRef {
            id: dependency_output(resolver, &spec.network, keys::ID)?,
            name: dependency_output(resolver, &spec.network, keys::NAME)?,
        };
        let image = ImageId(dependency_output(resolver, &spec.image, keys::ID)?);

        let mut action = ResourceAction::Created;
        if let Some(existing) = containers.inspect_container(&spec.name).await? {
            match Existing::classify(spec, fingerprint, &existing) {
                Existing::Adopt(address) => {
                    let outputs = self.container_outputs(spec, &existing.id.0, address);
                    return Ok((outputs, ResourceAction::Unchanged));
                }
                Existing::Restart => {
                    tracing::debug!(container = %spec.name, "restarting stopped container");
                    containers.start(&existing.id).await?;
                    let address = containers
                        .inspect_container(&spec.name)
                        .await?
                        .and_then(|record| record.address)
                        .ok_or_else(|| {
                            BackendError::container_create_failed(
                                spec.name.clone(),
                                "restarted container has no address",
                            )
                        })?;
                    let outputs = self.container_outputs(spec, &existing.id.0, address);
                    return Ok((outputs, ResourceAction::Unchanged));
                }
                Existing::Replace => {
                    tracing::debug!(container = %spec.name, "replacing container");
                    containers.remove(&existing.id).await?;
                    action = ResourceAction::Replaced;
                }
            }
        }

        let request = ContainerRequest {
            spec,
            image: &image,
            fingerprint,
        };
        let (id, address) = containers.create(request, &network).await?;
        containers.start(&id).await?;
        let address = address.await?;

        Ok((self.container_outputs(spec, &id.0, address), action))
    }

    fn container_outputs(&self, spec: &ContainerSpec, id: &str, address: String) -> Outputs {
        let outputs = Outputs::new()
            .with(keys::ID, id)
            .with(keys::NAME, spec.name.clone())
            .with(keys::ADDRESS, address);
        match spec.ports.first() {
            Some(port) => outputs.with(
                keys::ENDPOINT,
                format!("{}:{}", self.config.advertised_host, port.external),
            ),
            None => outputs,
        }
    }
}

/// Reads `key` from the published outputs of dependency `id`.
fn dependency_output(
    resolver: &OutputResolver,
    id: &ResourceId,
    key: &str,
) -> Result<String, BackendError> {
    resolver
        .get(id)
        .and_then(|outputs| outputs.get(key).map(str::to_owned))
        .ok_or_else(|| BackendError::backend(format!("output '{key}' of '{id}' is not available")))
}
