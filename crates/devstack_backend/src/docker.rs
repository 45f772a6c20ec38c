//! A backend for the local Docker daemon.
//!
//! [`DockerBackend`] talks to the Docker Engine API through `bollard`.
//! Containers are labelled with the fingerprint of their declaration so that
//! a later apply can adopt them; everything else about a container is read
//! back from the daemon.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{
    ContainerInspectResponse, ContainerStateStatusEnum, HostConfig, PortBinding, RestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::network::{CreateNetworkOptions, InspectNetworkOptions};
use devstack_graph::resource::{self, ContainerSpec, ImageSpec, NetworkSpec};
use futures::StreamExt;

use crate::backend::{ContainerBackend, ImageBackend, NetworkBackend};
use crate::error::BackendError;
use crate::types::{
    AddressFuture, ContainerId, ContainerRecord, ContainerRequest, ContainerStatus, ImageId,
    NetworkRef,
};

/// Label holding the fingerprint of a container's declaration.
pub const FINGERPRINT_LABEL: &str = "devstack.fingerprint";

/// Label marking resources created by devstack.
pub const MANAGED_LABEL: &str = "devstack.managed";

const STOP_TIMEOUT_SECS: i64 = 10;

/// How often and how long to wait for a started container's address.
#[derive(Debug, Clone, Copy)]
struct AddressPolling {
    interval: Duration,
    attempts: u32,
}

impl Default for AddressPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
            attempts: 120,
        }
    }
}

/// Image, network and container backend for the local Docker daemon.
#[derive(Debug, Clone)]
pub struct DockerBackend {
    docker: Docker,
    polling: AddressPolling,
}

impl DockerBackend {
    /// Connects with the platform defaults (`DOCKER_HOST` or the local
    /// socket) and checks that the daemon answers.
    ///
    /// # Errors
    ///
    /// [`BackendError::Backend`] if the daemon is unreachable.
    pub async fn connect() -> Result<Self, BackendError> {
        let docker = Docker::connect_with_local_defaults().map_err(transport)?;
        docker.ping().await.map_err(transport)?;
        tracing::info!("connected to docker daemon");
        Ok(Self::with_client(docker))
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn with_client(docker: Docker) -> Self {
        Self {
            docker,
            polling: AddressPolling::default(),
        }
    }
}

fn transport(error: DockerError) -> BackendError {
    BackendError::backend(error.to_string())
}

/// Returns `true` if the daemon answered 404.
fn is_not_found(error: &DockerError) -> bool {
    matches!(
        error,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Maps a failed pull of `reference`.
fn pull_error(reference: &str, error: &DockerError) -> BackendError {
    if is_not_found(error) {
        BackendError::ImageNotFound {
            reference: reference.to_owned(),
        }
    } else {
        BackendError::ImagePullFailed {
            reference: reference.to_owned(),
            reason: error.to_string(),
        }
    }
}

fn restart_policy(restart: resource::RestartPolicy) -> RestartPolicy {
    let name = match restart {
        resource::RestartPolicy::No => RestartPolicyNameEnum::NO,
        resource::RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
        resource::RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
    };
    RestartPolicy {
        name: Some(name),
        maximum_retry_count: None,
    }
}

/// Builds the create request for `spec`.
fn container_config(
    spec: &ContainerSpec,
    image: &ImageId,
    fingerprint: &str,
    network: &str,
) -> Config<String> {
    let env = spec
        .env
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();

    let labels = HashMap::from([
        (FINGERPRINT_LABEL.to_owned(), fingerprint.to_owned()),
        (MANAGED_LABEL.to_owned(), "true".to_owned()),
    ]);

    let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
        .ports
        .iter()
        .map(|port| (format!("{}/tcp", port.internal), HashMap::new()))
        .collect();

    let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
        .ports
        .iter()
        .map(|port| {
            let binding = PortBinding {
                host_ip: None,
                host_port: Some(port.external.to_string()),
            };
            (format!("{}/tcp", port.internal), Some(vec![binding]))
        })
        .collect();

    let binds: Vec<String> = spec
        .mounts
        .iter()
        .map(|mount| {
            let mode = if mount.read_only { ":ro" } else { "" };
            format!("{}:{}{mode}", mount.host.display(), mount.container)
        })
        .collect();

    let host_config = HostConfig {
        port_bindings: Some(port_bindings),
        network_mode: Some(network.to_owned()),
        restart_policy: Some(restart_policy(spec.restart)),
        binds: (!binds.is_empty()).then_some(binds),
        ..Default::default()
    };

    Config {
        image: Some(image.0.clone()),
        hostname: Some(spec.name.clone()),
        env: Some(env),
        labels: Some(labels),
        exposed_ports: Some(exposed_ports),
        host_config: Some(host_config),
        cmd: (!spec.command.is_empty()).then(|| spec.command.clone()),
        ..Default::default()
    }
}

fn container_status(response: &ContainerInspectResponse) -> ContainerStatus {
    let status = response.state.as_ref().and_then(|state| state.status.as_ref());
    match status {
        Some(ContainerStateStatusEnum::RUNNING | ContainerStateStatusEnum::RESTARTING) => {
            ContainerStatus::Running
        }
        Some(ContainerStateStatusEnum::CREATED) | None => ContainerStatus::Created,
        Some(_) => ContainerStatus::Exited,
    }
}

/// Address of the container on `network`, if it has one.
fn network_address(response: &ContainerInspectResponse, network: Option<&str>) -> Option<String> {
    let networks = response.network_settings.as_ref()?.networks.as_ref()?;
    let mut endpoints = networks
        .iter()
        .filter(|(name, _)| network.is_none_or(|network| network == name.as_str()));
    endpoints
        .find_map(|(_, endpoint)| endpoint.ip_address.clone())
        .filter(|address| !address.is_empty())
}

/// Converts an inspect response into a record. Containers without a
/// fingerprint label were not created by devstack and are reported with an
/// empty fingerprint, so they never match a declaration.
fn container_record(response: &ContainerInspectResponse) -> Option<ContainerRecord> {
    let id = response.id.clone()?;
    let fingerprint = response
        .config
        .as_ref()
        .and_then(|config| config.labels.as_ref())
        .and_then(|labels| labels.get(FINGERPRINT_LABEL))
        .cloned()
        .unwrap_or_default();
    let status = container_status(response);
    let address = if status == ContainerStatus::Running {
        network_address(response, None)
    } else {
        None
    };
    Some(ContainerRecord {
        id: ContainerId(id),
        fingerprint,
        status,
        address,
    })
}

/// Waits until the container `name` runs with an address on `network`.
async fn await_address(
    docker: Docker,
    polling: AddressPolling,
    name: String,
    network: String,
) -> Result<String, BackendError> {
    for _ in 0..polling.attempts {
        let response = match docker
            .inspect_container(&name, None::<InspectContainerOptions>)
            .await
        {
            Ok(response) => response,
            Err(error) if is_not_found(&error) => {
                return Err(BackendError::container_create_failed(
                    name,
                    "container was removed before it was assigned an address",
                ));
            }
            Err(error) => return Err(transport(error)),
        };
        match container_status(&response) {
            ContainerStatus::Exited => {
                return Err(BackendError::container_create_failed(
                    name,
                    "container exited before it was assigned an address",
                ));
            }
            ContainerStatus::Running => {
                if let Some(address) = network_address(&response, Some(&network)) {
                    return Ok(address);
                }
            }
            ContainerStatus::Created => {}
        }
        tokio::time::sleep(polling.interval).await;
    }
    Err(BackendError::container_create_failed(
        name,
        "timed out waiting for a network address",
    ))
}

#[async_trait]
impl ImageBackend for DockerBackend {
    async fn fetch(&self, spec: &ImageSpec) -> Result<ImageId, BackendError> {
        let reference = spec.reference.as_str();
        tracing::info!(reference, "pulling image");

        let options = CreateImageOptions {
            from_image: reference,
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            match progress {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::trace!(reference, status = %status, "pull progress");
                    }
                }
                Err(error) => return Err(pull_error(reference, &error)),
            }
        }

        self.inspect_image(reference)
            .await?
            .ok_or_else(|| BackendError::ImagePullFailed {
                reference: reference.to_owned(),
                reason: "image missing after pull".to_owned(),
            })
    }

    async fn inspect_image(&self, reference: &str) -> Result<Option<ImageId>, BackendError> {
        match self.docker.inspect_image(reference).await {
            Ok(image) => Ok(image.id.map(ImageId)),
            Err(error) if is_not_found(&error) => Ok(None),
            Err(error) => Err(transport(error)),
        }
    }
}

#[async_trait]
impl NetworkBackend for DockerBackend {
    async fn create_network(&self, spec: &NetworkSpec) -> Result<NetworkRef, BackendError> {
        let options = CreateNetworkOptions {
            name: spec.name.as_str(),
            driver: "bridge",
            labels: HashMap::from([(MANAGED_LABEL, "true")]),
            ..Default::default()
        };
        let response = self.docker.create_network(options).await.map_err(|error| {
            BackendError::NetworkCreateFailed {
                name: spec.name.clone(),
                reason: error.to_string(),
            }
        })?;
        if response.id.is_empty() {
            return Err(BackendError::NetworkCreateFailed {
                name: spec.name.clone(),
                reason: "no ID returned".to_owned(),
            });
        }
        tracing::info!(name = %spec.name, id = %response.id, "network created");
        Ok(NetworkRef {
            id: response.id,
            name: spec.name.clone(),
        })
    }

    async fn inspect_network(&self, name: &str) -> Result<Option<NetworkRef>, BackendError> {
        match self
            .docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(network) => Ok(network.id.map(|id| NetworkRef {
                id,
                name: network.name.unwrap_or_else(|| name.to_owned()),
            })),
            Err(error) if is_not_found(&error) => Ok(None),
            Err(error) => Err(transport(error)),
        }
    }
}

#[async_trait]
impl ContainerBackend for DockerBackend {
    async fn create(
        &self,
        request: ContainerRequest<'_>,
        network: &NetworkRef,
    ) -> Result<(ContainerId, AddressFuture), BackendError> {
        let name = request.spec.name.clone();
        let config = container_config(
            request.spec,
            request.image,
            request.fingerprint,
            &network.name,
        );
        let options = CreateContainerOptions {
            name: name.as_str(),
            platform: None,
        };
        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|error| {
                BackendError::container_create_failed(name.clone(), error.to_string())
            })?;
        tracing::info!(name = %name, id = %response.id, "container created");

        let address: AddressFuture = Box::pin(await_address(
            self.docker.clone(),
            self.polling,
            name,
            network.name.clone(),
        ));
        Ok((ContainerId(response.id), address))
    }

    async fn start(&self, id: &ContainerId) -> Result<(), BackendError> {
        self.docker
            .start_container(&id.0, None::<StartContainerOptions<String>>)
            .await
            .map_err(|error| {
                BackendError::container_create_failed(id.0.clone(), error.to_string())
            })?;
        tracing::debug!(id = %id, "container started");
        Ok(())
    }

    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerRecord>, BackendError> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(response) => Ok(container_record(&response)),
            Err(error) if is_not_found(&error) => Ok(None),
            Err(error) => Err(transport(error)),
        }
    }

    async fn remove(&self, id: &ContainerId) -> Result<(), BackendError> {
        let stop = StopContainerOptions {
            t: STOP_TIMEOUT_SECS,
        };
        if let Err(error) = self.docker.stop_container(&id.0, Some(stop)).await {
            tracing::warn!(id = %id, error = %error, "failed to stop container");
        }

        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(&id.0, Some(options)).await {
            Ok(()) => {}
            Err(error) if is_not_found(&error) => {}
            Err(error) => return Err(transport(error)),
        }
        tracing::info!(id = %id, "container removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bollard::models::{ContainerConfig, ContainerState, EndpointSettings, NetworkSettings};
    use devstack_graph::resource::{PortMapping, VolumeMount};

    use super::*;

    fn not_found() -> DockerError {
        DockerError::DockerResponseServerError {
            status_code: 404,
            message: "No such image: nope:latest".to_owned(),
        }
    }

    fn inspected(status: ContainerStateStatusEnum, address: &str) -> ContainerInspectResponse {
        ContainerInspectResponse {
            id: Some("c0ffee".to_owned()),
            state: Some(ContainerState {
                status: Some(status),
                ..Default::default()
            }),
            config: Some(ContainerConfig {
                labels: Some(HashMap::from([(
                    FINGERPRINT_LABEL.to_owned(),
                    "fp-1".to_owned(),
                )])),
                ..Default::default()
            }),
            network_settings: Some(NetworkSettings {
                networks: Some(HashMap::from([(
                    "devstack-network".to_owned(),
                    EndpointSettings {
                        ip_address: Some(address.to_owned()),
                        ..Default::default()
                    },
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn missing_image_is_not_found_other_errors_are_pull_failures() {
        assert_eq!(
            pull_error("nope:latest", &not_found()),
            BackendError::ImageNotFound {
                reference: "nope:latest".to_owned()
            }
        );
        let denied = DockerError::DockerResponseServerError {
            status_code: 500,
            message: "toomanyrequests".to_owned(),
        };
        assert!(matches!(
            pull_error("bitnami/kafka:latest", &denied),
            BackendError::ImagePullFailed { .. }
        ));
    }

    #[test]
    fn container_config_carries_the_declaration() {
        let spec = ContainerSpec::new(
            "kafka-broker1-container",
            "kafka-image".into(),
            "network".into(),
        )
        .with_env("KAFKA_BROKER_ID", 1)
        .with_port(PortMapping::same(9092))
        .with_command(["-w".to_owned(), "2".to_owned()])
        .with_mount(VolumeMount::read_only(
            "/srv/stack/secrets/kafka.keystore.jks",
            "/opt/bitnami/kafka/config/certs/kafka.keystore.jks",
        ));
        let image = ImageId("sha256:abc".to_owned());
        let config = container_config(&spec, &image, "fp-1", "devstack-network");

        assert_eq!(config.image.as_deref(), Some("sha256:abc"));
        assert_eq!(config.env, Some(vec!["KAFKA_BROKER_ID=1".to_owned()]));
        assert_eq!(config.cmd, Some(vec!["-w".to_owned(), "2".to_owned()]));
        assert_eq!(config.labels.as_ref().unwrap()[FINGERPRINT_LABEL], "fp-1");
        assert!(config.exposed_ports.as_ref().unwrap().contains_key("9092/tcp"));

        let host = config.host_config.unwrap();
        assert_eq!(host.network_mode.as_deref(), Some("devstack-network"));
        assert_eq!(
            host.port_bindings.unwrap()["9092/tcp"],
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some("9092".to_owned()),
            }])
        );
        assert_eq!(
            host.binds,
            Some(vec![
                "/srv/stack/secrets/kafka.keystore.jks:/opt/bitnami/kafka/config/certs/kafka.keystore.jks:ro"
                    .to_owned()
            ])
        );
        assert_eq!(
            host.restart_policy.and_then(|policy| policy.name),
            Some(RestartPolicyNameEnum::ON_FAILURE)
        );
    }

    #[test]
    fn container_without_command_or_mounts_leaves_them_unset() {
        let spec = ContainerSpec::new("zk-container", "zookeeper-image".into(), "network".into());
        let config = container_config(&spec, &ImageId("sha256:abc".to_owned()), "fp", "net");
        assert_eq!(config.cmd, None);
        assert_eq!(config.host_config.unwrap().binds, None);
    }

    #[test]
    fn running_container_is_recorded_with_its_address() {
        let response = inspected(ContainerStateStatusEnum::RUNNING, "172.18.0.2");
        let record = container_record(&response).unwrap();
        assert_eq!(record.id, ContainerId("c0ffee".to_owned()));
        assert_eq!(record.fingerprint, "fp-1");
        assert!(record.is_running());
        assert_eq!(record.address.as_deref(), Some("172.18.0.2"));
    }

    #[test]
    fn exited_container_has_no_address() {
        let response = inspected(ContainerStateStatusEnum::EXITED, "172.18.0.2");
        let record = container_record(&response).unwrap();
        assert_eq!(record.status, ContainerStatus::Exited);
        assert_eq!(record.address, None);
    }

    #[test]
    fn address_is_looked_up_on_the_requested_network() {
        let response = inspected(ContainerStateStatusEnum::RUNNING, "172.18.0.3");
        assert_eq!(
            network_address(&response, Some("devstack-network")).as_deref(),
            Some("172.18.0.3")
        );
        assert_eq!(network_address(&response, Some("bridge")), None);
        assert_eq!(
            network_address(&inspected(ContainerStateStatusEnum::RUNNING, ""), None),
            None
        );
    }
}
