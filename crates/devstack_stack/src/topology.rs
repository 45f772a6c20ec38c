//! The stack's resource graph.
//!
//! ```text
//!                     ┌──────────┐
//!          ┌──────────│ network  │──────────┬───────────────┐
//!          ▼          └──────────┘          ▼               ▼
//!     ┌─────────┐     ┌───────────┐    ┌──────────┐    ┌────────────┐
//!     │   mtz   │     │ zookeeper │───►│ broker N │───►│ rest-proxy │
//!     └─────────┘     └───────────┘    └──────────┘    └────────────┘
//!          ▲                ▲               ▲               ▲
//!      mtz-image     zookeeper-image   kafka-image    rest-proxy-image
//! ```
//!
//! Images are independent of each other and of the network, so they are
//! pulled concurrently. Brokers wait for Zookeeper; the REST proxy waits for
//! every broker.

use devstack_core::{BrokerConfig, ListenerRole, StackConfig};
use devstack_graph::resource::{ContainerSpec, ImageSpec, NetworkSpec, PortMapping, VolumeMount};
use devstack_graph::{DependencyGraph, GraphError, ResourceId};

/// Where a broker finds its image, network and Zookeeper.
#[derive(Debug, Clone)]
pub struct BrokerWiring {
    /// The Kafka image resource.
    pub image: ResourceId,
    /// The network resource.
    pub network: ResourceId,
    /// `host:port` of Zookeeper on the shared network.
    pub zookeeper_connect: String,
    /// Host under which client listeners are advertised.
    pub advertised_host: String,
    /// Host files mounted into every broker.
    pub mounts: Vec<VolumeMount>,
}

/// In-container directory holding the broker key stores.
pub const BROKER_CERTS_DIR: &str = "/opt/bitnami/kafka/config/certs";

/// Container name of broker `id`.
#[must_use]
pub fn broker_container_name(id: u8) -> String {
    format!("kafka-broker{id}-container")
}

/// Declares one Kafka broker container.
///
/// A [`ListenerRole::Plaintext`] broker has a single `PLAINTEXT` listener on
/// `port`, advertised as `advertised_host:port`. A [`ListenerRole::Split`]
/// broker keeps clients on `port` and moves inter-broker traffic to an
/// `INTERNAL` listener on `port + 1`, advertised under the container name.
#[must_use]
pub fn kafka_broker(
    id: u8,
    port: u16,
    listener: ListenerRole,
    wiring: &BrokerWiring,
) -> ContainerSpec {
    let name = broker_container_name(id);
    let host = &wiring.advertised_host;

    let spec = ContainerSpec::new(&name, wiring.image.clone(), wiring.network.clone())
        .with_env("KAFKA_BROKER_ID", id)
        .with_env("KAFKA_CFG_ZOOKEEPER_CONNECT", &wiring.zookeeper_connect)
        .with_env("ALLOW_PLAINTEXT_LISTENER", "yes")
        .with_port(PortMapping::same(port));
    let spec = wiring
        .mounts
        .iter()
        .cloned()
        .fold(spec, ContainerSpec::with_mount);

    match listener {
        ListenerRole::Plaintext => spec
            .with_env("KAFKA_LISTENERS", format!("PLAINTEXT://:{port}"))
            .with_env(
                "KAFKA_ADVERTISED_LISTENERS",
                format!("PLAINTEXT://{host}:{port}"),
            ),
        ListenerRole::Split => {
            let internal = port.saturating_add(1);
            spec.with_port(PortMapping::same(internal))
                .with_env(
                    "KAFKA_CFG_LISTENERS",
                    format!("INTERNAL://:{internal},CLIENT://:{port}"),
                )
                .with_env(
                    "KAFKA_CFG_ADVERTISED_LISTENERS",
                    format!("INTERNAL://{name}:{internal},CLIENT://{host}:{port}"),
                )
                .with_env(
                    "KAFKA_CFG_LISTENER_SECURITY_PROTOCOL_MAP",
                    "INTERNAL:PLAINTEXT,CLIENT:PLAINTEXT",
                )
                .with_env("KAFKA_CFG_INTER_BROKER_LISTENER_NAME", "INTERNAL")
        }
    }
}

/// Address other containers use to reach `broker` on the shared network.
fn in_network_address(broker: &BrokerConfig) -> String {
    let port = match broker.listener {
        ListenerRole::Plaintext => broker.port,
        ListenerRole::Split => broker.port.saturating_add(1),
    };
    format!("PLAINTEXT://{}:{port}", broker_container_name(broker.id))
}

/// Key store mounts for every broker, with host paths resolved against the
/// work directory.
fn broker_mounts(config: &StackConfig) -> Vec<VolumeMount> {
    [
        (&config.kafka.keystore, "kafka.keystore.jks"),
        (&config.kafka.truststore, "kafka.truststore.jks"),
    ]
    .into_iter()
    .filter_map(|(path, file)| {
        path.as_ref().map(|path| {
            VolumeMount::read_only(
                config.resolve_path(path),
                format!("{BROKER_CERTS_DIR}/{file}"),
            )
        })
    })
    .collect()
}

/// The declared stack: its graph plus the IDs of the resources that matter
/// after provisioning.
#[derive(Debug)]
pub struct Topology {
    graph: DependencyGraph,
    network: ResourceId,
    materialize: ResourceId,
    zookeeper: ResourceId,
    brokers: Vec<ResourceId>,
    rest_proxy: Option<ResourceId>,
}

impl Topology {
    /// Declares every resource described by `config`.
    ///
    /// # Errors
    ///
    /// [`GraphError`] if a declaration fails, e.g. two brokers share an ID.
    pub fn build(config: &StackConfig) -> Result<Self, GraphError> {
        let mut graph = DependencyGraph::new();

        let network = graph.add("network", NetworkSpec::new(&config.network))?;
        let mtz_image = graph.add("mtz-image", ImageSpec::new(&config.materialize.image))?;
        let zk_image = graph.add("zookeeper-image", ImageSpec::new(&config.zookeeper.image))?;
        let kafka_image = graph.add("kafka-image", ImageSpec::new(&config.kafka.image))?;

        let materialize = graph.add(
            "mtz",
            ContainerSpec::new("mtz-container", mtz_image, network.clone())
                .with_command(["-w".to_owned(), config.materialize.workers.to_string()])
                .with_port(PortMapping::same(config.materialize.port)),
        )?;

        let zk = &config.zookeeper;
        let zk_name = "zk-container";
        let zookeeper = graph.add(
            "zookeeper",
            ContainerSpec::new(zk_name, zk_image, network.clone())
                .with_env("ZOO_PORT_NUMBER", zk.port)
                .with_env("ZOO_SERVER_ID", zk.server_id)
                .with_env("ZOO_TICK_TIME", zk.tick_time_ms)
                .with_env("ALLOW_ANONYMOUS_LOGIN", "yes")
                .with_port(PortMapping::same(zk.port)),
        )?;

        let wiring = BrokerWiring {
            image: kafka_image,
            network: network.clone(),
            zookeeper_connect: format!("{zk_name}:{}", zk.port),
            advertised_host: config.advertised_host.clone(),
            mounts: broker_mounts(config),
        };
        let brokers = config
            .kafka
            .brokers
            .iter()
            .map(|broker| {
                graph.declare(
                    format!("kafka-broker{}", broker.id),
                    kafka_broker(broker.id, broker.port, broker.listener, &wiring),
                    [&zookeeper],
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rest_proxy = if config.rest_proxy.enabled {
            let proxy = &config.rest_proxy;
            let image = graph.add("rest-proxy-image", ImageSpec::new(&proxy.image))?;
            let servers: Vec<String> =
                config.kafka.brokers.iter().map(in_network_address).collect();
            let id = graph.declare(
                "rest-proxy",
                ContainerSpec::new("rest-proxy-container", image, network.clone())
                    .with_env("KAFKA_REST_BOOTSTRAP_SERVERS", servers.join(","))
                    .with_env("KAFKA_REST_LISTENERS", format!("http://0.0.0.0:{}", proxy.port))
                    .with_env("KAFKA_REST_HOST_NAME", "rest-proxy")
                    .with_port(PortMapping::same(proxy.port)),
                &brokers,
            )?;
            Some(id)
        } else {
            None
        };

        tracing::debug!(resources = graph.len(), brokers = brokers.len(), "topology declared");

        Ok(Self {
            graph,
            network,
            materialize,
            zookeeper,
            brokers,
            rest_proxy,
        })
    }

    /// The resource graph.
    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// The shared network.
    #[must_use]
    pub fn network(&self) -> &ResourceId {
        &self.network
    }

    /// The Materialize container.
    #[must_use]
    pub fn materialize(&self) -> &ResourceId {
        &self.materialize
    }

    /// The Zookeeper container.
    #[must_use]
    pub fn zookeeper(&self) -> &ResourceId {
        &self.zookeeper
    }

    /// The broker containers, in configuration order.
    #[must_use]
    pub fn brokers(&self) -> &[ResourceId] {
        &self.brokers
    }

    /// The REST proxy container, if enabled.
    #[must_use]
    pub fn rest_proxy(&self) -> Option<&ResourceId> {
        self.rest_proxy.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use devstack_graph::ResourceSpec;

    use super::*;

    fn wiring() -> BrokerWiring {
        BrokerWiring {
            image: "kafka-image".into(),
            network: "network".into(),
            zookeeper_connect: "zk-container:2181".to_owned(),
            advertised_host: "127.0.0.1".to_owned(),
            mounts: Vec::new(),
        }
    }

    fn container<'a>(topology: &'a Topology, id: &ResourceId) -> &'a ContainerSpec {
        match topology.graph().get(id).map(|resource| &resource.spec) {
            Some(ResourceSpec::Container(spec)) => spec,
            _ => panic!("{id} is not a container"),
        }
    }

    #[test]
    fn plaintext_broker_advertises_on_the_host() {
        let spec = kafka_broker(2, 9093, ListenerRole::Plaintext, &wiring());

        assert_eq!(spec.name, "kafka-broker2-container");
        assert_eq!(spec.ports, vec![PortMapping::same(9093)]);
        assert_eq!(spec.env["KAFKA_BROKER_ID"], "2");
        assert_eq!(spec.env["KAFKA_LISTENERS"], "PLAINTEXT://:9093");
        assert_eq!(spec.env["KAFKA_ADVERTISED_LISTENERS"], "PLAINTEXT://127.0.0.1:9093");
        assert_eq!(spec.env["KAFKA_CFG_ZOOKEEPER_CONNECT"], "zk-container:2181");
    }

    #[test]
    fn split_broker_moves_inter_broker_traffic_to_the_next_port() {
        let spec = kafka_broker(1, 9092, ListenerRole::Split, &wiring());

        assert_eq!(
            spec.ports,
            vec![PortMapping::same(9092), PortMapping::same(9093)]
        );
        assert_eq!(
            spec.env["KAFKA_CFG_ADVERTISED_LISTENERS"],
            "INTERNAL://kafka-broker1-container:9093,CLIENT://127.0.0.1:9092"
        );
        assert_eq!(spec.env["KAFKA_CFG_INTER_BROKER_LISTENER_NAME"], "INTERNAL");
        assert!(!spec.env.contains_key("KAFKA_LISTENERS"));
    }

    #[test]
    fn rest_proxy_reaches_brokers_inside_the_network() {
        let mut config = StackConfig::default();
        config.kafka.brokers = vec![
            BrokerConfig::new(1, 9092),
            BrokerConfig {
                id: 2,
                port: 9094,
                listener: ListenerRole::Split,
            },
        ];
        let topology = Topology::build(&config).unwrap();
        let proxy = topology.rest_proxy().unwrap();

        let spec = container(&topology, proxy);
        assert_eq!(
            spec.env["KAFKA_REST_BOOTSTRAP_SERVERS"],
            "PLAINTEXT://kafka-broker1-container:9092,PLAINTEXT://kafka-broker2-container:9095"
        );
        assert_eq!(topology.graph().dependencies_of(proxy).len(), 4);
    }

    #[test]
    fn key_stores_are_mounted_from_the_work_dir() {
        let mut config = StackConfig::default();
        config.work_dir = "/srv/stack".into();
        config.kafka.keystore = Some("secrets/kafka.keystore.jks".into());
        config.kafka.truststore = Some("/etc/kafka/kafka.truststore.jks".into());
        config.kafka.brokers = vec![BrokerConfig::new(1, 9092), BrokerConfig::new(2, 9093)];
        let topology = Topology::build(&config).unwrap();

        for broker in topology.brokers() {
            assert_eq!(
                container(&topology, broker).mounts,
                vec![
                    VolumeMount::read_only(
                        "/srv/stack/secrets/kafka.keystore.jks",
                        "/opt/bitnami/kafka/config/certs/kafka.keystore.jks",
                    ),
                    VolumeMount::read_only(
                        "/etc/kafka/kafka.truststore.jks",
                        "/opt/bitnami/kafka/config/certs/kafka.truststore.jks",
                    ),
                ]
            );
        }
        assert!(container(&topology, topology.materialize()).mounts.is_empty());
    }

    #[test]
    fn brokers_mount_nothing_without_key_stores() {
        let topology = Topology::build(&StackConfig::default()).unwrap();
        assert!(container(&topology, &topology.brokers()[0]).mounts.is_empty());
    }
}
