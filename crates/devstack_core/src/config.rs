//! Stack configuration.
//!
//! [`StackConfig`] is built in three layers:
//!
//! 1. Defaults reproducing the reference topology (Materialize, one
//!    Zookeeper, one plaintext Kafka broker, a REST proxy).
//! 2. An optional JSON file; missing fields keep their defaults.
//! 3. `DEVSTACK_*` environment variables.
//!
//! The result is validated before use.
//!
//! ```
//! use devstack_core::StackConfig;
//!
//! let config = StackConfig::from_json(r#"{
//!     "kafka": { "brokers": [{ "id": 1, "port": 9092 }, { "id": 2, "port": 9093 }] },
//!     "bootstrap": { "topics": [{ "name": "orders", "partitions": 3, "replication_factor": 2 }] }
//! }"#)?;
//!
//! assert_eq!(config.kafka.brokers.len(), 2);
//! assert_eq!(config.materialize.port, 6875);
//! # Ok::<(), devstack_core::ConfigError>(())
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use devstack_bootstrap::{SaslCredentials, SecurityProtocol, TopicDef};
use devstack_engine::{DEFAULT_ADVERTISED_HOST, DEFAULT_MAX_CONCURRENCY, EngineConfig};
use serde::Deserialize;

use crate::error::ConfigError;

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "DEVSTACK_";

// ─────────────────────────────────────────────────────────────────────────────
// Service sections
// ─────────────────────────────────────────────────────────────────────────────

/// Materialize (streaming SQL engine) settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MaterializeConfig {
    /// Image reference.
    pub image: String,
    /// SQL port, published on the same host port.
    pub port: u16,
    /// Worker threads (`-w`).
    pub workers: u32,
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self {
            image: "materialize/materialized:v0.6.1".to_owned(),
            port: 6875,
            workers: 1,
        }
    }
}

/// Zookeeper settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ZookeeperConfig {
    /// Image reference.
    pub image: String,
    /// Client port.
    pub port: u16,
    /// `ZOO_SERVER_ID`.
    pub server_id: u32,
    /// `ZOO_TICK_TIME` in milliseconds.
    pub tick_time_ms: u32,
}

impl Default for ZookeeperConfig {
    fn default() -> Self {
        Self {
            image: "bitnami/zookeeper:latest".to_owned(),
            port: 2181,
            server_id: 1,
            tick_time_ms: 2000,
        }
    }
}

/// How a broker exposes its listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerRole {
    /// One `PLAINTEXT` listener on the broker port, advertised on the host.
    #[default]
    Plaintext,
    /// A `CLIENT` listener on the broker port, advertised on the host, and an
    /// `INTERNAL` listener on the next port, advertised under the container
    /// name for inter-broker traffic.
    Split,
}

impl ListenerRole {
    /// Host ports the broker publishes for `port`.
    #[must_use]
    pub fn published_ports(self, port: u16) -> Vec<u16> {
        match self {
            ListenerRole::Plaintext => vec![port],
            ListenerRole::Split => vec![port, port.saturating_add(1)],
        }
    }
}

/// One Kafka broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    /// `KAFKA_BROKER_ID`.
    pub id: u8,
    /// Client port, published on the same host port.
    pub port: u16,
    /// Listener layout.
    #[serde(default)]
    pub listener: ListenerRole,
}

impl BrokerConfig {
    /// Creates a plaintext broker.
    #[must_use]
    pub fn new(id: u8, port: u16) -> Self {
        Self {
            id,
            port,
            listener: ListenerRole::Plaintext,
        }
    }
}

/// Kafka settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KafkaConfig {
    /// Image reference.
    pub image: String,
    /// Brokers, in declaration order.
    pub brokers: Vec<BrokerConfig>,
    /// JKS keystore mounted into every broker. Relative paths are resolved
    /// against [`StackConfig::work_dir`].
    pub keystore: Option<PathBuf>,
    /// JKS truststore mounted into every broker, resolved like `keystore`.
    pub truststore: Option<PathBuf>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            image: "bitnami/kafka:latest".to_owned(),
            brokers: vec![BrokerConfig::new(1, 9092)],
            keystore: None,
            truststore: None,
        }
    }
}

/// Kafka REST proxy settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RestProxyConfig {
    /// Whether to run the proxy at all.
    pub enabled: bool,
    /// Image reference.
    pub image: String,
    /// HTTP port.
    pub port: u16,
}

impl Default for RestProxyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            image: "confluentinc/cp-kafka-rest:latest".to_owned(),
            port: 8082,
        }
    }
}

/// Topic bootstrap settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    /// Security protocol used by the admin client.
    pub protocol: SecurityProtocol,
    /// Credentials for the SASL protocols.
    pub credentials: Option<SaslCredentials>,
    /// How many times an unreachable cluster is retried.
    pub retries: u32,
    /// Delay between retries, in milliseconds.
    pub backoff_ms: u64,
    /// Topics to create.
    pub topics: Vec<TopicDef>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            protocol: SecurityProtocol::Plaintext,
            credentials: None,
            retries: 5,
            backoff_ms: 500,
            topics: Vec::new(),
        }
    }
}

/// Container runtime the stack is provisioned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Runtime {
    /// In-process simulation; nothing leaves the process.
    #[default]
    Simulated,
    /// The local Docker daemon.
    Docker,
}

impl FromStr for Runtime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simulated" => Ok(Runtime::Simulated),
            "docker" => Ok(Runtime::Docker),
            other => Err(format!("unknown runtime `{other}`")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StackConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Complete configuration of a local development stack.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StackConfig {
    /// Container runtime.
    pub runtime: Runtime,
    /// Name of the shared network.
    pub network: String,
    /// Host under which published ports are reachable.
    pub advertised_host: String,
    /// Upper bound on resources created at once.
    pub max_concurrency: usize,
    /// Directory relative paths are resolved against.
    pub work_dir: PathBuf,
    /// Materialize.
    pub materialize: MaterializeConfig,
    /// Zookeeper.
    pub zookeeper: ZookeeperConfig,
    /// Kafka.
    pub kafka: KafkaConfig,
    /// REST proxy.
    pub rest_proxy: RestProxyConfig,
    /// Topic bootstrap.
    pub bootstrap: BootstrapConfig,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            runtime: Runtime::Simulated,
            network: "devstack-network".to_owned(),
            advertised_host: DEFAULT_ADVERTISED_HOST.to_owned(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            work_dir: PathBuf::from("."),
            materialize: MaterializeConfig::default(),
            zookeeper: ZookeeperConfig::default(),
            kafka: KafkaConfig::default(),
            rest_proxy: RestProxyConfig::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl StackConfig {
    /// Parses a JSON document. Missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed JSON or unknown fields.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Loads the configuration: defaults, then `path` if given, then the
    /// process environment, then validation.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(std::env::vars())?;
        config.work_dir =
            std::path::absolute(&config.work_dir).map_err(|source| ConfigError::WorkDir {
                path: config.work_dir.clone(),
                source,
            })?;
        config.validate()?;
        tracing::debug!(
            network = %config.network,
            brokers = config.kafka.brokers.len(),
            topics = config.bootstrap.topics.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Applies `DEVSTACK_*` overrides from `vars`. Other variables are
    /// ignored; unknown `DEVSTACK_*` variables are logged and ignored.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `DEVSTACK_RUNTIME` | `runtime` |
    /// | `DEVSTACK_NETWORK` | `network` |
    /// | `DEVSTACK_ADVERTISED_HOST` | `advertised_host` |
    /// | `DEVSTACK_MAX_CONCURRENCY` | `max_concurrency` |
    /// | `DEVSTACK_WORK_DIR` | `work_dir` |
    /// | `DEVSTACK_MATERIALIZE_IMAGE` / `_PORT` / `_WORKERS` | `materialize.*` |
    /// | `DEVSTACK_ZOOKEEPER_IMAGE` / `_PORT` | `zookeeper.*` |
    /// | `DEVSTACK_KAFKA_IMAGE` | `kafka.image` |
    /// | `DEVSTACK_KAFKA_BROKERS` | `kafka.brokers`, as `id:port,...` |
    /// | `DEVSTACK_KAFKA_KEYSTORE` / `_TRUSTSTORE` | `kafka.keystore` / `kafka.truststore` |
    /// | `DEVSTACK_REST_PROXY_ENABLED` / `_IMAGE` / `_PORT` | `rest_proxy.*` |
    /// | `DEVSTACK_BOOTSTRAP_PROTOCOL` / `_RETRIES` / `_BACKOFF_MS` | `bootstrap.*` |
    /// | `DEVSTACK_SASL_USERNAME` / `_PASSWORD` / `_MECHANISM` | `bootstrap.credentials` |
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidEnv`] if a value does not parse.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(ENV_PREFIX)
                    .map(|name| (name.to_owned(), value))
            })
            .collect();

        let mut sasl_username = None;
        let mut sasl_password = None;
        let mut sasl_mechanism = None;

        for (name, value) in &vars {
            match name.as_str() {
                "RUNTIME" => self.runtime = parse_env(name, value)?,
                "NETWORK" => self.network.clone_from(value),
                "ADVERTISED_HOST" => self.advertised_host.clone_from(value),
                "MAX_CONCURRENCY" => self.max_concurrency = parse_env(name, value)?,
                "WORK_DIR" => self.work_dir = PathBuf::from(value),
                "MATERIALIZE_IMAGE" => self.materialize.image.clone_from(value),
                "MATERIALIZE_PORT" => self.materialize.port = parse_env(name, value)?,
                "MATERIALIZE_WORKERS" => self.materialize.workers = parse_env(name, value)?,
                "ZOOKEEPER_IMAGE" => self.zookeeper.image.clone_from(value),
                "ZOOKEEPER_PORT" => self.zookeeper.port = parse_env(name, value)?,
                "KAFKA_IMAGE" => self.kafka.image.clone_from(value),
                "KAFKA_BROKERS" => self.kafka.brokers = parse_brokers(name, value)?,
                "KAFKA_KEYSTORE" => self.kafka.keystore = Some(PathBuf::from(value)),
                "KAFKA_TRUSTSTORE" => self.kafka.truststore = Some(PathBuf::from(value)),
                "REST_PROXY_ENABLED" => self.rest_proxy.enabled = parse_env(name, value)?,
                "REST_PROXY_IMAGE" => self.rest_proxy.image.clone_from(value),
                "REST_PROXY_PORT" => self.rest_proxy.port = parse_env(name, value)?,
                "BOOTSTRAP_PROTOCOL" => self.bootstrap.protocol = parse_env(name, value)?,
                "BOOTSTRAP_RETRIES" => self.bootstrap.retries = parse_env(name, value)?,
                "BOOTSTRAP_BACKOFF_MS" => self.bootstrap.backoff_ms = parse_env(name, value)?,
                "SASL_USERNAME" => sasl_username = Some(value.clone()),
                "SASL_PASSWORD" => sasl_password = Some(value.clone()),
                "SASL_MECHANISM" => sasl_mechanism = Some(value.clone()),
                // Read by the binary, not part of the stack configuration.
                "LOG" | "LOG_FORMAT" => {}
                _ => tracing::warn!(var = %format!("{ENV_PREFIX}{name}"), "unknown variable ignored"),
            }
        }

        match (sasl_username, sasl_password) {
            (Some(username), Some(password)) => {
                let mut credentials = SaslCredentials::plain(username, password);
                if let Some(mechanism) = sasl_mechanism {
                    credentials = credentials.with_mechanism(mechanism);
                }
                self.bootstrap.credentials = Some(credentials);
            }
            (None, None) => {
                if let (Some(mechanism), Some(credentials)) =
                    (sasl_mechanism, self.bootstrap.credentials.as_mut())
                {
                    credentials.mechanism = mechanism;
                }
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(ConfigError::InvalidEnv {
                    var: format!("{ENV_PREFIX}SASL_USERNAME/{ENV_PREFIX}SASL_PASSWORD"),
                    value: String::new(),
                    reason: "username and password must be set together".to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Checks the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Invalid`] for empty names, zero ports or counts, or no
    ///   brokers.
    /// - [`ConfigError::DuplicateBrokerId`] if two brokers share an ID.
    /// - [`ConfigError::PortConflict`] if two services publish the same port.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_owned()));

        if self.network.trim().is_empty() {
            return invalid("network name is empty");
        }
        if self.advertised_host.trim().is_empty() {
            return invalid("advertised host is empty");
        }
        if self.max_concurrency == 0 {
            return invalid("max_concurrency must be at least 1");
        }
        if self.materialize.workers == 0 {
            return invalid("materialize.workers must be at least 1");
        }
        if self.kafka.brokers.is_empty() {
            return invalid("at least one kafka broker is required");
        }
        for image in [
            &self.materialize.image,
            &self.zookeeper.image,
            &self.kafka.image,
            &self.rest_proxy.image,
        ] {
            if image.trim().is_empty() {
                return invalid("image reference is empty");
            }
        }

        let mut ids = Vec::with_capacity(self.kafka.brokers.len());
        for broker in &self.kafka.brokers {
            if ids.contains(&broker.id) {
                return Err(ConfigError::DuplicateBrokerId(broker.id));
            }
            ids.push(broker.id);
        }

        let mut ports: BTreeMap<u16, String> = BTreeMap::new();
        for (port, service) in self.published_ports() {
            if port == 0 {
                return Err(ConfigError::Invalid(format!("{service} has port 0")));
            }
            if let Some(first) = ports.insert(port, service.clone()) {
                return Err(ConfigError::PortConflict {
                    port,
                    first,
                    second: service,
                });
            }
        }
        Ok(())
    }

    /// Every published host port with the service that publishes it, in
    /// declaration order.
    #[must_use]
    pub fn published_ports(&self) -> Vec<(u16, String)> {
        let mut ports = vec![
            (self.materialize.port, "materialize".to_owned()),
            (self.zookeeper.port, "zookeeper".to_owned()),
        ];
        for broker in &self.kafka.brokers {
            for port in broker.listener.published_ports(broker.port) {
                ports.push((port, format!("kafka broker {}", broker.id)));
            }
        }
        if self.rest_proxy.enabled {
            ports.push((self.rest_proxy.port, "rest proxy".to_owned()));
        }
        ports
    }

    /// Resolves `path` against [`work_dir`](Self::work_dir). Used for every
    /// host path handed to a container, such as the broker key stores.
    #[must_use]
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.work_dir.join(path)
        }
    }

    /// Returns the engine settings derived from this configuration.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new()
            .with_max_concurrency(self.max_concurrency)
            .with_advertised_host(self.advertised_host.clone())
    }
}

fn parse_env<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    value.trim().parse().map_err(|error: T::Err| ConfigError::InvalidEnv {
        var: format!("{ENV_PREFIX}{name}"),
        value: value.to_owned(),
        reason: error.to_string(),
    })
}

/// Parses `id:port[:split],...`.
fn parse_brokers(name: &str, value: &str) -> Result<Vec<BrokerConfig>, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidEnv {
        var: format!("{ENV_PREFIX}{name}"),
        value: value.to_owned(),
        reason: reason.to_owned(),
    };

    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> Result<BrokerConfig, ConfigError> {
            let mut parts = entry.split(':');
            let id: u8 = parts
                .next()
                .and_then(|id| id.parse().ok())
                .ok_or_else(|| invalid("expected id:port"))?;
            let port: u16 = parts
                .next()
                .and_then(|port| port.parse().ok())
                .ok_or_else(|| invalid("expected id:port"))?;
            let listener = match parts.next() {
                None | Some("plaintext") => ListenerRole::Plaintext,
                Some("split") => ListenerRole::Split,
                Some(_) => return Err(invalid("listener must be 'plaintext' or 'split'")),
            };
            Ok(BrokerConfig { id, port, listener })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn defaults_validate() {
        let config = StackConfig::default();
        config.validate().unwrap();
        assert_eq!(config.kafka.brokers, vec![BrokerConfig::new(1, 9092)]);
        assert_eq!(config.engine_config().advertised_host, "127.0.0.1");
    }

    #[test]
    fn broker_list_parses() {
        let brokers = parse_brokers("KAFKA_BROKERS", "1:9092, 2:9094:split").unwrap();
        assert_eq!(
            brokers,
            vec![
                BrokerConfig::new(1, 9092),
                BrokerConfig {
                    id: 2,
                    port: 9094,
                    listener: ListenerRole::Split
                }
            ]
        );
        assert!(parse_brokers("KAFKA_BROKERS", "1").is_err());
        assert!(parse_brokers("KAFKA_BROKERS", "1:9092:tls").is_err());
    }

    #[test]
    fn half_set_credentials_are_rejected() {
        let mut config = StackConfig::default();
        let err = config
            .apply_env(env(&[("DEVSTACK_SASL_USERNAME", "u")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn split_listener_claims_two_ports() {
        let mut config = StackConfig::default();
        config.kafka.brokers = vec![
            BrokerConfig {
                id: 1,
                port: 9092,
                listener: ListenerRole::Split,
            },
            BrokerConfig::new(2, 9093),
        ];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PortConflict { port: 9093, .. })
        ));
    }
}
