//! Engine configuration.

/// Default number of resources created at the same time.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Default host under which published container ports are reachable.
pub const DEFAULT_ADVERTISED_HOST: &str = "127.0.0.1";

/// Settings for a [`ProvisioningEngine`](crate::ProvisioningEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on resources in `Creating` at once. Zero is treated as one.
    pub max_concurrency: usize,
    /// Host used to build the `endpoint` output of containers that publish a
    /// port.
    pub advertised_host: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            advertised_host: DEFAULT_ADVERTISED_HOST.to_owned(),
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker limit.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Sets the advertised host.
    #[must_use]
    pub fn with_advertised_host(mut self, host: impl Into<String>) -> Self {
        self.advertised_host = host.into();
        self
    }

    pub(crate) fn worker_limit(&self) -> usize {
        self.max_concurrency.max(1)
    }
}
