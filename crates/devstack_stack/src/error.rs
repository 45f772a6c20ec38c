use devstack_backend::BackendError;
use devstack_bootstrap::{BootstrapError, TopicReport};
use devstack_core::{ConfigError, Runtime};
use devstack_engine::ApplyError;
use devstack_graph::{GraphError, ResourceId};

/// Errors from building or bringing up a stack.
///
/// Each variant renders as a single summary line.
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The configured runtime is not compiled into this build.
    #[error("runtime {0:?} is not available in this build")]
    RuntimeUnavailable(Runtime),

    /// The container runtime could not be reached.
    #[error("container runtime unavailable: {0}")]
    Runtime(#[from] BackendError),

    /// The topology could not be declared.
    #[error("invalid topology: {0}")]
    Topology(#[from] GraphError),

    /// Provisioning failed.
    ///
    /// Topic bootstrap only needs the brokers, so it may have run anyway. Its
    /// outcome is kept here and named in the summary.
    #[error("{error}{}", bootstrap_summary(.bootstrap.as_ref()))]
    Apply {
        /// The provisioning failure, with the per-resource report.
        error: ApplyError,
        /// `None` if no bootstrap was attempted because a broker never came up.
        bootstrap: Option<Result<TopicReport, BootstrapError>>,
    },

    /// Topic bootstrap failed after provisioning succeeded.
    #[error("topic bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),

    /// A ready resource did not publish an output the stack needs.
    #[error("resource '{resource}' has no '{key}' output")]
    MissingOutput {
        /// The resource.
        resource: ResourceId,
        /// The missing output key.
        key: &'static str,
    },
}

impl StackError {
    /// Returns the topic bootstrap outcome carried by an
    /// [`Apply`](Self::Apply) error, if bootstrap ran.
    #[must_use]
    pub fn bootstrap_outcome(&self) -> Option<&Result<TopicReport, BootstrapError>> {
        match self {
            StackError::Apply { bootstrap, .. } => bootstrap.as_ref(),
            _ => None,
        }
    }
}

fn bootstrap_summary(bootstrap: Option<&Result<TopicReport, BootstrapError>>) -> String {
    match bootstrap {
        Some(Err(error)) => format!("; topic bootstrap failed: {error}"),
        Some(Ok(report)) if !report.created.is_empty() => {
            format!("; topics created: {}", report.created.join(", "))
        }
        Some(Ok(_)) | None => String::new(),
    }
}
