//! Error types for backend operations.

/// Errors reported by image, network and container backends.
///
/// Any of these marks the resource being created as `Failed`; its
/// dependents are skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The image reference does not exist in any registry.
    #[error("image not found: {reference}")]
    ImageNotFound {
        /// The image reference.
        reference: String,
    },

    /// The image exists but could not be pulled.
    #[error("failed to pull image '{reference}': {reason}")]
    ImagePullFailed {
        /// The image reference.
        reference: String,
        /// Backend-provided reason.
        reason: String,
    },

    /// The network could not be created.
    #[error("failed to create network '{name}': {reason}")]
    NetworkCreateFailed {
        /// The network name.
        name: String,
        /// Backend-provided reason.
        reason: String,
    },

    /// The container could not be created, started, or given an address.
    #[error("failed to create container '{name}': {reason}")]
    ContainerCreateFailed {
        /// The container name.
        name: String,
        /// Backend-provided reason.
        reason: String,
    },

    /// Any other backend failure (inspection, removal, transport).
    #[error("backend error: {0}")]
    Backend(String),
}

impl BackendError {
    /// Creates a [`ContainerCreateFailed`](Self::ContainerCreateFailed).
    pub fn container_create_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ContainerCreateFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a [`Backend`](Self::Backend) error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}
