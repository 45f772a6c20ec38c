//! Backend selection.

use std::sync::Arc;

use devstack_backend::{Backends, SimulatedBackend};
use devstack_core::Runtime;

use crate::error::StackError;

/// Returns the backends for `runtime`.
///
/// # Errors
///
/// - [`StackError::RuntimeUnavailable`] for [`Runtime::Docker`] when built
///   without the `docker` feature.
/// - [`StackError::Runtime`] if the Docker daemon does not answer.
pub async fn connect(runtime: Runtime) -> Result<Backends, StackError> {
    match runtime {
        Runtime::Simulated => Ok(Backends::shared(Arc::new(SimulatedBackend::new()))),
        Runtime::Docker => docker().await,
    }
}

#[cfg(feature = "docker")]
async fn docker() -> Result<Backends, StackError> {
    let backend = devstack_backend::DockerBackend::connect().await?;
    Ok(Backends::shared(Arc::new(backend)))
}

#[cfg(not(feature = "docker"))]
async fn docker() -> Result<Backends, StackError> {
    Err(StackError::RuntimeUnavailable(Runtime::Docker))
}
