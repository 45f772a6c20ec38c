//! Apply errors.

use core::fmt;

use devstack_backend::BackendError;
use devstack_graph::graph::GraphError;
use devstack_graph::resource::{ResourceId, ResourceState};

use crate::report::ApplyReport;

/// Error returned by [`ProvisioningEngine::apply`](crate::ProvisioningEngine::apply).
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// The graph failed validation; nothing was created.
    #[error("invalid resource graph: {0}")]
    Graph(#[from] GraphError),

    /// At least one resource failed.
    #[error("{0}")]
    Provisioning(Box<ProvisioningFailure>),
}

impl ApplyError {
    /// Returns the per-resource report, if provisioning started.
    #[must_use]
    pub fn report(&self) -> Option<&ApplyReport> {
        match self {
            ApplyError::Graph(_) => None,
            ApplyError::Provisioning(failure) => Some(failure.report()),
        }
    }
}

/// Aggregated provisioning failure: the root failures, the resources skipped
/// because of them, and the full report.
///
/// Displays as a single summary line.
#[derive(Debug)]
pub struct ProvisioningFailure {
    report: ApplyReport,
}

impl ProvisioningFailure {
    pub(crate) fn new(report: ApplyReport) -> Self {
        Self { report }
    }

    /// Returns the failed resources and their errors.
    #[must_use]
    pub fn failed(&self) -> Vec<(&ResourceId, &BackendError)> {
        self.report.failures()
    }

    /// Returns the skipped resources.
    #[must_use]
    pub fn skipped(&self) -> Vec<&ResourceId> {
        self.report.in_state(ResourceState::Skipped)
    }

    /// Returns the full report.
    #[must_use]
    pub fn report(&self) -> &ApplyReport {
        &self.report
    }

    /// Consumes the failure and returns the full report.
    #[must_use]
    pub fn into_report(self) -> ApplyReport {
        self.report
    }
}

impl fmt::Display for ProvisioningFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failed();
        write!(
            f,
            "provisioning failed: {} resource{} failed",
            failed.len(),
            if failed.len() == 1 { "" } else { "s" }
        )?;
        for (index, (id, error)) in failed.iter().enumerate() {
            let sep = if index == 0 { " (" } else { "; " };
            write!(f, "{sep}{id}: {error}")?;
        }
        if !failed.is_empty() {
            f.write_str(")")?;
        }

        let skipped = self.skipped();
        if !skipped.is_empty() {
            let names: Vec<&str> = skipped.iter().map(|id| id.as_str()).collect();
            write!(f, ", skipped: {}", names.join(", "))?;
        }
        Ok(())
    }
}

impl core::error::Error for ProvisioningFailure {}
