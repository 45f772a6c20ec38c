//! Idempotent topic configuration.

use hashbrown::HashMap;

use crate::admin::BrokerAdmin;
use crate::error::BootstrapError;
use crate::spec::BootstrapSpec;
use crate::topic::{TopicConflict, TopicDef, TopicReport, validate_topics};

/// Ensures every topic in `topics` exists with its declared partition count
/// and replication factor.
///
/// Topics that already exist with the declared settings are left alone. If
/// any existing topic differs, the call fails before creating anything. The
/// spec and the topic definitions are validated before any I/O, and an
/// unreachable cluster is reported without retrying.
///
/// # Errors
///
/// See [`BootstrapError`].
#[tracing::instrument(
    name = "bootstrap",
    skip_all,
    fields(brokers = %spec.bootstrap_servers(), protocol = %spec.protocol, topics = topics.len())
)]
pub async fn configure_topics<A>(
    admin: &A,
    spec: &BootstrapSpec,
    topics: &[TopicDef],
) -> Result<TopicReport, BootstrapError>
where
    A: BrokerAdmin + ?Sized,
{
    spec.validate()?;
    let topics = validate_topics(topics)?;
    let servers = spec.bootstrap_servers();

    let session = admin
        .connect(spec)
        .await
        .map_err(|error| BootstrapError::from_admin(&servers, error))?;
    let existing: HashMap<String, TopicDef> = session
        .list_topics()
        .await
        .map_err(|error| BootstrapError::from_admin(&servers, error))?
        .into_iter()
        .map(|topic| (topic.name.clone(), topic))
        .collect();

    let mut report = TopicReport::default();
    let mut missing = Vec::new();
    let mut conflicts = Vec::new();
    for topic in topics {
        match existing.get(&topic.name) {
            Some(current) if current == topic => report.unchanged.push(topic.name.clone()),
            Some(current) => conflicts.push(TopicConflict {
                declared: topic.clone(),
                existing: current.clone(),
            }),
            None => missing.push(topic),
        }
    }

    if !conflicts.is_empty() {
        tracing::warn!(conflicts = conflicts.len(), "existing topics differ from declarations");
        return Err(BootstrapError::TopicConfigConflict { conflicts });
    }

    for topic in missing {
        session
            .create_topic(topic)
            .await
            .map_err(|error| BootstrapError::TopicCreateFailed {
                topic: topic.name.clone(),
                reason: error.to_string(),
            })?;
        tracing::debug!(topic = %topic, "topic created");
        report.created.push(topic.name.clone());
    }

    tracing::info!(
        created = report.created.len(),
        unchanged = report.unchanged.len(),
        "topics configured"
    );
    Ok(report)
}
