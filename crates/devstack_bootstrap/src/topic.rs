//! Topic definitions.

use core::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::BootstrapError;

/// Declared configuration of one topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicDef {
    /// Topic name.
    pub name: String,
    /// Partition count.
    pub partitions: u32,
    /// Replication factor.
    pub replication_factor: u16,
}

impl TopicDef {
    /// Creates a topic definition.
    pub fn new(name: impl Into<String>, partitions: u32, replication_factor: u16) -> Self {
        Self {
            name: name.into(),
            partitions,
            replication_factor,
        }
    }
}

impl fmt::Display for TopicDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (partitions={}, replication={})",
            self.name, self.partitions, self.replication_factor
        )
    }
}

/// An existing topic whose configuration differs from its declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConflict {
    /// What was declared.
    pub declared: TopicDef,
    /// What the cluster has.
    pub existing: TopicDef,
}

impl fmt::Display for TopicConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' declared with partitions={} replication={}, exists with partitions={} replication={}",
            self.declared.name,
            self.declared.partitions,
            self.declared.replication_factor,
            self.existing.partitions,
            self.existing.replication_factor
        )
    }
}

/// Outcome of a successful topic bootstrap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicReport {
    /// Topics that were created, in declaration order.
    pub created: Vec<String>,
    /// Topics that already existed with the declared configuration.
    pub unchanged: Vec<String>,
}

impl TopicReport {
    /// Returns `true` if nothing was created.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
    }
}

/// Validates `topics` and removes exact duplicates, keeping declaration order.
///
/// # Errors
///
/// [`BootstrapError::InvalidTopic`] for an empty name, zero partitions, zero
/// replication, or the same name declared twice with different settings.
pub fn validate_topics(topics: &[TopicDef]) -> Result<Vec<&TopicDef>, BootstrapError> {
    let invalid = |topic: &TopicDef, reason: &str| BootstrapError::InvalidTopic {
        topic: topic.name.clone(),
        reason: reason.to_owned(),
    };

    let mut unique: IndexMap<&str, &TopicDef> = IndexMap::with_capacity(topics.len());
    for topic in topics {
        if topic.name.trim().is_empty() {
            return Err(invalid(topic, "name is empty"));
        }
        if topic.partitions == 0 {
            return Err(invalid(topic, "partition count must be at least 1"));
        }
        if topic.replication_factor == 0 {
            return Err(invalid(topic, "replication factor must be at least 1"));
        }
        match unique.get(topic.name.as_str()) {
            Some(previous) if *previous != topic => {
                return Err(invalid(topic, "declared twice with different settings"));
            }
            Some(_) => {}
            None => {
                unique.insert(&topic.name, topic);
            }
        }
    }
    Ok(unique.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_duplicates_collapse() {
        let topics = [
            TopicDef::new("orders", 3, 1),
            TopicDef::new("payments", 1, 1),
            TopicDef::new("orders", 3, 1),
        ];
        let unique = validate_topics(&topics).unwrap();
        let names: Vec<&str> = unique.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["orders", "payments"]);
    }

    #[test]
    fn rejects_bad_definitions() {
        for bad in [
            vec![TopicDef::new("", 1, 1)],
            vec![TopicDef::new("a", 0, 1)],
            vec![TopicDef::new("a", 1, 0)],
            vec![TopicDef::new("a", 1, 1), TopicDef::new("a", 2, 1)],
        ] {
            assert!(matches!(
                validate_topics(&bad),
                Err(BootstrapError::InvalidTopic { .. })
            ));
        }
    }
}
