//! Dependency graph of declared resources.
//!
//! The [`DependencyGraph`] records every declared [`Resource`] and the
//! "must be ready before" edges between them. Declaration order is preserved
//! and used to break ties, so [`DependencyGraph::topological_order`] is
//! deterministic across runs.
//!
//! # Example
//!
//! ```
//! use devstack_graph::graph::DependencyGraph;
//! use devstack_graph::resource::{ContainerSpec, ImageSpec, NetworkSpec};
//!
//! let mut graph = DependencyGraph::new();
//! let net = graph.add("net", NetworkSpec::new("devstack"))?;
//! let image = graph.add("zk-image", ImageSpec::new("bitnami/zookeeper:latest"))?;
//! let zk = graph.add("zk", ContainerSpec::new("zk-container", image.clone(), net.clone()))?;
//! let broker = graph.declare(
//!     "broker",
//!     ContainerSpec::new("broker-1", image.clone(), net.clone()),
//!     [&zk],
//! )?;
//!
//! graph.validate()?;
//! assert_eq!(graph.topological_order()?, vec![net, image, zk, broker]);
//! # Ok::<(), devstack_graph::graph::GraphError>(())
//! ```

use core::fmt;
use std::collections::{BTreeSet, VecDeque};

use indexmap::IndexMap;

use crate::resource::{Resource, ResourceId, ResourceKind, ResourceSpec};

/// Errors detected while declaring or validating a graph.
///
/// All of these are construction-time errors: they are reported before any
/// resource is created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A resource with this name was already declared.
    #[error("resource '{0}' is already declared")]
    DuplicateResource(ResourceId),

    /// A dependency edge references a resource that was never declared.
    #[error("resource '{resource}' depends on undeclared resource '{dependency}'")]
    UnknownDependency {
        /// The resource declaring the edge.
        resource: ResourceId,
        /// The missing dependency.
        dependency: ResourceId,
    },

    /// A spec references a resource of the wrong kind.
    #[error("resource '{resource}' expects '{reference}' to be a {expected}, found a {found}")]
    KindMismatch {
        /// The resource holding the reference.
        resource: ResourceId,
        /// The referenced resource.
        reference: ResourceId,
        /// The kind the declaration requires.
        expected: ResourceKind,
        /// The kind that was declared.
        found: ResourceKind,
    },

    /// An edge was added from a resource that was never declared.
    #[error("resource '{0}' is not declared")]
    UnknownResource(ResourceId),

    /// The graph contains a cycle.
    #[error("cyclic dependency: {}", CyclePath(.cycle))]
    CyclicDependency {
        /// The cycle, starting and ending at the same resource. Each entry
        /// depends on the next one.
        cycle: Vec<ResourceId>,
    },
}

struct CyclePath<'a>(&'a [ResourceId]);

impl fmt::Display for CyclePath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}

/// DFS coloring used by cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Visited,
}

/// A directed acyclic graph of declared resources.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// Declared resources, in declaration order.
    resources: IndexMap<ResourceId, Resource>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Declaration
    // ─────────────────────────────────────────────────────────────────────────

    /// Declares a resource and its explicit dependencies.
    ///
    /// Resources referenced by the declared configuration (a container's image and
    /// network) are added to the dependencies automatically. A dependency on
    /// the resource's own name is recorded as a self-loop and reported by
    /// [`validate`](Self::validate).
    ///
    /// # Errors
    ///
    /// - [`GraphError::DuplicateResource`] if `id` was already declared.
    /// - [`GraphError::UnknownDependency`] if a dependency was not declared.
    /// - [`GraphError::KindMismatch`] if a spec reference has the wrong kind.
    pub fn declare<I, D>(
        &mut self,
        id: impl Into<ResourceId>,
        spec: impl Into<ResourceSpec>,
        dependencies: I,
    ) -> Result<ResourceId, GraphError>
    where
        I: IntoIterator<Item = D>,
        D: Into<ResourceId>,
    {
        let id = id.into();
        let spec = spec.into();

        if self.resources.contains_key(&id) {
            return Err(GraphError::DuplicateResource(id));
        }

        let mut edges: Vec<ResourceId> = Vec::new();

        for (reference, expected) in spec.references() {
            let Some(target) = self.resources.get(&reference) else {
                return Err(GraphError::UnknownDependency {
                    resource: id,
                    dependency: reference,
                });
            };
            if target.kind() != expected {
                return Err(GraphError::KindMismatch {
                    resource: id,
                    reference,
                    expected,
                    found: target.kind(),
                });
            }
            if !edges.contains(&reference) {
                edges.push(reference);
            }
        }

        for dependency in dependencies {
            let dependency = dependency.into();
            if dependency != id && !self.resources.contains_key(&dependency) {
                return Err(GraphError::UnknownDependency {
                    resource: id,
                    dependency,
                });
            }
            if !edges.contains(&dependency) {
                edges.push(dependency);
            }
        }

        tracing::debug!(resource = %id, kind = %spec.kind(), dependencies = edges.len(), "declared resource");

        self.resources.insert(
            id.clone(),
            Resource {
                id: id.clone(),
                spec,
                dependencies: edges,
            },
        );
        Ok(id)
    }

    /// Declares a resource whose only dependencies are the resources its spec
    /// references.
    ///
    /// # Errors
    ///
    /// See [`declare`](Self::declare).
    pub fn add(
        &mut self,
        id: impl Into<ResourceId>,
        spec: impl Into<ResourceSpec>,
    ) -> Result<ResourceId, GraphError> {
        self.declare(id, spec, core::iter::empty::<ResourceId>())
    }

    /// Adds a dependency edge between two declared resources: `resource`
    /// will not be created until `dependency` is ready.
    ///
    /// # Errors
    ///
    /// - [`GraphError::UnknownResource`] if `resource` is undeclared.
    /// - [`GraphError::UnknownDependency`] if `dependency` is undeclared.
    pub fn add_dependency(
        &mut self,
        resource: &ResourceId,
        dependency: &ResourceId,
    ) -> Result<&mut Self, GraphError> {
        if !self.resources.contains_key(dependency) {
            return Err(GraphError::UnknownDependency {
                resource: resource.clone(),
                dependency: dependency.clone(),
            });
        }
        let Some(entry) = self.resources.get_mut(resource) else {
            return Err(GraphError::UnknownResource(resource.clone()));
        };
        if !entry.dependencies.contains(dependency) {
            entry.dependencies.push(dependency.clone());
        }
        Ok(self)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns the resource declared under `id`.
    #[must_use]
    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Returns `true` if `id` has been declared.
    #[must_use]
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    /// Returns the number of declared resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns `true` if nothing has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Iterates over resources in declaration order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Returns the direct dependencies of `id`.
    #[must_use]
    pub fn dependencies_of(&self, id: &ResourceId) -> &[ResourceId] {
        self.resources
            .get(id)
            .map_or(&[], |resource| resource.dependencies.as_slice())
    }

    /// Returns the resources that directly depend on `id`, in declaration order.
    #[must_use]
    pub fn dependents_of(&self, id: &ResourceId) -> Vec<ResourceId> {
        self.resources
            .values()
            .filter(|resource| resource.id != *id && resource.depends_on(id))
            .map(|resource| resource.id.clone())
            .collect()
    }

    /// Returns every resource with a dependency path to `id`, in declaration
    /// order. `id` itself is not included.
    #[must_use]
    pub fn transitive_dependents(&self, id: &ResourceId) -> Vec<ResourceId> {
        let Some(start) = self.resources.get_index_of(id) else {
            return Vec::new();
        };
        let dependents = self.dependent_indices();

        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(index) = queue.pop_front() {
            for &next in &dependents[index] {
                if next != start && seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        seen.into_iter()
            .filter_map(|index| self.id_at(index).cloned())
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation & ordering
    // ─────────────────────────────────────────────────────────────────────────

    /// Checks that the graph is acyclic.
    ///
    /// Runs a depth-first traversal with visiting/visited coloring, starting
    /// from resources in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CyclicDependency`] naming the first cycle found.
    /// Self-loops are reported as a two-element cycle `[a, a]`.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut marks = vec![Mark::Unvisited; self.resources.len()];
        let mut path = Vec::new();

        for index in 0..self.resources.len() {
            if marks[index] == Mark::Unvisited {
                self.visit(index, &mut marks, &mut path)?;
            }
        }
        Ok(())
    }

    fn visit(
        &self,
        index: usize,
        marks: &mut [Mark],
        path: &mut Vec<usize>,
    ) -> Result<(), GraphError> {
        let Some((_, resource)) = self.resources.get_index(index) else {
            return Ok(());
        };

        marks[index] = Mark::Visiting;
        path.push(index);

        for dependency in &resource.dependencies {
            let Some(next) = self.resources.get_index_of(dependency) else {
                continue;
            };
            match marks[next] {
                Mark::Visiting => {
                    let start = path.iter().position(|&i| i == next).unwrap_or(0);
                    let cycle = path[start..]
                        .iter()
                        .chain(core::iter::once(&next))
                        .filter_map(|&i| self.id_at(i).cloned())
                        .collect();
                    return Err(GraphError::CyclicDependency { cycle });
                }
                Mark::Unvisited => self.visit(next, marks, path)?,
                Mark::Visited => {}
            }
        }

        path.pop();
        marks[index] = Mark::Visited;
        Ok(())
    }

    /// Returns a linearization in which every dependency precedes its
    /// dependents.
    ///
    /// Among resources whose dependencies are all satisfied, the one declared
    /// first comes first.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CyclicDependency`] if the graph has a cycle.
    pub fn topological_order(&self) -> Result<Vec<ResourceId>, GraphError> {
        let dependents = self.dependent_indices();
        let mut remaining: Vec<usize> = self
            .resources
            .values()
            .map(|resource| resource.dependencies.len())
            .collect();

        let mut ready: BTreeSet<usize> = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(index, _)| index)
            .collect();

        let mut order = Vec::with_capacity(self.resources.len());
        while let Some(index) = ready.pop_first() {
            order.push(index);
            for &next in &dependents[index] {
                remaining[next] -= 1;
                if remaining[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() < self.resources.len() {
            self.validate()?;
        }

        Ok(order
            .into_iter()
            .filter_map(|index| self.id_at(index).cloned())
            .collect())
    }

    /// For each resource index, the indices of resources that depend on it.
    fn dependent_indices(&self) -> Vec<Vec<usize>> {
        let mut dependents = vec![Vec::new(); self.resources.len()];
        for (index, resource) in self.resources.values().enumerate() {
            for dependency in &resource.dependencies {
                if let Some(from) = self.resources.get_index_of(dependency) {
                    dependents[from].push(index);
                }
            }
        }
        dependents
    }

    fn id_at(&self, index: usize) -> Option<&ResourceId> {
        self.resources.get_index(index).map(|(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ContainerSpec, ImageSpec, NetworkSpec};

    fn image(graph: &mut DependencyGraph, name: &str) -> ResourceId {
        graph.add(name, ImageSpec::new(format!("{name}:latest"))).unwrap()
    }

    #[test]
    fn self_loop_is_reported_as_cycle() {
        let mut graph = DependencyGraph::new();
        let a = graph
            .declare("a", ImageSpec::new("a:latest"), ["a"])
            .unwrap();

        let err = graph.validate().unwrap_err();
        assert_eq!(
            err,
            GraphError::CyclicDependency {
                cycle: vec![a.clone(), a]
            }
        );
    }

    #[test]
    fn cycle_via_add_dependency_is_named() {
        let mut graph = DependencyGraph::new();
        let a = image(&mut graph, "a");
        let b = graph.declare("b", ImageSpec::new("b:1"), [&a]).unwrap();
        graph.add_dependency(&a, &b).unwrap();

        let err = graph.topological_order().unwrap_err();
        assert_eq!(err.to_string(), "cyclic dependency: a -> b -> a");
    }

    #[test]
    fn container_reference_must_have_right_kind() {
        let mut graph = DependencyGraph::new();
        let net = graph.add("net", NetworkSpec::new("n")).unwrap();
        let img = image(&mut graph, "img");

        let err = graph
            .add("c", ContainerSpec::new("c", net.clone(), img.clone()))
            .unwrap_err();
        assert!(matches!(err, GraphError::KindMismatch { .. }));
    }

    #[test]
    fn transitive_dependents_excludes_unrelated() {
        let mut graph = DependencyGraph::new();
        let a = image(&mut graph, "a");
        let b = graph.declare("b", ImageSpec::new("b:1"), [&a]).unwrap();
        let c = graph.declare("c", ImageSpec::new("c:1"), [&b]).unwrap();
        let _d = image(&mut graph, "d");

        assert_eq!(graph.transitive_dependents(&a), vec![b, c]);
    }
}
