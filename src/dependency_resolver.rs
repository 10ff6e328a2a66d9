use futures_util::{stream::FuturesUnordered, StreamExt as _};
use std::collections::{btree_map::BTreeMap, btree_set::BTreeSet, VecDeque};
use tracing::{debug, error};

use crate::{container::Container, errors::DFSErrorKind, registry::Registry, ResolveErrorKind};

/// Dependency graph of a registry, with edges from each dependency to its dependents.
///
/// Every registered provider is a node, including providers without dependencies.
/// Dependencies without a provider aren't part of the graph, they're resolved to `None`.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    dependencies: BTreeMap<String, BTreeSet<String>>,
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    #[must_use]
    pub fn new(registry: &Registry) -> Self {
        let mut graph = Self::default();

        for record in registry.records() {
            graph.dependents.entry(record.name.clone()).or_default();

            let dependencies = graph.dependencies.entry(record.name.clone()).or_default();
            for dependency in record.unique_dependencies() {
                if !registry.contains(dependency) {
                    continue;
                }
                dependencies.insert(dependency.to_owned());
                graph
                    .dependents
                    .entry(dependency.to_owned())
                    .or_default()
                    .insert(record.name.clone());
            }
        }

        graph
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Registered dependencies of `name`
    pub fn dependencies(&self, name: &str) -> impl Iterator<Item = &str> {
        self.dependencies.get(name).into_iter().flatten().map(String::as_str)
    }

    /// Providers that declare `name` as a dependency
    pub fn dependents(&self, name: &str) -> impl Iterator<Item = &str> {
        self.dependents.get(name).into_iter().flatten().map(String::as_str)
    }

    /// Returns an order in which every provider comes after all of its dependencies
    ///
    /// # Errors
    /// Returns [`DFSErrorKind::CyclicDependency`] if the graph has a cycle
    pub fn plan(&self) -> Result<Vec<String>, DFSErrorKind> {
        let mut in_degrees = self.in_degrees();
        let mut ready: VecDeque<&str> = in_degrees
            .iter()
            .filter_map(|(name, degree)| (*degree == 0).then_some(*name))
            .collect();
        let mut plan = Vec::with_capacity(self.len());

        while let Some(name) = ready.pop_front() {
            plan.push(name.to_owned());
            for dependent in self.dependents(name) {
                if let Some(degree) = in_degrees.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
        }

        if plan.len() == self.len() {
            return Ok(plan);
        }

        let planned: BTreeSet<&str> = plan.iter().map(String::as_str).collect();
        Err(self.find_cycle(|name| !planned.contains(name)))
    }

    /// # Errors
    /// Returns [`DFSErrorKind::CyclicDependency`] if the graph has a cycle
    #[inline]
    pub fn check(&self) -> Result<(), DFSErrorKind> {
        self.plan().map(|_| ())
    }

    #[must_use]
    fn in_degrees(&self) -> BTreeMap<&str, usize> {
        self.dependencies
            .iter()
            .map(|(name, dependencies)| (name.as_str(), dependencies.len()))
            .collect()
    }

    /// Walks dependencies among the unplanned nodes until one repeats.
    /// Each unplanned node has at least one unplanned dependency, so the walk always closes a cycle.
    #[must_use]
    fn find_cycle(&self, unplanned: impl Fn(&str) -> bool) -> DFSErrorKind {
        let mut path: Vec<&str> = Vec::new();
        let mut current = self.dependencies.keys().map(String::as_str).find(|name| unplanned(name));

        while let Some(name) = current {
            if let Some(start) = path.iter().position(|visited| *visited == name) {
                path.drain(..start);
                path.push(name);
                break;
            }
            path.push(name);
            current = self.dependencies(name).find(|dependency| unplanned(dependency));
        }

        let mut cycle = path.into_iter().map(str::to_owned);
        DFSErrorKind::CyclicDependency {
            graph: (cycle.next().unwrap_or_default(), cycle.collect()),
        }
    }
}

/// Builds every node of the graph, each only after all of its dependencies are built.
///
/// At most `concurrency` nodes are requested at a time. After the first failure no new node is started,
/// nodes already in flight run to completion and the first failure is returned.
pub(crate) async fn resolve_all(container: &Container, graph: &DependencyGraph, concurrency: usize) -> Result<(), ResolveErrorKind> {
    graph.check()?;

    let mut in_degrees = graph.in_degrees();
    let mut ready: VecDeque<&str> = in_degrees
        .iter()
        .filter_map(|(name, degree)| (*degree == 0).then_some(*name))
        .collect();
    let mut in_flight = FuturesUnordered::new();
    let mut first_err = None;
    let mut built = 0_usize;

    loop {
        while first_err.is_none() && in_flight.len() < concurrency {
            let Some(name) = ready.pop_front() else {
                break;
            };
            debug!(name, "Scheduled");
            let resolve = container.resolve_name(name, None);
            in_flight.push(async move { (name, resolve.await) });
        }

        let Some((name, result)) = in_flight.next().await else {
            break;
        };
        match result {
            Ok(_) => {
                built += 1;
                for dependent in graph.dependents(name) {
                    if let Some(degree) = in_degrees.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.push_back(dependent);
                        }
                    }
                }
            }
            Err(err) => {
                error!(name, %err, "Bootstrap failed");
                first_err.get_or_insert(err);
            }
        }
    }

    if let Some(err) = first_err {
        return Err(err);
    }

    debug!(built, "Bootstrap completed");
    Ok(())
}
