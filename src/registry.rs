use std::{
    collections::{btree_map::BTreeMap, btree_set::BTreeSet},
    fmt::{self, Debug, Formatter},
    future::Future,
};

use crate::{
    dependency::Dependencies,
    errors::{DFSErrorKind, InstantiateErrorKind},
    instantiator::{Callback, CallingConvention, Factory},
    scope::Scope,
};

/// A named provider: how to produce its instances, their lifetime and the names it depends on
#[derive(Clone)]
pub struct ProviderRecord {
    pub(crate) name: String,
    pub(crate) scope: Scope,
    pub(crate) dependencies: Box<[String]>,
    pub(crate) factory: Factory,
}

impl ProviderRecord {
    /// # Panics
    /// Panics if `name` is empty
    #[must_use]
    pub fn new<N, D>(name: N, factory: Factory, scope: Scope, dependencies: D) -> Self
    where
        N: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let name = name.into();
        assert!(!name.is_empty(), "provider name can't be empty");

        Self {
            name,
            scope,
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            factory,
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub const fn scope(&self) -> Scope {
        self.scope
    }

    /// Declared dependency names, in positional order
    #[inline]
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    #[inline]
    #[must_use]
    pub const fn calling_convention(&self) -> CallingConvention {
        self.factory.calling_convention()
    }

    #[inline]
    #[must_use]
    pub const fn is_literal_instance(&self) -> bool {
        self.factory.is_literal_instance()
    }

    #[inline]
    #[must_use]
    pub(crate) fn unique_dependencies(&self) -> BTreeSet<&str> {
        self.dependencies.iter().map(String::as_str).collect()
    }
}

impl Debug for ProviderRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRecord")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("calling_convention", &self.calling_convention())
            .field("is_literal_instance", &self.is_literal_instance())
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Providers keyed by their logical name.
///
/// Registering a name twice replaces the previous record.
#[derive(Default, Clone)]
pub struct Registry {
    pub(crate) records: BTreeMap<String, ProviderRecord>,
}

impl Registry {
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { records: BTreeMap::new() }
    }

    /// Inserts the record, returning the one it replaced
    pub fn register(&mut self, record: ProviderRecord) -> Option<ProviderRecord> {
        self.records.insert(record.name.clone(), record)
    }

    #[inline]
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&ProviderRecord> {
        self.records.get(name)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    #[inline]
    pub fn records(&self) -> impl Iterator<Item = &ProviderRecord> {
        self.records.values()
    }

    /// Registers a factory returning the instance directly
    #[inline]
    #[must_use]
    pub fn provide<F, T, E>(mut self, name: &str, dependencies: &[&str], factory: F, scope: Scope) -> Self
    where
        F: FnMut(Dependencies) -> Result<T, E> + Clone + Send + Sync + 'static,
        T: Send + Sync + 'static,
        E: Into<InstantiateErrorKind>,
    {
        self.register(ProviderRecord::new(name, Factory::direct(factory), scope, dependencies.iter().copied()));
        self
    }

    /// Registers a factory returning a future of the instance
    #[inline]
    #[must_use]
    pub fn provide_async<F, Fut, T, E>(mut self, name: &str, dependencies: &[&str], factory: F, scope: Scope) -> Self
    where
        F: FnMut(Dependencies) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + Sync + 'static,
        E: Into<InstantiateErrorKind>,
    {
        self.register(ProviderRecord::new(name, Factory::future(factory), scope, dependencies.iter().copied()));
        self
    }

    /// Registers a factory completing a trailing [`Callback`]
    #[inline]
    #[must_use]
    pub fn provide_callback<F, T>(mut self, name: &str, dependencies: &[&str], factory: F, scope: Scope) -> Self
    where
        F: FnMut(Dependencies, Callback<T>) + Clone + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.register(ProviderRecord::new(name, Factory::callback(factory), scope, dependencies.iter().copied()));
        self
    }

    /// Registers a pre-built singleton instance
    #[inline]
    #[must_use]
    pub fn provide_instance<T: Send + Sync + 'static>(mut self, name: &str, value: T) -> Self {
        self.register(ProviderRecord::new(name, Factory::instance(value), Scope::Singleton, [] as [String; 0]));
        self
    }

    /// Moves the records of `other` into this registry, replacing records with the same name
    #[inline]
    #[must_use]
    pub fn extend(mut self, other: Registry) -> Self {
        self.records.extend(other.records);
        self
    }
}

impl Registry {
    /// Detects a cycle among the providers reachable from `name`.
    /// The walk is iterative, deep chains don't grow the call stack.
    pub(crate) fn dfs_detect_from(&self, name: &str) -> Result<(), DFSErrorKind> {
        let Some((name, record)) = self.records.get_key_value(name) else {
            return Ok(());
        };

        let mut visited = BTreeSet::new();
        let mut on_stack = BTreeSet::from([name.as_str()]);
        let mut stack = vec![name.as_str()];
        // Dependencies left to visit, one iterator per name on `stack`
        let mut pending = vec![record.unique_dependencies().into_iter()];

        while let Some(dependencies) = pending.last_mut() {
            let Some(dependency) = dependencies.next() else {
                pending.pop();
                if let Some(done) = stack.pop() {
                    on_stack.remove(done);
                    visited.insert(done);
                }
                continue;
            };

            if visited.contains(dependency) {
                continue;
            }
            if on_stack.contains(dependency) {
                stack.push(dependency);
                return Err(cyclic_dependency(stack));
            }
            // Unregistered dependencies resolve to `None` and can't take part in a cycle
            let Some(record) = self.records.get(dependency) else {
                continue;
            };

            stack.push(dependency);
            on_stack.insert(dependency);
            pending.push(record.unique_dependencies().into_iter());
        }
        Ok(())
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.records.values()).finish()
    }
}

/// Trims the DFS stack to the cycle itself, so `a -> b -> a` is reported instead of the path leading to it
fn cyclic_dependency(stack: Vec<&str>) -> DFSErrorKind {
    let repeated = stack.last().copied().unwrap_or_default();
    let start = stack.iter().position(|name| *name == repeated).unwrap_or_default();
    let mut cycle = stack[start..].iter().map(|name| (*name).to_owned());
    let head = cycle.next().unwrap_or_default();

    DFSErrorKind::CyclicDependency {
        graph: (head, cycle.collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::{ProviderRecord, Registry};
    use crate::{
        errors::{DFSErrorKind, InstantiateErrorKind},
        instantiator::{CallingConvention, Factory},
        scope::Scope::*,
        Dependencies,
    };

    #[test]
    fn test_register_last_write_wins() {
        let mut registry = Registry::new()
            .provide("a", &[], |_| Ok::<_, InstantiateErrorKind>(1_u8), Singleton)
            .provide_async("b", &["a"], |_| async { Ok::<_, InstantiateErrorKind>(2_u8) }, Prototype);

        let previous = registry.register(ProviderRecord::new("a", Factory::instance(3_u8), Prototype, ["b", "b"]));

        assert!(previous.is_some());
        assert_eq!(registry.len(), 2);

        let record = registry.lookup("a").unwrap();
        assert!(record.is_literal_instance());
        assert_eq!(record.scope(), Prototype);
        assert_eq!(record.dependencies(), ["b".to_owned(), "b".to_owned()]);
        assert_eq!(record.unique_dependencies().len(), 1);

        let record = registry.lookup("b").unwrap();
        assert_eq!(record.calling_convention(), CallingConvention::FutureReturning);
        assert!(registry.lookup("c").is_none());
    }

    #[test]
    #[should_panic(expected = "provider name can't be empty")]
    fn test_empty_name() {
        let _ = ProviderRecord::new("", Factory::instance(()), Singleton, [] as [&str; 0]);
    }

    #[test]
    fn test_dfs_detect() {
        let registry = Registry::new()
            .provide("root", &["a"], |_| Ok::<_, InstantiateErrorKind>(()), Singleton)
            .provide("a", &["b"], |_| Ok::<_, InstantiateErrorKind>(()), Singleton)
            .provide("b", &["a", "missing"], |_| Ok::<_, InstantiateErrorKind>(()), Singleton)
            .provide("alone", &["missing"], |_| Ok::<_, InstantiateErrorKind>(()), Singleton);

        let err = registry.dfs_detect_from("a").unwrap_err();
        assert_eq!(
            err,
            DFSErrorKind::CyclicDependency {
                graph: ("a".to_owned(), vec!["b".to_owned(), "a".to_owned()].into_boxed_slice()),
            }
        );
        assert!(registry.dfs_detect_from("root").is_err());
        assert!(registry.dfs_detect_from("alone").is_ok());
        assert!(registry.dfs_detect_from("missing").is_ok());
    }

    #[test]
    fn test_self_dependency() {
        let registry = Registry::new().provide_callback(
            "self",
            &["self"],
            |_deps: Dependencies, callback: crate::Callback<()>| callback.ok(()),
            Singleton,
        );

        assert_eq!(registry.dfs_detect_from("self").unwrap_err().name(), "self");
    }

    #[test]
    fn test_dfs_detect_long_chain() {
        const LEN: usize = 100_000;

        let mut registry = Registry::new().provide(&format!("n{LEN}"), &[], |_| Ok::<_, InstantiateErrorKind>(()), Singleton);
        for index in 0..LEN {
            let next = format!("n{}", index + 1);
            registry = registry.provide(&format!("n{index}"), &[next.as_str()], |_| Ok::<_, InstantiateErrorKind>(()), Singleton);
        }
        assert!(registry.dfs_detect_from("n0").is_ok());

        let registry = registry.provide(&format!("n{LEN}"), &["n0"], |_| Ok::<_, InstantiateErrorKind>(()), Singleton);
        let err = registry.dfs_detect_from("n0").unwrap_err();
        let DFSErrorKind::CyclicDependency { graph: (head, rest) } = err;
        assert_eq!(head, "n0");
        assert_eq!(rest.len(), LEN + 1);
        assert_eq!(rest.last().map(String::as_str), Some("n0"));
    }
}
