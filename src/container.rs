use futures_util::{future::join_all, FutureExt as _};
use std::{
    collections::{
        btree_map::{BTreeMap, Entry},
        btree_set::BTreeSet,
    },
    fmt::{self, Debug, Formatter},
    future::ready,
    sync::Arc,
};
use tokio::task::JoinHandle;
use tracing::{debug, debug_span, error, Instrument as _};

use crate::{
    any::{downcast, Instance},
    cache::{Cache, Lookup},
    config::Config,
    dependency::Dependencies,
    dependency_resolver::{resolve_all, DependencyGraph},
    diagnostics::{Diagnostics, TracingDiagnostics},
    errors::{DFSErrorKind, ResolveErrorKind},
    registry::{ProviderRecord, Registry},
    utils::future::BoxFuture,
};

pub(crate) struct ContainerInner {
    registry: Registry,
    cache: Cache,
    config: Config,
    diagnostics: Arc<dyn Diagnostics>,
}

/// Resolves providers of a [`Registry`] by name, caching singleton instances.
///
/// Cloning is cheap, clones share the registry and the singleton cache.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

/// Result of a name in [`Container::get_many`]
#[derive(Debug, Clone)]
pub enum Resolved {
    /// The name was requested once
    One(Option<Instance>),
    /// The name was requested several times, one entry per occurrence
    Many(Vec<Option<Instance>>),
}

impl Resolved {
    fn push(&mut self, instance: Option<Instance>) {
        match self {
            Resolved::One(first) => {
                let first = first.take();
                *self = Resolved::Many(vec![first, instance]);
            }
            Resolved::Many(instances) => instances.push(instance),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Resolved::One(_) => 1,
            Resolved::Many(instances) => instances.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Option<Instance>> {
        match self {
            Resolved::One(instance) => vec![instance],
            Resolved::Many(instances) => instances,
        }
    }
}

impl Debug for Container {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("registry", &self.inner.registry)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Container {
    #[inline]
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self::with_config(registry, Config::default())
    }

    #[inline]
    #[must_use]
    pub fn with_config(registry: Registry, config: Config) -> Self {
        Self::with_diagnostics(registry, config, TracingDiagnostics)
    }

    #[must_use]
    pub fn with_diagnostics(registry: Registry, config: Config, diagnostics: impl Diagnostics + 'static) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                registry,
                cache: Cache::new(),
                config,
                diagnostics: Arc::new(diagnostics),
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Whether a singleton instance of `name` is built and cached
    #[inline]
    #[must_use]
    pub fn is_cached(&self, name: &str) -> bool {
        self.inner.cache.is_built(name)
    }

    /// Order in which the eager bootstrap pass may build the providers
    ///
    /// # Errors
    /// Returns [`DFSErrorKind::CyclicDependency`] if the providers depend on each other in a cycle
    pub fn plan(&self) -> Result<Vec<String>, DFSErrorKind> {
        DependencyGraph::new(&self.inner.registry).plan()
    }

    /// Returns the container, building every provider first when `eager` is set.
    ///
    /// A cycle is detected before any provider is built.
    /// Singletons built before a failure stay cached.
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::CyclicDependency`] if the providers depend on each other in a cycle
    /// - Returns [`ResolveErrorKind::Instantiator`] with the first build failure
    pub async fn bootstrap(self, eager: bool) -> Result<Self, ResolveErrorKind> {
        if !eager {
            return Ok(self);
        }

        let graph = DependencyGraph::new(&self.inner.registry);
        let span = debug_span!("bootstrap", providers = graph.len());
        resolve_all(&self, &graph, self.inner.config.effective_concurrency())
            .instrument(span)
            .await?;

        Ok(self)
    }

    /// Runs [`Container::bootstrap`] on the current runtime and passes the outcome to `callback`
    ///
    /// # Panics
    /// Panics if called outside of a tokio runtime
    pub fn bootstrap_with<F>(self, eager: bool, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<Container, ResolveErrorKind>) + Send + 'static,
    {
        tokio::spawn(async move { callback(self.bootstrap(eager).await) })
    }

    /// Returns an instance of `name`, building it and its dependencies if needed.
    ///
    /// Returns `Ok(None)` if no provider is registered for `name`.
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::CyclicDependency`] if `name` depends on itself
    /// - Returns [`ResolveErrorKind::Instantiator`] if the provider or one of its dependencies failed to build
    pub async fn get(&self, name: &str) -> Result<Option<Instance>, ResolveErrorKind> {
        self.lookup(name).instrument(debug_span!("resolve", name)).await
    }

    /// Returns an instance of `name` downcast to `T`
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::IncorrectType`] if the instance isn't a `T`
    /// - Returns the errors of [`Container::get`]
    pub async fn get_as<T: Send + Sync + 'static>(&self, name: &str) -> Result<Option<Arc<T>>, ResolveErrorKind> {
        match self.get(name).await? {
            Some(instance) => downcast(instance).map(Some).map_err(|expected| ResolveErrorKind::IncorrectType {
                name: name.to_owned(),
                expected,
            }),
            None => Ok(None),
        }
    }

    /// Resolves every occurrence of `names` concurrently.
    ///
    /// A name requested once maps to [`Resolved::One`], a name requested several times
    /// maps to [`Resolved::Many`] with one instance per occurrence.
    ///
    /// Every occurrence is driven to completion, even after another one failed.
    ///
    /// # Errors
    /// Returns the first error of [`Container::get`] among the occurrences, in request order
    pub async fn get_many<I, N>(&self, names: I) -> Result<BTreeMap<String, Resolved>, ResolveErrorKind>
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let instances = join_all(names.iter().map(|name| self.get(name)))
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        let mut resolved = BTreeMap::new();
        for (name, instance) in names.into_iter().zip(instances) {
            match resolved.entry(name) {
                Entry::Vacant(entry) => {
                    entry.insert(Resolved::One(instance));
                }
                Entry::Occupied(mut entry) => entry.get_mut().push(instance),
            }
        }
        Ok(resolved)
    }

    /// Runs [`Container::get`] on the current runtime and passes the outcome to `callback`
    ///
    /// # Panics
    /// Panics if called outside of a tokio runtime
    pub fn get_with<F>(&self, name: impl Into<String>, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<Option<Instance>, ResolveErrorKind>) + Send + 'static,
    {
        let container = self.clone();
        let name = name.into();

        tokio::spawn(async move { callback(container.get(&name).await) })
    }

    /// Runs [`Container::get_many`] on the current runtime and passes the outcome to `callback`
    ///
    /// # Panics
    /// Panics if called outside of a tokio runtime
    pub fn get_many_with<I, N, F>(&self, names: I, callback: F) -> JoinHandle<()>
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
        F: FnOnce(Result<BTreeMap<String, Resolved>, ResolveErrorKind>) + Send + 'static,
    {
        let container = self.clone();
        let names: Vec<String> = names.into_iter().map(Into::into).collect();

        tokio::spawn(async move { callback(container.get_many(names).await) })
    }
}

impl Container {
    async fn lookup(&self, name: &str) -> Result<Option<Instance>, ResolveErrorKind> {
        if let Some(instance) = self.inner.cache.get(name) {
            debug!("Instance found in cache");
            return Ok(Some(instance));
        }

        let Some(record) = self.inner.registry.lookup(name) else {
            self.inner.diagnostics.missing_provider(name, None);
            return Ok(None);
        };
        self.inner.registry.dfs_detect_from(name)?;

        self.resolve(record).await.map(Some)
    }

    /// Resolves a name requested as a dependency or by the bootstrap pass, without a cycle check
    pub(crate) fn resolve_name(&self, name: &str, required_by: Option<&str>) -> BoxFuture<'static, Result<Option<Instance>, ResolveErrorKind>> {
        let Some(record) = self.inner.registry.lookup(name) else {
            self.inner.diagnostics.missing_provider(name, required_by);
            return Box::pin(ready(Ok(None)));
        };

        let resolve = self.resolve(record);
        Box::pin(async move { resolve.await.map(Some) })
    }

    /// Returns the cached singleton, joins its in-flight build or starts a new one.
    /// Prototypes are built on every call.
    pub(crate) fn resolve(&self, record: &ProviderRecord) -> BoxFuture<'static, Result<Instance, ResolveErrorKind>> {
        if !record.scope.is_cached() {
            debug!(name = %record.name, "Prototype, building a new instance");
            return self.instantiate(record);
        }

        let lookup = self.inner.cache.get_or_start(&record.name, || {
            debug!(name = %record.name, "Instance not found in cache");

            let inner = Arc::downgrade(&self.inner);
            let name = record.name.clone();
            let build = self.instantiate(record);

            let build: BoxFuture<'static, _> = Box::pin(async move {
                let result = build.await;
                if let Some(inner) = inner.upgrade() {
                    inner.cache.finish(&name, &result);
                }
                result
            });
            build.shared()
        });

        match lookup {
            Lookup::Built(instance) => Box::pin(ready(Ok(instance))),
            Lookup::Building(build) => Box::pin(build),
        }
    }

    /// Resolves the dependencies of `record` and invokes its factory once.
    ///
    /// The returned future holds the container weakly until it's polled,
    /// so an in-flight build stored in the cache doesn't keep the container alive.
    fn instantiate(&self, record: &ProviderRecord) -> BoxFuture<'static, Result<Instance, ResolveErrorKind>> {
        let inner = Arc::downgrade(&self.inner);
        let name = record.name.clone();
        let dependency_names = record.dependencies.clone();
        let factory = record.factory.clone();
        let span = debug_span!("instantiate", name = %record.name, scope = %record.scope);

        Box::pin(
            async move {
                let Some(inner) = inner.upgrade() else {
                    return Err(ResolveErrorKind::ContainerDropped { name });
                };
                let container = Container { inner };

                let dependencies = if factory.is_literal_instance() {
                    Dependencies::default()
                } else {
                    match container.resolve_dependencies(&name, dependency_names).await {
                        Ok(dependencies) => dependencies,
                        Err(err) => {
                            error!(%err, "Dependency resolution failed");
                            return Err(ResolveErrorKind::deps(&name, err));
                        }
                    }
                };
                drop(container);

                match factory.build(dependencies).await {
                    Ok(instance) => {
                        debug!("Instance built");
                        Ok(instance)
                    }
                    Err(err) => {
                        error!(%err, "Factory failed");
                        Err(ResolveErrorKind::factory(&name, err))
                    }
                }
            }
            .instrument(span),
        )
    }

    /// Resolves each distinct name once, concurrently, and places the instances at every position it's declared at.
    ///
    /// A failed dependency doesn't cancel its siblings, they run to completion before the first error is returned.
    async fn resolve_dependencies(&self, required_by: &str, names: Box<[String]>) -> Result<Dependencies, ResolveErrorKind> {
        let unique: BTreeSet<&str> = names.iter().map(String::as_str).collect();
        let instances = join_all(unique.iter().map(|name| self.resolve_name(name, Some(required_by))))
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;
        let by_name: BTreeMap<&str, Option<Instance>> = unique.into_iter().zip(instances).collect();

        let values = names
            .iter()
            .map(|name| by_name.get(name.as_str()).cloned().flatten())
            .collect();

        debug!(count = names.len(), "Dependencies resolved");
        Ok(Dependencies::new(names, values))
    }
}
