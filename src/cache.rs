use futures_util::future::Shared;
use parking_lot::Mutex;
use std::collections::btree_map::{BTreeMap, Entry};

use crate::{any::Instance, errors::ResolveErrorKind, utils::future::BoxFuture};

pub(crate) type SharedBuild = Shared<BoxFuture<'static, Result<Instance, ResolveErrorKind>>>;

/// State of a singleton name; an absent slot means the name hasn't been built yet
#[derive(Clone)]
enum Slot {
    Building(SharedBuild),
    Built(Instance),
}

pub(crate) enum Lookup {
    Built(Instance),
    Building(SharedBuild),
}

/// Singleton instances and in-flight singleton builds, keyed by provider name
#[derive(Default)]
pub(crate) struct Cache {
    slots: Mutex<BTreeMap<String, Slot>>,
}

impl Cache {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub(crate) fn get(&self, name: &str) -> Option<Instance> {
        match self.slots.lock().get(name) {
            Some(Slot::Built(instance)) => Some(instance.clone()),
            _ => None,
        }
    }

    /// Returns the built instance or the in-flight build of `name`,
    /// starting a new build with `start` if there is neither.
    ///
    /// The check and the insert happen under one lock, so at most one build per name is in flight.
    pub(crate) fn get_or_start(&self, name: &str, start: impl FnOnce() -> SharedBuild) -> Lookup {
        let mut slots = self.slots.lock();
        match slots.entry(name.to_owned()) {
            Entry::Occupied(entry) => match entry.get() {
                Slot::Built(instance) => Lookup::Built(instance.clone()),
                Slot::Building(build) => Lookup::Building(build.clone()),
            },
            Entry::Vacant(entry) => {
                let build = start();
                entry.insert(Slot::Building(build.clone()));
                Lookup::Building(build)
            }
        }
    }

    /// Stores the outcome of a finished build. Failures are not cached, so the next request retries.
    pub(crate) fn finish(&self, name: &str, result: &Result<Instance, ResolveErrorKind>) {
        let mut slots = self.slots.lock();
        match result {
            Ok(instance) => {
                slots.insert(name.to_owned(), Slot::Built(instance.clone()));
            }
            Err(_) => {
                if let Some(Slot::Building(_)) = slots.get(name) {
                    slots.remove(name);
                }
            }
        }
    }

    #[must_use]
    pub(crate) fn is_built(&self, name: &str) -> bool {
        matches!(self.slots.lock().get(name), Some(Slot::Built(_)))
    }
}

#[cfg(test)]
mod tests {
    use futures_util::FutureExt as _;
    use std::sync::Arc;

    use super::{Cache, Lookup, SharedBuild};
    use crate::{any::instance, errors::ResolveErrorKind, errors::DFSErrorKind};

    fn ready_build(value: u8) -> SharedBuild {
        let built = instance(value);
        (Box::pin(async move { Ok(built) }) as crate::utils::future::BoxFuture<'static, _>).shared()
    }

    #[tokio::test]
    async fn test_get_or_start_once() {
        let cache = Cache::new();

        let Lookup::Building(first) = cache.get_or_start("a", || ready_build(1)) else {
            panic!("expected a new build");
        };
        let Lookup::Building(second) = cache.get_or_start("a", || panic!("build started twice")) else {
            panic!("expected the in-flight build");
        };
        assert!(cache.get("a").is_none());

        let first = first.await;
        let second = second.await;
        assert!(Arc::ptr_eq(first.as_ref().unwrap(), second.as_ref().unwrap()));

        cache.finish("a", &first);
        assert!(cache.is_built("a"));
        assert!(matches!(cache.get_or_start("a", || panic!("already built")), Lookup::Built(_)));
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let cache = Cache::new();

        let _ = cache.get_or_start("a", || ready_build(1));
        cache.finish(
            "a",
            &Err(ResolveErrorKind::CyclicDependency(DFSErrorKind::CyclicDependency {
                graph: ("a".to_owned(), Box::default()),
            })),
        );

        assert!(!cache.is_built("a"));
        assert!(matches!(cache.get_or_start("a", || ready_build(2)), Lookup::Building(_)));
    }
}
