use std::{
    any::type_name,
    fmt::{self, Display, Formatter},
    future::{ready, Future},
    str::FromStr,
};
use tokio::sync::oneshot;
use tracing::{debug, debug_span, Instrument as _};

use crate::{
    any::{instance, Instance},
    dependency::Dependencies,
    errors::{AnnotationErrorKind, InstantiateErrorKind},
    service::{service_fn, BoxCloneService, Service as _},
    utils::future::BoxFuture,
};

/// How a factory is invoked and how it signals completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CallingConvention {
    /// Returns the instance synchronously
    #[default]
    Direct,
    /// Returns a future resolving to the instance
    FutureReturning,
    /// Receives a trailing [`Callback`] and completes it with the instance
    CallbackStyle,
}

impl Display for CallingConvention {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallingConvention::Direct => "sync",
            CallingConvention::FutureReturning => "promise",
            CallingConvention::CallbackStyle => "callback",
        })
    }
}

impl FromStr for CallingConvention {
    type Err = AnnotationErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "sync" | "none" | "false" => Ok(CallingConvention::Direct),
            "promise" | "future" => Ok(CallingConvention::FutureReturning),
            "callback" => Ok(CallingConvention::CallbackStyle),
            _ => Err(AnnotationErrorKind::InvalidAsync(s.to_owned())),
        }
    }
}

/// Completion handle passed as the trailing argument of a callback-style factory.
///
/// The handle is consumed on completion, so a factory can complete it only once.
/// Dropping it without completing fails the build with [`InstantiateErrorKind::CallbackDropped`].
pub struct Callback<T> {
    tx: oneshot::Sender<Result<T, InstantiateErrorKind>>,
}

impl<T> Callback<T> {
    /// Completes the build with `(error, value)`, exactly one of which must be present
    pub fn call<E: Into<InstantiateErrorKind>>(self, error: Option<E>, value: Option<T>) {
        let result = match (error, value) {
            (None, Some(value)) => Ok(value),
            (Some(error), None) => Err(error.into()),
            (error, value) => Err(InstantiateErrorKind::CallbackArguments {
                error: error.is_some(),
                value: value.is_some(),
            }),
        };
        // The receiver is gone only if the build itself was dropped
        let _ = self.tx.send(result);
    }

    #[inline]
    pub fn ok(self, value: T) {
        self.call(None::<InstantiateErrorKind>, Some(value));
    }

    #[inline]
    pub fn err<E: Into<InstantiateErrorKind>>(self, error: E) {
        self.call(Some(error), None);
    }
}

pub(crate) type BoxedCloneInstantiator = BoxCloneService<Dependencies, Instance, InstantiateErrorKind>;

#[must_use]
pub(crate) fn boxed_direct_instantiator<F, T, E>(mut factory: F) -> BoxedCloneInstantiator
where
    F: FnMut(Dependencies) -> Result<T, E> + Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
    E: Into<InstantiateErrorKind>,
{
    BoxCloneService::new(service_fn(move |dependencies| {
        ready(factory(dependencies).map(instance).map_err(Into::into))
    }))
}

#[must_use]
pub(crate) fn boxed_future_instantiator<F, Fut, T, E>(factory: F) -> BoxedCloneInstantiator
where
    F: FnMut(Dependencies) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + Sync + 'static,
    E: Into<InstantiateErrorKind>,
{
    BoxCloneService::new(service_fn(move |dependencies| {
        let mut factory = factory.clone();

        async move { factory(dependencies).await.map(instance).map_err(Into::into) }
    }))
}

#[must_use]
pub(crate) fn boxed_callback_instantiator<F, T>(factory: F) -> BoxedCloneInstantiator
where
    F: FnMut(Dependencies, Callback<T>) + Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    BoxCloneService::new(service_fn(move |dependencies| {
        let (tx, rx) = oneshot::channel();
        let mut factory = factory.clone();
        factory(dependencies, Callback { tx });

        async move {
            match rx.await {
                Ok(result) => result.map(instance),
                Err(_) => Err(InstantiateErrorKind::CallbackDropped),
            }
        }
    }))
}

#[derive(Clone)]
enum Kind {
    Instance(Instance),
    Instantiator {
        instantiator: BoxedCloneInstantiator,
        convention: CallingConvention,
        provides: &'static str,
    },
}

/// Produces the instances of a provider: either a pre-built instance or a factory
/// with one of the three calling conventions.
#[derive(Clone)]
pub struct Factory(Kind);

impl Factory {
    /// Factory returning the instance synchronously
    #[must_use]
    pub fn direct<F, T, E>(factory: F) -> Self
    where
        F: FnMut(Dependencies) -> Result<T, E> + Clone + Send + Sync + 'static,
        T: Send + Sync + 'static,
        E: Into<InstantiateErrorKind>,
    {
        Self::instantiator::<T>(boxed_direct_instantiator(factory), CallingConvention::Direct)
    }

    /// Factory returning a future of the instance
    #[must_use]
    pub fn future<F, Fut, T, E>(factory: F) -> Self
    where
        F: FnMut(Dependencies) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + Sync + 'static,
        E: Into<InstantiateErrorKind>,
    {
        Self::instantiator::<T>(boxed_future_instantiator(factory), CallingConvention::FutureReturning)
    }

    /// Factory completing a trailing [`Callback`]
    #[must_use]
    pub fn callback<F, T>(factory: F) -> Self
    where
        F: FnMut(Dependencies, Callback<T>) + Clone + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        Self::instantiator::<T>(boxed_callback_instantiator(factory), CallingConvention::CallbackStyle)
    }

    /// Pre-built value returned unchanged on every build
    #[must_use]
    pub fn instance<T: Send + Sync + 'static>(value: T) -> Self {
        Self(Kind::Instance(instance(value)))
    }

    #[must_use]
    fn instantiator<T>(instantiator: BoxedCloneInstantiator, convention: CallingConvention) -> Self {
        Self(Kind::Instantiator {
            instantiator,
            convention,
            provides: type_name::<T>(),
        })
    }

    #[inline]
    #[must_use]
    pub const fn calling_convention(&self) -> CallingConvention {
        match &self.0 {
            Kind::Instance(_) => CallingConvention::Direct,
            Kind::Instantiator { convention, .. } => *convention,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_literal_instance(&self) -> bool {
        matches!(self.0, Kind::Instance(_))
    }

    /// Invokes the factory once under its calling convention
    pub(crate) fn build(&self, dependencies: Dependencies) -> BoxFuture<'static, Result<Instance, InstantiateErrorKind>> {
        match &self.0 {
            Kind::Instance(instance) => {
                debug!("Literal instance");
                Box::pin(ready(Ok(instance.clone())))
            }
            Kind::Instantiator {
                instantiator,
                convention,
                provides,
            } => {
                let mut instantiator = instantiator.clone();
                let span = debug_span!("instantiator", provides = *provides, convention = %convention);
                let future = instantiator.call(dependencies);

                Box::pin(
                    async move {
                        let instance = future.await?;
                        debug!("Instantiated");
                        Ok(instance)
                    }
                    .instrument(span),
                )
            }
        }
    }
}
