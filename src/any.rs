use std::{
    any::{type_name, Any},
    sync::Arc,
};

/// Type-erased instance produced by a provider
pub type Instance = Arc<dyn Any + Send + Sync>;

#[inline]
#[must_use]
pub(crate) fn instance<T: Send + Sync + 'static>(value: T) -> Instance {
    Arc::new(value)
}

/// Downcasts a shared instance, returning the expected type name on mismatch
#[inline]
pub(crate) fn downcast<T: Send + Sync + 'static>(instance: Instance) -> Result<Arc<T>, &'static str> {
    instance.downcast::<T>().map_err(|_| type_name::<T>())
}
