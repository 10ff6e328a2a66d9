use std::{slice, sync::Arc};

use crate::{
    any::{downcast, Instance},
    errors::InstantiateErrorKind,
};

/// Resolved dependencies of a provider, in the order they were declared.
///
/// A position holds `None` when no provider is registered under the declared name,
/// so optional dependencies can be handled by the factory itself.
#[derive(Clone, Default)]
pub struct Dependencies {
    names: Box<[String]>,
    values: Box<[Option<Instance>]>,
}

impl Dependencies {
    #[inline]
    #[must_use]
    pub(crate) fn new(names: Box<[String]>, values: Box<[Option<Instance>]>) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self { names, values }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Declared name of the dependency at `position`
    #[inline]
    #[must_use]
    pub fn name(&self, position: usize) -> Option<&str> {
        self.names.get(position).map(String::as_str)
    }

    /// Untyped instance at `position`, `None` if the position is out of range or has no provider
    #[inline]
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&Instance> {
        self.values.get(position).and_then(Option::as_ref)
    }

    /// Typed instance at `position`, `Ok(None)` if there is no provider for it
    ///
    /// # Errors
    /// Returns [`InstantiateErrorKind::IncorrectType`] if the instance isn't a `T`
    pub fn get_as<T: Send + Sync + 'static>(&self, position: usize) -> Result<Option<Arc<T>>, InstantiateErrorKind> {
        match self.get(position) {
            Some(instance) => downcast(instance.clone())
                .map(Some)
                .map_err(|expected| InstantiateErrorKind::IncorrectType { position, expected }),
            None => Ok(None),
        }
    }

    /// Typed instance at `position` that must be present
    ///
    /// # Errors
    /// - Returns [`InstantiateErrorKind::MissingDependency`] if there is no provider for it
    /// - Returns [`InstantiateErrorKind::IncorrectType`] if the instance isn't a `T`
    pub fn require<T: Send + Sync + 'static>(&self, position: usize) -> Result<Arc<T>, InstantiateErrorKind> {
        self.get_as(position)?.ok_or_else(|| InstantiateErrorKind::MissingDependency {
            name: self.name(position).unwrap_or_default().to_owned(),
            position,
        })
    }

    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, Option<Instance>> {
        self.values.iter()
    }
}

impl<'a> IntoIterator for &'a Dependencies {
    type Item = &'a Option<Instance>;
    type IntoIter = slice::Iter<'a, Option<Instance>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
