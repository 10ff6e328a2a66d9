use std::sync::Arc;

use super::{instantiate::InstantiateErrorKind, instantiator::DFSErrorKind, instantiator::InstantiatorErrorKind};

/// Failure of a lookup or bootstrap pass.
///
/// Cloneable, so every requester waiting on the same in-flight build receives the same error.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ResolveErrorKind {
    #[error(transparent)]
    CyclicDependency(#[from] DFSErrorKind),
    #[error("Provider `{name}` failed to build: {source}")]
    Instantiator {
        name: String,
        source: InstantiatorErrorKind<Box<ResolveErrorKind>, Arc<InstantiateErrorKind>>,
    },
    #[error("Incorrect instance type for `{name}`, expected: {expected}")]
    IncorrectType { name: String, expected: &'static str },
    #[error("Container was dropped while `{name}` was being built")]
    ContainerDropped { name: String },
}

impl ResolveErrorKind {
    #[inline]
    #[must_use]
    pub(crate) fn deps(name: &str, err: ResolveErrorKind) -> Self {
        Self::Instantiator {
            name: name.to_owned(),
            source: InstantiatorErrorKind::Deps(Box::new(err)),
        }
    }

    #[inline]
    #[must_use]
    pub(crate) fn factory(name: &str, err: InstantiateErrorKind) -> Self {
        Self::Instantiator {
            name: name.to_owned(),
            source: InstantiatorErrorKind::Factory(Arc::new(err)),
        }
    }

    /// Walks through dependency failures down to the provider whose factory failed
    #[must_use]
    pub fn root_cause(&self) -> &ResolveErrorKind {
        match self {
            Self::Instantiator {
                source: InstantiatorErrorKind::Deps(err),
                ..
            } => err.root_cause(),
            err => err,
        }
    }
}
