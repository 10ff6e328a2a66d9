pub(crate) mod annotation;
pub(crate) mod any;
pub(crate) mod cache;
pub(crate) mod config;
pub(crate) mod container;
pub(crate) mod dependency;
pub(crate) mod dependency_resolver;
pub(crate) mod diagnostics;
pub(crate) mod discovery;
pub(crate) mod errors;
pub(crate) mod instantiator;
pub(crate) mod registry;
pub(crate) mod scope;
pub(crate) mod service;
pub(crate) mod utils;

pub use annotation::{parse_provides, parse_requires, Provides};
pub use any::Instance;
pub use config::Config;
pub use container::{Container, Resolved};
pub use dependency::Dependencies;
pub use dependency_resolver::DependencyGraph;
pub use diagnostics::{Diagnostics, TracingDiagnostics};
pub use discovery::{normalize_root, Catalog, Declaration, Discovery, Loader, SourceLocation};
pub use errors::{
    AnnotationErrorKind, DFSErrorKind, DiscoveryErrorKind, InstantiateErrorKind, InstantiatorErrorKind, LoadErrorKind, ResolveErrorKind,
};
pub use instantiator::{Callback, CallingConvention, Factory};
pub use registry::{ProviderRecord, Registry};
pub use scope::Scope;
