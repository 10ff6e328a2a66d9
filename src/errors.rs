mod dependency_resolver;
mod discovery;
mod instantiate;
mod instantiator;

pub use dependency_resolver::ResolveErrorKind;
pub use discovery::{AnnotationErrorKind, DiscoveryErrorKind, LoadErrorKind};
pub use instantiate::InstantiateErrorKind;
pub use instantiator::{DFSErrorKind, InstantiatorErrorKind};
