use std::path::PathBuf;

use crate::instantiator::CallingConvention;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AnnotationErrorKind {
    #[error("Unknown annotation key `{0}`")]
    UnknownKey(String),
    #[error("Invalid scope `{0}`, expected `singleton` or `prototype`")]
    InvalidScope(String),
    #[error("Invalid async kind `{0}`, expected `promise`, `future`, `callback` or `sync`")]
    InvalidAsync(String),
    #[error("Provider name declared twice: `{first}` and `{second}`")]
    DuplicateName { first: String, second: String },
    #[error("Unterminated quote in `{0}`")]
    UnterminatedQuote(String),
    #[error("Annotation is not followed by a function declaration")]
    Dangling,
}

#[derive(thiserror::Error, Debug)]
pub enum LoadErrorKind {
    #[error("Function `{0}` not found")]
    NotFound(String),
    #[error("Function `{function}` is declared as {declared:?} but its factory is {actual:?}")]
    ConventionMismatch {
        function: String,
        declared: CallingConvention,
        actual: CallingConvention,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum DiscoveryErrorKind {
    #[error("Failed to scan root: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Invalid declaration pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("Invalid annotation at {path}:{line}: {source}")]
    Annotation {
        path: PathBuf,
        line: usize,
        source: AnnotationErrorKind,
    },
    #[error("Failed to load provider `{name}`: {source}")]
    Load { name: String, source: LoadErrorKind },
}
