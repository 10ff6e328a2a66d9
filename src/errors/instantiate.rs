/// Failure raised by a factory while producing an instance.
#[derive(thiserror::Error, Debug)]
pub enum InstantiateErrorKind {
    #[error("Dependency `{name}` at position {position} has no provider")]
    MissingDependency { name: String, position: usize },
    #[error("Dependency at position {position} has an incorrect type, expected: {expected}")]
    IncorrectType { position: usize, expected: &'static str },
    #[error("Callback must be completed with exactly one of error or value (error: {error}, value: {value})")]
    CallbackArguments { error: bool, value: bool },
    #[error("Callback was dropped without being completed")]
    CallbackDropped,
    #[error(transparent)]
    Custom(#[from] anyhow::Error),
}
