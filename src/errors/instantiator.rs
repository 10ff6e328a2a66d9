use std::fmt::{self, Display, Formatter};

#[derive(thiserror::Error, Debug, Clone)]
pub enum InstantiatorErrorKind<DepsErr, FactoryErr> {
    #[error(transparent)]
    Deps(DepsErr),
    #[error(transparent)]
    Factory(FactoryErr),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DFSErrorKind {
    CyclicDependency { graph: (String, Box<[String]>) },
}

impl DFSErrorKind {
    /// Name of the provider the detected cycle starts from
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            DFSErrorKind::CyclicDependency { graph: (name, _) } => name,
        }
    }
}

impl Display for DFSErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DFSErrorKind::CyclicDependency { graph: (name, chain) } => {
                write!(f, "Cyclic dependency detected: {name}")?;
                for name in chain {
                    write!(f, " -> {name}")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::DFSErrorKind;

    #[test]
    fn test_cyclic_dependency_display() {
        let err = DFSErrorKind::CyclicDependency {
            graph: ("a".to_owned(), vec!["b".to_owned(), "a".to_owned()].into_boxed_slice()),
        };

        assert_eq!(err.name(), "a");
        assert_eq!(err.to_string(), "Cyclic dependency detected: a -> b -> a");
    }
}
