use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use crate::errors::AnnotationErrorKind;

/// Lifetime of the instances produced by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Built once, cached and shared by every requester
    #[default]
    Singleton,
    /// Built fresh for every request and never cached
    Prototype,
}

impl Scope {
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Scope::Singleton => "singleton",
            Scope::Prototype => "prototype",
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_cached(&self) -> bool {
        matches!(self, Scope::Singleton)
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scope {
    type Err = AnnotationErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "singleton" => Ok(Scope::Singleton),
            "prototype" => Ok(Scope::Prototype),
            _ => Err(AnnotationErrorKind::InvalidScope(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Scope;

    #[test]
    fn test_scope_from_str() {
        assert_eq!("singleton".parse::<Scope>().unwrap(), Scope::Singleton);
        assert_eq!(" Prototype ".parse::<Scope>().unwrap(), Scope::Prototype);
        assert!("request".parse::<Scope>().is_err());
        assert_eq!(Scope::default(), Scope::Singleton);
    }
}
