use tracing::warn;

/// Receives notices the container doesn't treat as errors
pub trait Diagnostics: Send + Sync {
    /// Called when `name` is requested but no provider is registered for it.
    /// `required_by` is the provider that declared the dependency, `None` for a direct lookup.
    fn missing_provider(&self, name: &str, required_by: Option<&str>);
}

/// Reports diagnostics as `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn missing_provider(&self, name: &str, required_by: Option<&str>) {
        match required_by {
            Some(required_by) => warn!(name, required_by, "No provider registered, injecting nothing"),
            None => warn!(name, "No provider registered"),
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::{Diagnostics as _, TracingDiagnostics};

    #[test]
    #[traced_test]
    fn test_tracing_diagnostics() {
        TracingDiagnostics.missing_provider("logger", Some("service"));

        assert!(logs_contain("No provider registered"));
        assert!(logs_contain("logger"));
    }
}
