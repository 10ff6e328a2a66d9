use std::{num::NonZeroUsize, thread};

/// Config for a container
/// ## Fields
/// - `concurrency`:
///   Maximum number of providers the eager bootstrap pass builds at the same time.
///
///   Dependencies requested while building a provider are not counted against this limit.
///   A value of `0` is treated as `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub concurrency: usize,
}

impl Config {
    #[inline]
    #[must_use]
    pub const fn with_concurrency(concurrency: usize) -> Self {
        Self { concurrency }
    }

    #[inline]
    #[must_use]
    pub(crate) const fn effective_concurrency(&self) -> usize {
        if self.concurrency == 0 {
            1
        } else {
            self.concurrency
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: thread::available_parallelism().map_or(1, NonZeroUsize::get),
        }
    }
}
