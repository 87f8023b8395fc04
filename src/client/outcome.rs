//! Results of resilient read operations.

use std::time::Duration;

/// Why a read was answered without a live backend response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedCause {
    /// The breaker short-circuited the call.
    CircuitOpen,
    /// Real attempts failed and the retry budget ran out.
    RetriesExhausted,
}

/// Where a returned value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Straight from the backend.
    Live,
    /// Last good response from the cache.
    Cache {
        fresh: bool,
        age: Duration,
        cause: DegradedCause,
    },
    /// Safe default; nothing cached.
    Default { cause: DegradedCause },
}

/// A value plus the signal telling the caller whether it is degraded.
#[derive(Debug, Clone, PartialEq)]
pub struct Resilient<T> {
    pub data: T,
    pub origin: Origin,
}

impl<T> Resilient<T> {
    pub fn live(data: T) -> Self {
        Self {
            data,
            origin: Origin::Live,
        }
    }

    /// True for anything not served live.
    pub fn is_degraded(&self) -> bool {
        !matches!(self.origin, Origin::Live)
    }

    /// True when served from a cache entry past its freshness window.
    pub fn is_stale(&self) -> bool {
        matches!(self.origin, Origin::Cache { fresh: false, .. })
    }

    pub fn cause(&self) -> Option<DegradedCause> {
        match self.origin {
            Origin::Live => None,
            Origin::Cache { cause, .. } | Origin::Default { cause } => Some(cause),
        }
    }

    pub fn into_inner(self) -> T {
        self.data
    }
}
