//! Registry configuration.

use std::num::NonZeroUsize;

use serde::Deserialize;
use thiserror::Error;

/// Largest useful bucket count: names hash to 8 bits.
pub const MAX_BUCKETS: usize = 256;

/// Bucket count used when none is configured.
pub const DEFAULT_BUCKETS: usize = 16;

/// Invalid configuration values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Bucket count is zero, not a power of two, or above [`MAX_BUCKETS`].
    #[error("bucket count must be a power of two in 1..=256, got {buckets}")]
    InvalidBuckets { buckets: usize },
}

/// Witness type for a valid bucket count (power of two, at most [`MAX_BUCKETS`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "usize")]
pub struct Buckets(usize);

impl Buckets {
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBuckets`] unless `buckets` is a power of
    /// two no larger than [`MAX_BUCKETS`].
    pub const fn new(buckets: usize) -> Result<Self, ConfigError> {
        if buckets.is_power_of_two() && buckets <= MAX_BUCKETS {
            Ok(Self(buckets))
        } else {
            Err(ConfigError::InvalidBuckets { buckets })
        }
    }

    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    /// Mask applied to a name hash to select a bucket.
    pub(crate) const fn mask(self) -> usize {
        self.0 - 1
    }
}

impl Default for Buckets {
    fn default() -> Self {
        Self(DEFAULT_BUCKETS)
    }
}

impl TryFrom<usize> for Buckets {
    type Error = ConfigError;

    fn try_from(buckets: usize) -> Result<Self, Self::Error> {
        Self::new(buckets)
    }
}

/// Configuration for a [`Registry`](super::Registry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Number of hash buckets. Fixed for the registry's lifetime.
    pub buckets: Buckets,
    /// Upper bound on receive credits outstanding at once on a single queue.
    ///
    /// Every in-flight `recv` on a bounded or rendezvous queue lends one unit
    /// of capacity to senders, so a queue may briefly hold more than its
    /// nominal limit. `None` lends one credit per receiver without bound; a
    /// cap stops lending once that many credits are outstanding. Any cap keeps
    /// rendezvous working, since the first waiting receiver always gets credit.
    pub max_credit: Option<NonZeroUsize>,
}
