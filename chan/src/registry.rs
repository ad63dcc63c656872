//! Process-wide directory of named queues.
//!
//! A [`Registry`] maps names to live queues so unrelated threads can meet on
//! a queue without passing handles around. Names hash into a fixed number of
//! buckets (no rehashing); each bucket is a doubly-linked list.
//!
//! # Ownership
//!
//! Every [`Chan`] returned by [`create`](Registry::create) or
//! [`lookup`](Registry::lookup) owns one reference. When the last reference
//! is released the queue is unlinked from its bucket, so no new lookup can
//! find it, and then destroyed together with any messages still queued.
//!
//! # Lock order
//!
//! The registry lock is always taken before a queue lock, never the reverse:
//! - `lookup` holds the registry lock while it bumps the refcount, so a queue
//!   cannot be destroyed between being found and being acquired.
//! - `release` drops non-final references under the queue lock alone. The
//!   final one is dropped with the registry lock held, then the queue lock.
//!
//! # Example
//!
//! ```
//! use chan::{Capacity, Registry, RegistryConfig, Timeout};
//!
//! let registry = Registry::new(RegistryConfig::default());
//! let jobs = registry.create("jobs", Capacity::Unbounded)?;
//!
//! let worker = registry.lookup("jobs").expect("queue is registered");
//! jobs.send(42.0, Timeout::ZERO).unwrap();
//! assert_eq!(worker.recv(Timeout::ZERO).and_then(|m| m.as_number()), Some(42.0));
//!
//! drop(jobs);
//! drop(worker);
//! assert!(registry.lookup("jobs").is_none());
//! # Ok::<(), chan::ChanError>(())
//! ```

pub mod config;
mod name;
mod slab;
mod table;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use thiserror::Error;

pub use config::{Buckets, ConfigError, DEFAULT_BUCKETS, MAX_BUCKETS, RegistryConfig};
pub use name::{NAME_MAX, QueueName};
pub(crate) use table::Membership;

use crate::handle::Chan;
use crate::sync::queue::{BlockingQueue, Capacity};
use crate::trace::{debug, info, trace, warn};
use table::Table;

/// Errors from [`Registry::create`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChanError {
    /// A live queue already has this name. The new queue was discarded.
    #[error("channel \"{name}\" already exists")]
    DuplicateName { name: QueueName },

    #[error("invalid channel name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
}

/// Errors from setting up the process-wide registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("global registry is already initialized")]
    AlreadyInitialized,
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// Bucket for `name`: byte sum truncated to 8 bits, then masked.
fn bucket_of(name: &str, buckets: Buckets) -> usize {
    usize::from(name.bytes().fold(0u8, u8::wrapping_add)) & buckets.mask()
}

struct Inner {
    config: RegistryConfig,
    table: Mutex<Table>,
}

/// Name → queue directory.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    /// Creates an empty, independent registry.
    ///
    /// Most programs use the shared [`Registry::global`] instead.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                table: Mutex::new(Table::new(config.buckets.get())),
            }),
        }
    }

    /// The process-wide registry, created with the default configuration if
    /// [`init_global`](Self::init_global) was not called first.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(|| {
            info!("global registry initialized with default config");
            Self::new(RegistryConfig::default())
        })
    }

    /// Creates the process-wide registry with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyInitialized`] if the global registry
    /// already exists, either from an earlier call or from
    /// [`global`](Self::global). The existing registry is left untouched.
    pub fn init_global(config: RegistryConfig) -> Result<&'static Self, RegistryError> {
        let mut fresh = false;
        let registry = GLOBAL.get_or_init(|| {
            fresh = true;
            Self::new(config)
        });
        if fresh {
            info!(buckets = config.buckets.get(), max_credit = ?config.max_credit, "global registry initialized");
            Ok(registry)
        } else {
            Err(RegistryError::AlreadyInitialized)
        }
    }

    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Creates and registers a queue, returning the creator's handle.
    ///
    /// # Errors
    ///
    /// - [`ChanError::InvalidName`] if `name` is not a valid [`QueueName`].
    /// - [`ChanError::DuplicateName`] if a live queue already has this name.
    ///   The existing queue is unaffected.
    pub fn create(&self, name: &str, capacity: Capacity) -> Result<Chan, ChanError> {
        let name = QueueName::new(name)?;
        let bucket = bucket_of(&name, self.inner.config.buckets);
        let queue = Arc::new(BlockingQueue::with_credit_cap(
            name,
            capacity,
            self.inner.config.max_credit,
        ));

        let mut table = self.lock_table();
        if table.find(bucket, queue.name()).is_some() {
            drop(table);
            warn!(name = %queue.name(), "duplicate channel name rejected");
            return Err(ChanError::DuplicateName {
                name: queue.name().clone(),
            });
        }
        let membership = table.insert(bucket, Arc::clone(&queue));
        queue.lock_state().set_membership(membership);
        drop(table);

        debug!(name = %queue.name(), bucket, "channel registered");
        Ok(Chan::from_parts(queue, self.clone()))
    }

    /// Finds a live queue by exact name and acquires a reference to it.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Chan> {
        let bucket = bucket_of(name, self.inner.config.buckets);
        let table = self.lock_table();
        let queue = table.find(bucket, name)?;
        queue.acquire();
        let queue = Arc::clone(queue);
        drop(table);
        Some(Chan::from_parts(queue, self.clone()))
    }

    /// Returns `true` if a live queue is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        let bucket = bucket_of(name, self.inner.config.buckets);
        self.lock_table().find(bucket, name).is_some()
    }

    /// Number of registered queues.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_table().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops one reference to `queue`, returning how many remain.
    ///
    /// At zero the queue is detached and its leftover messages are dropped
    /// after both locks are released.
    ///
    /// # Panics
    ///
    /// Panics on refcount underflow or if the queue is not registered here.
    pub(crate) fn release(&self, queue: &Arc<BlockingQueue>) -> usize {
        if let Some(refs) = queue.release_shared() {
            return refs;
        }

        let mut table = self.lock_table();
        let mut state = queue.lock_state();
        let refs = state.release();
        if refs > 0 {
            // A lookup got in between the two checks.
            trace!(name = %queue.name(), refs, "release");
            return refs;
        }
        let membership = state.take_membership();
        let leftover = state.drain();
        drop(state);
        let detached = table.detach(membership);
        drop(table);

        debug!(
            name = %queue.name(),
            bucket = membership.bucket,
            discarded = leftover.len(),
            "channel detached and destroyed"
        );
        drop(leftover);
        drop(detached);
        0
    }

    fn lock_table(&self) -> MutexGuard<'_, Table> {
        self.inner
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.inner.config)
            .field("len", &self.len())
            .finish()
    }
}
