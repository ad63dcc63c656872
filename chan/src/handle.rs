//! Reference-counted handle to a registered queue.

use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr;
use std::sync::Arc;

use crate::registry::Registry;
use crate::sync::queue::BlockingQueue;

/// One reference to a registered [`BlockingQueue`].
///
/// Obtained from [`Registry::create`] or [`Registry::lookup`]. Dereferences
/// to the queue, so `send`, `recv` and friends are called directly on the
/// handle. Cloning acquires another reference; dropping or
/// [`release`](Self::release)-ing gives it back. When the last reference goes
/// the queue leaves the registry and is destroyed.
///
/// Handles are `Send + Sync` and may be moved to or shared with other threads.
///
/// A released handle cannot be used again:
///
/// ```compile_fail
/// use chan::{Capacity, Registry, RegistryConfig};
///
/// let registry = Registry::new(RegistryConfig::default());
/// let chan = registry.create("once", Capacity::Unbounded).unwrap();
/// chan.release();
/// chan.try_send(1.0).unwrap(); // use of moved value
/// ```
pub struct Chan {
    queue: Arc<BlockingQueue>,
    registry: Registry,
}

impl Chan {
    /// Wraps a reference the caller has already counted.
    pub(crate) fn from_parts(queue: Arc<BlockingQueue>, registry: Registry) -> Self {
        Self { queue, registry }
    }

    /// Gives back this reference, returning how many remain.
    ///
    /// `0` means this was the last one and the queue has been destroyed.
    /// Dropping the handle does the same without reporting the count.
    ///
    /// # Panics
    ///
    /// Panics if the queue's refcount would underflow, which indicates a bug
    /// in reference accounting.
    pub fn release(self) -> usize {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never used again and its destructor never runs,
        // so each field is moved out exactly once.
        let (queue, registry) = unsafe { (ptr::read(&this.queue), ptr::read(&this.registry)) };
        registry.release(&queue)
    }

    /// The registry this queue is registered in.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Deref for Chan {
    type Target = BlockingQueue;

    fn deref(&self) -> &BlockingQueue {
        &self.queue
    }
}

impl Clone for Chan {
    fn clone(&self) -> Self {
        self.queue.acquire();
        Self {
            queue: Arc::clone(&self.queue),
            registry: self.registry.clone(),
        }
    }
}

impl Drop for Chan {
    fn drop(&mut self) {
        self.registry.release(&self.queue);
    }
}

impl fmt::Debug for Chan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chan")
            .field("name", self.queue.name())
            .field("capacity", &self.queue.capacity())
            .field("refs", &self.queue.refs())
            .finish()
    }
}
