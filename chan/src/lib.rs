//! Named, process-wide blocking channels.
//!
//! A channel is a FIFO of [`Message`]s that any thread in the process can find
//! by name through a [`Registry`]. Channels can be unbounded, bounded, or
//! rendezvous (capacity 0, where a send completes only while a receiver is
//! waiting). Every `send` and `recv` takes a [`Timeout`].
//!
//! ```
//! use std::thread;
//!
//! use chan::{Capacity, Registry, Timeout};
//!
//! let registry = Registry::global();
//! let chan = registry.create("lib-doc-handoff", Capacity::RENDEZVOUS)?;
//!
//! let worker = thread::spawn(|| {
//!     let chan = Registry::global().lookup("lib-doc-handoff").unwrap();
//!     chan.recv(Timeout::Infinite)
//! });
//!
//! chan.send("ping", Timeout::Infinite).unwrap();
//! assert_eq!(worker.join().unwrap().unwrap().as_str(), Some("ping"));
//! # Ok::<(), chan::ChanError>(())
//! ```

pub mod handle;
pub mod message;
pub mod registry;
pub mod sync;

mod trace;

pub use handle::Chan;
pub use message::{Message, MessageKind};
pub use registry::{
    Buckets, ChanError, ConfigError, QueueName, Registry, RegistryConfig, RegistryError,
};
pub use sync::queue::{BlockingQueue, Capacity};
pub use sync::timeout::Timeout;
pub use trace::init_tracing;
