//! Synchronization primitives.
//!
//! Async-aware locks and channels come from Tokio. `CancellationToken` is
//! re-exported for hosts that need to stop a background drain cooperatively.

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard, Semaphore, SemaphorePermit,
};

pub use tokio_util::sync::CancellationToken;
