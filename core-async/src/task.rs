//! Task spawning.
//!
//! Spawned futures must be `Send + 'static`; the orchestrator and the
//! metadata dispatcher both hand work to the runtime through [`spawn`].

pub use tokio::task::{spawn_blocking, yield_now, JoinError, JoinHandle};

/// Spawns `future` onto the current runtime.
///
/// ```rust
/// # async fn example() {
/// let handle = core_async::task::spawn(async { 42 });
/// assert_eq!(handle.await.ok(), Some(42));
/// # }
/// ```
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Result of awaiting a [`JoinHandle`].
pub type Result<T> = std::result::Result<T, JoinError>;
