//! Blocking entry points over the Tokio runtime.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs `future` to completion on a fresh current-thread runtime.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("core_async::runtime::block_on: failed to build Tokio runtime")
        .block_on(future)
}

/// Runs `future` to completion on a multi-thread runtime with `workers` threads.
///
/// Used by `#[core_async::test(multi_thread)]` for tests that need spawned
/// tasks to make progress while the test body is blocked on a lock.
pub fn block_on_multi_thread<F>(workers: usize, future: F) -> F::Output
where
    F: std::future::Future,
{
    Builder::new_multi_thread()
        .worker_threads(workers.max(1))
        .enable_all()
        .build()
        .expect("core_async::runtime::block_on_multi_thread: failed to build Tokio runtime")
        .block_on(future)
}
