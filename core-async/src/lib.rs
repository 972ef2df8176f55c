//! Async runtime facade for the capture sync crates.
//!
//! Every `core-*` and `provider-*` crate goes through this crate instead of
//! naming Tokio directly, so the executor can be swapped in one place.
//!
//! # Modules
//!
//! - `task`: spawning and join handles
//! - `time`: sleep, timeouts and durations
//! - `sync`: locks, channels and atomics-adjacent primitives
//! - `runtime`: blocking entry points used by the attribute macros
//!
//! ```rust
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() -> u32 {
//!     let handle = core_async::spawn(async {
//!         sleep(Duration::from_millis(5)).await;
//!         42
//!     });
//!     handle.await.unwrap_or_default()
//! }
//! ```

pub use core_async_macros::{main, test};

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
