//! Time utilities.
//!
//! Wall-clock time for persisted timestamps comes from the `Clock` bridge
//! trait, not from here; this module only covers runtime timers.

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
pub use tokio::time::{interval, sleep, sleep_until, timeout, Interval, Sleep, Timeout};

/// Error returned when a [`timeout`] elapses.
pub use tokio::time::error::Elapsed;
