//! Workspace umbrella crate.
//!
//! Exposes the `desktop-shims` feature so a host application can depend on
//! `capture-sync-workspace` alone and get [`core_service`] with the desktop
//! HTTP client and network monitor wired in.

#[cfg(feature = "desktop-shims")]
pub use core_service;
