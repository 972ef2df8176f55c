//! # Object Storage Provider
//!
//! HTTP bindings for the two remote collaborators of the sync core.
//!
//! ## Overview
//!
//! This module provides:
//! - [`ResumableUploader`]: resumable upload sessions with fixed-size
//!   `Content-Range` chunks, where `308 Resume Incomplete` means "send the next chunk"
//! - [`RestSessionMetadataRepository`]: `PATCH`es the three sync fields of a
//!   session record
//!
//! Both talk through an injected [`HttpClient`](bridge_traits::http::HttpClient),
//! so tests drive them with a mocked client and hosts pick the transport.

pub mod error;
pub mod metadata;
pub mod uploader;

pub use error::{ObjectStorageError, Result};
pub use metadata::RestSessionMetadataRepository;
pub use uploader::{progress_percent, ResumableUploader};
