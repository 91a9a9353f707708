//! pgimport common library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the pgimport workspace.
//!
//! # Overview
//!
//! - **Error Handling**: Common error and result types
//! - **Checksums**: FNV-1a chunk digests carried with every uploaded chunk
//! - **Types**: Job status, archive entries, import options and file kinds
//! - **Logging**: `tracing` subscriber setup shared by every binary
//!
//! # Example
//!
//! ```
//! use pgimport_common::checksum::chunk_checksum;
//!
//! let digest = chunk_checksum(b"COPY public.users FROM stdin;");
//! assert_eq!(digest.len(), 16);
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
