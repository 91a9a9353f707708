//! API client module
//!
//! Gateway to the server-side import endpoint: the [`ImportApi`] trait the
//! upload and import state machines are written against, and its HTTP
//! implementation.

pub mod client;
pub mod endpoints;
pub mod gateway;
pub mod types;

pub use client::ApiClient;
pub use endpoints::Route;
pub use gateway::ImportApi;
pub use types::*;
