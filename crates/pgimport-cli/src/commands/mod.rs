//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function. Commands receive
//! the effective [`Config`](crate::config::Config) and the process-wide
//! [`Session`](crate::session::Session) so a Ctrl-C handler can cancel them.

pub mod config;
pub mod control;
pub mod entries;
pub mod jobs;
pub mod start;
pub mod status;
pub mod upload;
