//! tailcast - stream the newest recording over HTTP while it is being written.
//!
//! This library crate exposes the core functionality for integration testing.

pub mod clients;
pub mod config;
pub mod log_buffer;
pub mod monitor;
pub mod range;
pub mod server;
pub mod streaming;
