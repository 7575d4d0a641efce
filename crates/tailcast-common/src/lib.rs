//! tailcast-common: shared error type, configuration and formatting helpers.
//!
//! - **Error Handling**: [`Error`] and the [`Result`] alias used across tailcast
//! - **Configuration**: the TOML-backed [`config::Config`] tree and its validation
//! - **Formatting**: human-readable byte counts, speeds and ages for log lines
//!
//! # Examples
//!
//! ```
//! use tailcast_common::format::format_bytes;
//! use tailcast_common::{Error, Result};
//!
//! assert_eq!(format_bytes(2048), "2 KiB");
//!
//! fn lookup() -> Result<()> {
//!     Err(Error::not_found("active file", "recordings"))
//! }
//! assert!(lookup().is_err());
//! ```

pub mod config;
pub mod error;
pub mod format;

pub use error::{Error, Result};
