//! Common types shared by the unifs crates.
//!
//! This crate holds the pieces every backend agrees on: the error taxonomy,
//! the URL classification rules, the logging sink and credential handling.

pub mod error;
pub mod log;
pub mod secret;
pub mod types;

pub use error::{Error, Result};
pub use log::{LogCallback, Logger};
pub use secret::Secret;
pub use types::{classify, is_directory, is_file, Backend, Kind, StorageUrl};
