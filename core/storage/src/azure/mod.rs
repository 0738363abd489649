//! Azure Storage backends for Blob containers and File Shares.
//!
//! One [`AzureClient`] per storage account serves both services:
//! - Blob containers go through the shared blob handles, with directories
//!   emulated by a `key + "_"` placeholder object
//! - File Shares use native directories and chunked ranged uploads
//!
//! The account key or SAS token comes from the connection string.

pub mod client;
pub mod connection;

pub use client::{AzureClient, AzureConfig, API_VERSION};
pub use connection::{ConnectionString, Service};
