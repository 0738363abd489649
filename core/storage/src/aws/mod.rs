//! AWS S3 backend.
//!
//! S3 has no directories, so files and directories go through the shared
//! blob handles in [`crate::blob`] with the same placeholder convention the
//! Azure Blob backend uses.

pub mod client;

pub use client::{AwsClient, AwsConfig, DEFAULT_REGION};
