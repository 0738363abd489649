//! One file and directory API over local disks, UNC shares, AWS S3,
//! Azure Blob containers and Azure File Shares.
//!
//! The backend is chosen from the shape of the URL. Every backend satisfies
//! the same contract ([`StorageFile`], [`StorageDirectory`]), so callers
//! resolve a handle through the [`factory`] and never touch backend types.
//!
//! # Design Principles
//! - Kind by syntax: a URL ending in a separator is a directory, nothing else is
//! - Blocking I/O: every call returns once the backend has answered
//! - Deferred failure: handles are built without a client and fail on first use
//! - One recoverable switch: `stop_on_error` on delete, nothing else

pub mod aws;
pub mod azure;
pub mod blob;
pub mod factory;
pub mod local;
pub mod memory;
pub mod provider;
pub mod registry;
pub mod share;

pub use aws::{AwsClient, AwsConfig};
pub use azure::{AzureClient, AzureConfig};
pub use blob::{BlobDirectory, BlobFile, BlobStore};
pub use factory::{
    copy_file, create_directory, create_file, delete, exists, move_file, path_combine,
    resolve_directory, resolve_file, AnyDirectory, AnyFile,
};
pub use local::{combine_local, LocalDirectory, LocalFile};
pub use memory::{MemoryBlobStore, MemoryShareStore};
pub use provider::{combine_url, AccessType, Entry, FileBuffer, StorageDirectory, StorageFile};
pub use registry::{Clients, ClientsConfig};
pub use share::{ShareDirectory, ShareEntry, ShareFile, ShareStore, CHUNK_SIZE};
