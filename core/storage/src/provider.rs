//! Capability contract shared by every backend.
//!
//! A file or directory handle is bound to one parsed URL. Identity accessors
//! are pure; everything else talks to the backend. All calls block.

use std::io::{Cursor, Write};

use tracing::warn;
use unifs_common::{is_directory, Backend, Error, Logger, Result, StorageUrl};

/// In-memory content of an open file.
pub type FileBuffer = Cursor<Vec<u8>>;

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    /// Download the current content and rewind to offset 0.
    Read,
    /// Start from an empty buffer.
    Write,
}

/// Identity of a handle, derived from its URL without I/O.
pub trait Entry {
    fn url(&self) -> &StorageUrl;

    /// The URL as given.
    fn full_name(&self) -> &str {
        self.url().as_str()
    }

    fn name(&self) -> Option<String> {
        self.url().name()
    }

    fn parent(&self) -> Option<String> {
        self.url().parent()
    }

    fn root(&self) -> Option<String> {
        self.url().root()
    }

    fn backend(&self) -> Backend {
        self.url().backend()
    }

    fn separator(&self) -> char {
        self.url().separator()
    }
}

/// Operations on a single file object.
pub trait StorageFile: Entry {
    /// Whether the object exists.
    fn exists(&self) -> Result<bool>;

    /// Create the object as an empty file and leave the handle open.
    ///
    /// # Errors
    /// - `AlreadyExists` if the object is present and `overwrite` is false
    fn create(&mut self, overwrite: bool, log: &Logger<'_>) -> Result<&mut Self>;

    /// Allocate the in-memory buffer.
    ///
    /// A missing object yields an empty buffer.
    fn open(&mut self, access: AccessType, log: &Logger<'_>) -> Result<&mut FileBuffer>;

    /// Commit the buffer to the backend, replacing prior content.
    fn flush(&mut self, log: &Logger<'_>) -> Result<()>;

    /// Flush, then release the buffer. Closing a closed handle only logs.
    fn close(&mut self, log: &Logger<'_>) -> Result<()>;

    /// Delete the object if it exists.
    ///
    /// Failures are logged. They are returned as errors when `stop_on_error`
    /// is set and folded into `Ok(false)` otherwise.
    fn delete(&mut self, stop_on_error: bool, log: &Logger<'_>) -> Result<bool>;

    fn is_open(&self) -> bool;

    /// Release the buffer without flushing it.
    fn take_buffer(&mut self) -> Option<FileBuffer>;

    /// Download the whole object.
    fn read_all_bytes(&mut self) -> Result<Vec<u8>> {
        self.open(AccessType::Read, &Logger::quiet())?;
        Ok(self
            .take_buffer()
            .map(Cursor::into_inner)
            .unwrap_or_default())
    }

    fn read_all_text(&mut self) -> Result<String> {
        let bytes = self.read_all_bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Replace the whole object with `data`.
    fn write_all_bytes(&mut self, data: &[u8], log: &Logger<'_>) -> Result<()> {
        self.open(AccessType::Write, log)?.write_all(data)?;
        self.close(log)
    }

    fn write_all_text(&mut self, text: &str, log: &Logger<'_>) -> Result<()> {
        self.write_all_bytes(text.as_bytes(), log)
    }
}

/// Operations on a directory.
pub trait StorageDirectory: Entry + Sized {
    type File: StorageFile;

    /// Whether the directory exists.
    fn exists(&self) -> Result<bool>;

    /// Create the directory.
    ///
    /// # Errors
    /// - `AlreadyExists` if present and `fail_if_exists` is set
    fn create(&mut self, fail_if_exists: bool, log: &Logger<'_>) -> Result<&mut Self>;

    /// Delete the directory, and with `recurse` everything under it.
    ///
    /// # Errors
    /// - `NotEmpty` when `recurse` is false and the directory holds anything
    ///   besides its own marker
    fn delete(&mut self, recurse: bool, stop_on_error: bool, log: &Logger<'_>) -> Result<bool>;

    /// Immediate child files, computed now.
    fn get_files(&self) -> Result<Vec<Self::File>>;

    /// Immediate child directories, computed now.
    fn get_directories(&self) -> Result<Vec<Self>>;

    /// Join path segments the way this backend does.
    fn path_combine(&self, paths: &[&str]) -> String;

    /// Handle for the file at `url`, sharing this directory's client.
    fn file_at(&self, url: &str) -> Self::File;

    /// Handle for the directory at `url`, sharing this directory's client.
    fn directory_at(&self, url: &str) -> Self;

    /// Handle for a child file. No I/O.
    fn file(&self, name: &str) -> Self::File {
        self.file_at(&self.path_combine(&[self.full_name(), name]))
    }

    /// Handle for a child directory. No I/O.
    fn directory(&self, name: &str) -> Self {
        let mut url = self.path_combine(&[self.full_name(), name]);
        if !is_directory(&url) {
            url.push(self.separator());
        }
        self.directory_at(&url)
    }
}

/// Apply the `stop_on_error` policy to the outcome of a delete.
pub(crate) fn settle_delete(
    outcome: Result<bool>,
    stop_on_error: bool,
    log: &Logger<'_>,
) -> Result<bool> {
    match outcome {
        Ok(success) => Ok(success),
        Err(e) => {
            log.error(&e.to_string());
            if stop_on_error {
                Err(e)
            } else {
                warn!("delete failure absorbed: {}", e);
                Ok(false)
            }
        }
    }
}

/// Log a failed create before handing the error back.
pub(crate) fn report<T>(outcome: Result<T>, log: &Logger<'_>) -> Result<T> {
    if let Err(e) = &outcome {
        log.error(&format!("ERROR - {}", e));
    }
    outcome
}

/// Join URL segments with `/`.
///
/// Every segment but the last gets a trailing `/` if it lacks one, and a
/// leading `/` is dropped when the text so far already ends in one.
pub fn combine_url(paths: &[&str]) -> String {
    let mut out = String::new();
    let last = paths.len().saturating_sub(1);
    for (i, path) in paths.iter().enumerate() {
        let mut path = path.trim();
        if out.ends_with('/') {
            path = path.trim_start_matches('/');
        }
        out.push_str(path);
        if i != last && !out.is_empty() && !out.ends_with('/') {
            out.push('/');
        }
    }
    out
}

/// Error for a URL whose container or key could not be parsed.
pub(crate) fn malformed(url: &StorageUrl) -> Error {
    Error::UnknownUrlType(url.as_str().to_string())
}
