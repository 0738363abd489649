//! Hierarchical cloud file shares (Azure File Share).
//!
//! Directories are native. Files are written by recreating them at their
//! final length and uploading the content range by range.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use tracing::debug;
use unifs_common::{Error, Logger, Result, StorageUrl};

use crate::provider::{
    combine_url, malformed, report, settle_delete, AccessType, Entry, FileBuffer,
    StorageDirectory, StorageFile,
};

/// Largest range sent in one upload call.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// One item in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareEntry {
    pub name: String,
    pub is_directory: bool,
}

/// Native primitives of a file share.
///
/// `share` names the share; `path` is relative to its root, with `""` for
/// the root itself. Implementations accept paths with or without a trailing
/// slash.
pub trait ShareStore: Send + Sync {
    /// Size of the file at `path`, or `None` if no such file exists.
    fn file_length(&self, share: &str, path: &str) -> Result<Option<u64>>;

    fn file_exists(&self, share: &str, path: &str) -> Result<bool> {
        Ok(self.file_length(share, path)?.is_some())
    }

    fn read_file(&self, share: &str, path: &str) -> Result<Vec<u8>>;

    /// Create or replace a file of `length` zero bytes.
    fn create_file(&self, share: &str, path: &str, length: u64) -> Result<()>;

    /// Overwrite `data.len()` bytes at `offset` of an existing file.
    fn write_range(&self, share: &str, path: &str, offset: u64, data: &[u8]) -> Result<()>;

    /// Remove a file. Absent files are not an error.
    fn delete_file(&self, share: &str, path: &str) -> Result<()>;

    fn dir_exists(&self, share: &str, path: &str) -> Result<bool>;

    fn create_dir(&self, share: &str, path: &str) -> Result<()>;

    /// Remove an empty directory.
    ///
    /// # Errors
    /// - `NotEmpty` if the directory still has children
    fn delete_dir(&self, share: &str, path: &str) -> Result<()>;

    /// Immediate children of a directory.
    fn list_dir(&self, share: &str, path: &str) -> Result<Vec<ShareEntry>>;
}

fn missing_client() -> Error {
    Error::ClientNotConfigured("Azure".to_string())
}

/// A file on a share.
pub struct ShareFile {
    url: StorageUrl,
    client: Option<Arc<dyn ShareStore>>,
    buffer: Option<FileBuffer>,
}

impl ShareFile {
    pub fn new(client: Option<Arc<dyn ShareStore>>, url: impl Into<String>) -> Self {
        Self {
            url: StorageUrl::parse(url),
            client,
            buffer: None,
        }
    }

    fn target(&self) -> Result<(&dyn ShareStore, &str, &str)> {
        let client = self.client.as_deref().ok_or_else(missing_client)?;
        let share = self.url.container().ok_or_else(|| malformed(&self.url))?;
        let path = self
            .url
            .key()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| malformed(&self.url))?;
        Ok((client, share, path))
    }

    fn try_create(&mut self, overwrite: bool, log: &Logger<'_>) -> Result<()> {
        if self.exists()? && !overwrite {
            return Err(Error::AlreadyExists(format!(
                "File [{}]",
                self.full_name()
            )));
        }
        self.buffer = Some(Cursor::new(Vec::new()));
        self.flush(log)
    }

    fn try_delete(&mut self, log: &Logger<'_>) -> Result<bool> {
        let (client, share, path) = self.target()?;
        if client.file_exists(share, path)? {
            client.delete_file(share, path)?;
        }
        log.info(&format!("File [{}] was deleted.", self.full_name()));
        Ok(true)
    }
}

impl fmt::Debug for ShareFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareFile")
            .field("url", &self.url.as_str())
            .field("client", &self.client.is_some())
            .field("open", &self.buffer.is_some())
            .finish()
    }
}

impl Entry for ShareFile {
    fn url(&self) -> &StorageUrl {
        &self.url
    }
}

impl StorageFile for ShareFile {
    fn exists(&self) -> Result<bool> {
        let (client, share, path) = self.target()?;
        client.file_exists(share, path)
    }

    fn create(&mut self, overwrite: bool, log: &Logger<'_>) -> Result<&mut Self> {
        report(self.try_create(overwrite, log), log)?;
        log.info(&format!("File [{}] was created.", self.full_name()));
        Ok(self)
    }

    fn open(&mut self, access: AccessType, _log: &Logger<'_>) -> Result<&mut FileBuffer> {
        let (client, share, path) = self.target()?;
        let data = match access {
            AccessType::Read => match client.file_length(share, path)? {
                Some(len) if len > 0 => client.read_file(share, path)?,
                _ => Vec::new(),
            },
            AccessType::Write => Vec::new(),
        };
        debug!("opened {} for {:?} ({} bytes)", self.url, access, data.len());
        Ok(self.buffer.insert(Cursor::new(data)))
    }

    fn flush(&mut self, _log: &Logger<'_>) -> Result<()> {
        let Some(buffer) = &self.buffer else {
            debug!("flush on closed file {}", self.url);
            return Ok(());
        };
        let (client, share, path) = self.target()?;
        let data = buffer.get_ref();

        client.delete_file(share, path)?;
        client.create_file(share, path, data.len() as u64)?;
        for (i, chunk) in data.chunks(CHUNK_SIZE).enumerate() {
            client.write_range(share, path, (i * CHUNK_SIZE) as u64, chunk)?;
        }
        Ok(())
    }

    fn close(&mut self, log: &Logger<'_>) -> Result<()> {
        if self.buffer.is_some() {
            self.flush(log)?;
            self.buffer = None;
            log.info(&format!("Memory buffer [{}] has been closed.", self.full_name()));
        } else {
            log.info(&format!("Memory buffer [{}] is already closed.", self.full_name()));
        }
        Ok(())
    }

    fn delete(&mut self, stop_on_error: bool, log: &Logger<'_>) -> Result<bool> {
        let outcome = self.try_delete(log);
        settle_delete(outcome, stop_on_error, log)
    }

    fn is_open(&self) -> bool {
        self.buffer.is_some()
    }

    fn take_buffer(&mut self) -> Option<FileBuffer> {
        self.buffer.take()
    }
}

/// A native directory on a share.
pub struct ShareDirectory {
    url: StorageUrl,
    client: Option<Arc<dyn ShareStore>>,
}

impl ShareDirectory {
    pub fn new(client: Option<Arc<dyn ShareStore>>, url: impl Into<String>) -> Self {
        Self {
            url: StorageUrl::parse(url),
            client,
        }
    }

    fn target(&self) -> Result<(&dyn ShareStore, &str, &str)> {
        let client = self.client.as_deref().ok_or_else(missing_client)?;
        let share = self.url.container().ok_or_else(|| malformed(&self.url))?;
        let path = self.url.key().ok_or_else(|| malformed(&self.url))?;
        Ok((client, share, path.trim_end_matches('/')))
    }

    fn try_create(&mut self, fail_if_exists: bool) -> Result<()> {
        let (client, share, path) = self.target()?;
        let exists = client.dir_exists(share, path)?;
        if exists && fail_if_exists {
            return Err(Error::AlreadyExists(format!(
                "Directory [{}]",
                self.full_name()
            )));
        }
        if !exists {
            client.create_dir(share, path)?;
        }
        Ok(())
    }

    fn try_delete(&mut self, recurse: bool, stop_on_error: bool, log: &Logger<'_>) -> Result<bool> {
        let (client, share, path) = self.target()?;
        if !client.dir_exists(share, path)? {
            log.info(&format!("Directory [{}] was deleted.", self.full_name()));
            return Ok(true);
        }

        let mut success = true;
        // When stopping, child failures propagate unsettled and are logged
        // once by the outermost delete.
        if recurse {
            for mut dir in self.get_directories()? {
                success &= if stop_on_error {
                    dir.try_delete(true, true, log)?
                } else {
                    dir.delete(true, false, log)?
                };
            }
            for mut file in self.get_files()? {
                success &= if stop_on_error {
                    file.try_delete(log)?
                } else {
                    file.delete(false, log)?
                };
            }
        }

        client.delete_dir(share, path).map_err(|e| match e {
            Error::NotEmpty(_) => Error::NotEmpty(self.full_name().to_string()),
            other => other,
        })?;
        log.info(&format!("Directory [{}] was deleted.", self.full_name()));
        Ok(success)
    }

    fn listing(&self) -> Result<Vec<ShareEntry>> {
        let (client, share, path) = self.target()?;
        client.list_dir(share, path)
    }
}

impl fmt::Debug for ShareDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareDirectory")
            .field("url", &self.url.as_str())
            .field("client", &self.client.is_some())
            .finish()
    }
}

impl Entry for ShareDirectory {
    fn url(&self) -> &StorageUrl {
        &self.url
    }
}

impl StorageDirectory for ShareDirectory {
    type File = ShareFile;

    fn exists(&self) -> Result<bool> {
        let (client, share, path) = self.target()?;
        client.dir_exists(share, path)
    }

    fn create(&mut self, fail_if_exists: bool, log: &Logger<'_>) -> Result<&mut Self> {
        report(self.try_create(fail_if_exists), log)?;
        log.info(&format!("Directory [{}] was created.", self.full_name()));
        Ok(self)
    }

    fn delete(&mut self, recurse: bool, stop_on_error: bool, log: &Logger<'_>) -> Result<bool> {
        let outcome = self.try_delete(recurse, stop_on_error, log);
        settle_delete(outcome, stop_on_error, log)
    }

    fn get_files(&self) -> Result<Vec<ShareFile>> {
        Ok(self
            .listing()?
            .into_iter()
            .filter(|e| !e.is_directory)
            .map(|e| self.file_at(&combine_url(&[self.full_name(), &e.name])))
            .collect())
    }

    fn get_directories(&self) -> Result<Vec<ShareDirectory>> {
        Ok(self
            .listing()?
            .into_iter()
            .filter(|e| e.is_directory)
            .map(|e| {
                let name = format!("{}/", e.name);
                self.directory_at(&combine_url(&[self.full_name(), &name]))
            })
            .collect())
    }

    fn path_combine(&self, paths: &[&str]) -> String {
        combine_url(paths)
    }

    fn file_at(&self, url: &str) -> ShareFile {
        ShareFile::new(self.client.clone(), url)
    }

    fn directory_at(&self, url: &str) -> ShareDirectory {
        ShareDirectory::new(self.client.clone(), url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryShareStore, RangeWrite};
    use std::cell::RefCell;
    use std::io::Write;

    const SHARE: &str = "https://acct.file.core.windows.net/share/";

    fn store() -> (Arc<MemoryShareStore>, Option<Arc<dyn ShareStore>>) {
        let store = Arc::new(MemoryShareStore::new());
        let client: Arc<dyn ShareStore> = store.clone();
        (store, Some(client))
    }

    fn url(path: &str) -> String {
        format!("{}{}", SHARE, path)
    }

    #[test]
    fn test_round_trip() {
        let (store, client) = store();
        store.insert_dir("share", "docs");
        let log = Logger::quiet();

        let mut file = ShareFile::new(client.clone(), url("docs/a.txt"));
        file.create(true, &log).unwrap();
        file.open(AccessType::Write, &log)
            .unwrap()
            .write_all(b"share content")
            .unwrap();
        file.close(&log).unwrap();

        let mut reader = ShareFile::new(client, url("docs/a.txt"));
        assert_eq!(reader.read_all_text().unwrap(), "share content");
    }

    #[test]
    fn test_flush_uploads_in_chunks() {
        let (store, client) = store();
        let log = Logger::quiet();
        let data: Vec<u8> = (0..CHUNK_SIZE * 2 + 10).map(|i| (i % 251) as u8).collect();

        let mut file = ShareFile::new(client, url("big.bin"));
        file.write_all_bytes(&data, &log).unwrap();

        assert_eq!(
            store.range_writes(),
            vec![
                RangeWrite { path: "big.bin".into(), offset: 0, len: CHUNK_SIZE },
                RangeWrite {
                    path: "big.bin".into(),
                    offset: CHUNK_SIZE as u64,
                    len: CHUNK_SIZE
                },
                RangeWrite {
                    path: "big.bin".into(),
                    offset: (CHUNK_SIZE * 2) as u64,
                    len: 10
                },
            ]
        );
        assert_eq!(store.file("share", "big.bin"), Some(data));
    }

    #[test]
    fn test_empty_flush_sends_no_ranges() {
        let (store, client) = store();
        let mut file = ShareFile::new(client, url("empty.txt"));
        file.create(true, &Logger::quiet()).unwrap();

        assert_eq!(store.file("share", "empty.txt"), Some(Vec::new()));
        assert!(store.range_writes().is_empty());
    }

    #[test]
    fn test_rewrite_replaces_longer_content() {
        let (store, client) = store();
        store.insert_file("share", "f.txt", b"a much longer original");
        let mut file = ShareFile::new(client, url("f.txt"));
        file.write_all_text("short", &Logger::quiet()).unwrap();
        assert_eq!(store.file("share", "f.txt"), Some(b"short".to_vec()));
    }

    #[test]
    fn test_create_without_overwrite() {
        let (store, client) = store();
        store.insert_file("share", "f.txt", b"x");
        let mut file = ShareFile::new(client, url("f.txt"));
        assert!(matches!(
            file.create(false, &Logger::quiet()),
            Err(Error::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_missing_client() {
        let dir = ShareDirectory::new(None, url("d/"));
        assert!(matches!(dir.exists(), Err(Error::ClientNotConfigured(_))));
    }

    #[test]
    fn test_directory_create_and_exists() {
        let (store, client) = store();
        let mut dir = ShareDirectory::new(client.clone(), url("new/"));
        assert!(!dir.exists().unwrap());
        dir.create(false, &Logger::quiet()).unwrap();
        assert!(dir.exists().unwrap());
        assert!(matches!(
            dir.create(true, &Logger::quiet()),
            Err(Error::AlreadyExists(_))
        ));
        assert_eq!(store.paths("share"), vec!["new"]);

        assert!(ShareDirectory::new(client, SHARE.to_string()).exists().unwrap());
    }

    #[test]
    fn test_non_recursive_delete_of_populated_directory() {
        let (store, client) = store();
        store.insert_file("share", "d/f.txt", b"f");
        let mut dir = ShareDirectory::new(client, url("d/"));

        match dir.delete(false, true, &Logger::quiet()) {
            Err(Error::NotEmpty(name)) => assert_eq!(name, url("d/")),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(store.file("share", "d/f.txt").is_some());
    }

    #[test]
    fn test_recursive_delete() {
        let (store, client) = store();
        store.insert_file("share", "d/f.txt", b"f");
        store.insert_file("share", "d/sub/g.txt", b"g");
        store.insert_dir("share", "d/sub/empty");
        store.insert_file("share", "keep.txt", b"k");

        let mut dir = ShareDirectory::new(client, url("d/"));
        assert!(dir.delete(true, true, &Logger::quiet()).unwrap());
        assert!(!dir.exists().unwrap());
        assert_eq!(store.paths("share"), vec!["keep.txt"]);
    }

    #[test]
    fn test_recursive_delete_absorbs_child_failure() {
        let (store, client) = store();
        store.insert_file("share", "d/a.txt", b"a");
        store.insert_file("share", "d/b.txt", b"b");
        store.fail_deletes_of("d/a.txt");

        let mut dir = ShareDirectory::new(client, url("d/"));
        assert!(!dir.delete(true, false, &Logger::quiet()).unwrap());
        assert_eq!(store.paths("share"), vec!["d", "d/a.txt"]);
    }

    #[test]
    fn test_stopping_delete_logs_child_failure_once() {
        let (store, client) = store();
        store.insert_file("share", "d/sub/a.txt", b"a");
        store.insert_file("share", "d/b.txt", b"b");
        store.fail_deletes_of("d/sub/a.txt");

        let errors = RefCell::new(Vec::new());
        let sink = |msg: &str, _: Option<&str>| errors.borrow_mut().push(msg.to_string());
        let log = Logger::quiet().with_callback(&sink);

        let mut dir = ShareDirectory::new(client, url("d/"));
        assert!(dir.delete(true, true, &log).is_err());
        assert_eq!(errors.borrow().len(), 1);
        assert!(store.paths("share").contains(&"d/sub/a.txt".to_string()));
    }

    #[test]
    fn test_delete_missing_directory() {
        let (store, client) = store();
        let mut dir = ShareDirectory::new(client, url("gone/"));
        assert!(dir.delete(true, true, &Logger::quiet()).unwrap());
        assert_eq!(store.mutations(), 0);
    }

    #[test]
    fn test_children_have_trailing_separator() {
        let (store, client) = store();
        store.insert_file("share", "top/a.txt", b"a");
        store.insert_dir("share", "top/inner");

        let dir = ShareDirectory::new(client, url("top/"));
        let files = dir.get_files().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].full_name(), url("top/a.txt"));

        let dirs = dir.get_directories().unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].full_name(), url("top/inner/"));
        assert!(dirs[0].url().is_directory());
    }
}
