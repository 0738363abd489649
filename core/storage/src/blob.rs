//! Flat key/value backends (AWS S3, Azure Blob).
//!
//! These stores have no directories. A directory is the set of live objects
//! whose key starts with the directory key, plus a zero-length placeholder
//! object at `key + "_"` written when the directory is created.

use std::collections::HashSet;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use tracing::debug;
use unifs_common::{Error, Logger, Result, StorageUrl};

use crate::provider::{
    combine_url, malformed, report, settle_delete, AccessType, Entry, FileBuffer,
    StorageDirectory, StorageFile,
};

/// Suffix of the placeholder object that marks an emulated directory.
pub const PLACEHOLDER_SUFFIX: &str = "_";

/// Native primitives of a flat object store.
///
/// `container` is the bucket or blob container; keys are relative to it.
pub trait BlobStore: Send + Sync {
    /// Whether an object exists at `key`.
    fn exists(&self, container: &str, key: &str) -> Result<bool>;

    /// Object content, or `None` if absent.
    fn get(&self, container: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `data` at `key`, replacing any prior object.
    fn put(&self, container: &str, key: &str, data: &[u8]) -> Result<()>;

    /// Remove the object at `key`. Absent objects are not an error.
    fn delete(&self, container: &str, key: &str) -> Result<()>;

    /// Keys of all live objects starting with `prefix`.
    fn list(&self, container: &str, prefix: &str) -> Result<Vec<String>>;
}

fn client_family(url: &StorageUrl) -> String {
    url.backend().client_family().unwrap_or("Blob").to_string()
}

/// A file stored as one object.
pub struct BlobFile {
    url: StorageUrl,
    client: Option<Arc<dyn BlobStore>>,
    buffer: Option<FileBuffer>,
}

impl BlobFile {
    pub fn new(client: Option<Arc<dyn BlobStore>>, url: impl Into<String>) -> Self {
        Self {
            url: StorageUrl::parse(url),
            client,
            buffer: None,
        }
    }

    fn target(&self) -> Result<(&dyn BlobStore, &str, &str)> {
        let client = self
            .client
            .as_deref()
            .ok_or_else(|| Error::ClientNotConfigured(client_family(&self.url)))?;
        let container = self.url.container().ok_or_else(|| malformed(&self.url))?;
        let key = self
            .url
            .key()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| malformed(&self.url))?;
        Ok((client, container, key))
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
        let (client, container, key) = self.target()?;
        if client.exists(container, key)? {
            client.delete(container, key)?;
        }
        log.info(&format!("File [{}] was deleted.", self.full_name()));
        Ok(true)
    }
}

impl fmt::Debug for BlobFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobFile")
            .field("url", &self.url.as_str())
            .field("client", &self.client.is_some())
            .field("open", &self.buffer.is_some())
            .finish()
    }
}

impl Entry for BlobFile {
    fn url(&self) -> &StorageUrl {
        &self.url
    }
}

impl StorageFile for BlobFile {
    fn exists(&self) -> Result<bool> {
        let (client, container, key) = self.target()?;
        client.exists(container, key)
    }

    fn create(&mut self, overwrite: bool, log: &Logger<'_>) -> Result<&mut Self> {
        report(self.try_create(overwrite, log), log)?;
        log.info(&format!("File [{}] was created.", self.full_name()));
        Ok(self)
    }

    fn open(&mut self, access: AccessType, _log: &Logger<'_>) -> Result<&mut FileBuffer> {
        let (client, container, key) = self.target()?;
        let data = match access {
            AccessType::Read => client.get(container, key)?.unwrap_or_default(),
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
        let (client, container, key) = self.target()?;
        client.put(container, key, buffer.get_ref())
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

/// A directory emulated by key prefix and placeholder object.
pub struct BlobDirectory {
    url: StorageUrl,
    client: Option<Arc<dyn BlobStore>>,
}

impl BlobDirectory {
    pub fn new(client: Option<Arc<dyn BlobStore>>, url: impl Into<String>) -> Self {
        Self {
            url: StorageUrl::parse(url),
            client,
        }
    }

    /// Key of this directory's placeholder object.
    pub fn placeholder_key(&self) -> Option<String> {
        self.url
            .key()
            .map(|key| format!("{}{}", key, PLACEHOLDER_SUFFIX))
    }

    fn target(&self) -> Result<(&dyn BlobStore, &str, &str)> {
        let client = self
            .client
            .as_deref()
            .ok_or_else(|| Error::ClientNotConfigured(client_family(&self.url)))?;
        let container = self.url.container().ok_or_else(|| malformed(&self.url))?;
        let key = self.url.key().ok_or_else(|| malformed(&self.url))?;
        Ok((client, container, key))
    }

    /// Keys under this directory, relative to it.
    fn relative_keys(&self) -> Result<Vec<String>> {
        let (client, container, key) = self.target()?;
        Ok(client
            .list(container, key)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(key).map(str::to_string))
            .collect())
    }

    fn try_create(&mut self, fail_if_exists: bool) -> Result<()> {
        let (client, container, key) = self.target()?;
        let exists = !client.list(container, key)?.is_empty();
        if exists && fail_if_exists {
            return Err(Error::AlreadyExists(format!(
                "Directory [{}]",
                self.full_name()
            )));
        }
        if !exists {
            let placeholder = format!("{}{}", key, PLACEHOLDER_SUFFIX);
            client.put(container, &placeholder, &[])?;
        }
        Ok(())
    }

    fn try_delete(&mut self, recurse: bool, stop_on_error: bool, log: &Logger<'_>) -> Result<bool> {
        let (client, container, key) = self.target()?;
        let placeholder = format!("{}{}", key, PLACEHOLDER_SUFFIX);
        let mut keys = client.list(container, key)?;

        if !recurse && keys.iter().any(|k| *k != placeholder) {
            return Err(Error::NotEmpty(self.full_name().to_string()));
        }

        // Placeholder last; it stays while any child survives.
        keys.sort_by_key(|k| *k == placeholder);

        let root = self.url.root().unwrap_or_default();
        let mut success = true;
        for object in &keys {
            if !success && *object == placeholder {
                break;
            }
            match client.delete(container, object) {
                Ok(()) => log.info(&format!("Object [{}{}] was deleted.", root, object)),
                Err(e) if !stop_on_error => {
                    log.error(&e.to_string());
                    success = false;
                }
                Err(e) => return Err(e),
            }
        }

        if success {
            log.info(&format!("Directory [{}] was deleted.", self.full_name()));
        }
        Ok(success)
    }
}

impl fmt::Debug for BlobDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobDirectory")
            .field("url", &self.url.as_str())
            .field("client", &self.client.is_some())
            .finish()
    }
}

impl Entry for BlobDirectory {
    fn url(&self) -> &StorageUrl {
        &self.url
    }
}

impl StorageDirectory for BlobDirectory {
    type File = BlobFile;

    fn exists(&self) -> Result<bool> {
        let (client, container, key) = self.target()?;
        Ok(!client.list(container, key)?.is_empty())
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

    fn get_files(&self) -> Result<Vec<BlobFile>> {
        Ok(self
            .relative_keys()?
            .into_iter()
            .filter(|rel| !rel.is_empty() && !rel.contains('/') && rel != PLACEHOLDER_SUFFIX)
            .map(|rel| self.file_at(&combine_url(&[self.full_name(), &rel])))
            .collect())
    }

    fn get_directories(&self) -> Result<Vec<BlobDirectory>> {
        let mut seen = HashSet::new();
        let mut directories = Vec::new();
        for rel in self.relative_keys()? {
            let Some(end) = rel.find('/') else {
                continue;
            };
            if end == 0 {
                continue;
            }
            let segment = &rel[..=end];
            if seen.insert(segment.to_string()) {
                directories.push(self.directory_at(&combine_url(&[self.full_name(), segment])));
            }
        }
        Ok(directories)
    }

    fn path_combine(&self, paths: &[&str]) -> String {
        combine_url(paths)
    }

    fn file_at(&self, url: &str) -> BlobFile {
        BlobFile::new(self.client.clone(), url)
    }

    fn directory_at(&self, url: &str) -> BlobDirectory {
        BlobDirectory::new(self.client.clone(), url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBlobStore;
    use std::io::Write;

    const ROOT: &str = "s3://bucket/";

    fn store() -> (Arc<MemoryBlobStore>, Option<Arc<dyn BlobStore>>) {
        let store = Arc::new(MemoryBlobStore::new());
        let client: Arc<dyn BlobStore> = store.clone();
        (store, Some(client))
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let (_, client) = store();
        let log = Logger::quiet();
        let mut file = BlobFile::new(client.clone(), "s3://bucket/dir/data.bin");

        file.create(true, &log).unwrap();
        file.open(AccessType::Write, &log)
            .unwrap()
            .write_all(b"hello blob")
            .unwrap();
        file.close(&log).unwrap();

        let mut reader = BlobFile::new(client, "s3://bucket/dir/data.bin");
        let buffer = reader.open(AccessType::Read, &log).unwrap();
        assert_eq!(buffer.position(), 0);
        assert_eq!(buffer.get_ref(), b"hello blob");
    }

    #[test]
    fn test_create_writes_empty_object() {
        let (store, client) = store();
        let mut file = BlobFile::new(client, "s3://bucket/empty.txt");
        file.create(true, &Logger::quiet()).unwrap();

        assert!(file.is_open());
        assert_eq!(store.object("bucket", "empty.txt"), Some(Vec::new()));
    }

    #[test]
    fn test_create_without_overwrite_fails_when_present() {
        let (store, client) = store();
        store.insert("bucket", "a.txt", b"keep");
        let mut file = BlobFile::new(client, "s3://bucket/a.txt");

        let result = file.create(false, &Logger::quiet());
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
        assert_eq!(store.object("bucket", "a.txt"), Some(b"keep".to_vec()));
    }

    #[test]
    fn test_flush_is_idempotent() {
        let (store, client) = store();
        let log = Logger::quiet();
        let mut file = BlobFile::new(client, "s3://bucket/f.txt");
        file.open(AccessType::Write, &log)
            .unwrap()
            .write_all(b"abc")
            .unwrap();
        file.flush(&log).unwrap();
        file.flush(&log).unwrap();
        assert_eq!(store.object("bucket", "f.txt"), Some(b"abc".to_vec()));
    }

    #[test]
    fn test_close_when_closed_only_logs() {
        let (store, client) = store();
        let messages = std::cell::RefCell::new(Vec::new());
        let sink = |m: &str, _: Option<&str>| messages.borrow_mut().push(m.to_string());
        let log = Logger::new().with_callback(&sink);

        let mut file = BlobFile::new(client, "s3://bucket/f.txt");
        file.close(&log).unwrap();

        assert_eq!(store.mutations(), 0);
        assert!(messages.borrow()[0].contains("already closed"));
    }

    #[test]
    fn test_open_missing_object_yields_empty_buffer() {
        let (_, client) = store();
        let mut file = BlobFile::new(client, "s3://bucket/missing.txt");
        let buffer = file.open(AccessType::Read, &Logger::quiet()).unwrap();
        assert!(buffer.get_ref().is_empty());
    }

    #[test]
    fn test_missing_client_fails_lazily() {
        let file = BlobFile::new(None, "s3://bucket/a.txt");
        assert!(matches!(file.exists(), Err(Error::ClientNotConfigured(_))));

        let dir = BlobDirectory::new(None, "https://acct.blob.core.windows.net/c/d/");
        match dir.exists() {
            Err(Error::ClientNotConfigured(family)) => assert_eq!(family, "Azure"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_delete_missing_file_is_quiet_success() {
        let (store, client) = store();
        let mut file = BlobFile::new(client, "s3://bucket/nope.txt");
        assert!(file.delete(false, &Logger::quiet()).unwrap());
        assert_eq!(store.mutations(), 0);
    }

    #[test]
    fn test_deleted_file_can_be_recreated() {
        let (_, client) = store();
        let log = Logger::quiet();
        let mut file = BlobFile::new(client, "s3://bucket/again.txt");
        file.create(true, &log).unwrap();
        file.close(&log).unwrap();
        assert!(file.delete(true, &log).unwrap());
        assert!(!file.exists().unwrap());

        file.create(false, &log).unwrap();
        assert!(file.exists().unwrap());
    }

    #[test]
    fn test_directory_create_writes_placeholder() {
        let (store, client) = store();
        let mut dir = BlobDirectory::new(client, "s3://bucket/reports/");
        assert!(!dir.exists().unwrap());

        dir.create(false, &Logger::quiet()).unwrap();
        assert!(dir.exists().unwrap());
        assert_eq!(store.keys("bucket"), vec!["reports/_".to_string()]);
        assert_eq!(dir.placeholder_key().as_deref(), Some("reports/_"));
    }

    #[test]
    fn test_directory_create_fail_if_exists() {
        let (store, client) = store();
        store.insert("bucket", "reports/a.csv", b"1");
        let mut dir = BlobDirectory::new(client, "s3://bucket/reports/");

        assert!(matches!(
            dir.create(true, &Logger::quiet()),
            Err(Error::AlreadyExists(_))
        ));
        // Existing without the guard is fine and writes nothing.
        let before = store.mutations();
        dir.create(false, &Logger::quiet()).unwrap();
        assert_eq!(store.mutations(), before);
    }

    #[test]
    fn test_recursive_delete_removes_prefix_only() {
        let (store, client) = store();
        store.insert("bucket", "logs/_", b"");
        store.insert("bucket", "logs/a.txt", b"a");
        store.insert("bucket", "logs/deep/b.txt", b"b");
        store.insert("bucket", "logs2/keep.txt", b"k");

        let mut dir = BlobDirectory::new(client, "s3://bucket/logs/");
        assert!(dir.delete(true, true, &Logger::quiet()).unwrap());

        assert!(!dir.exists().unwrap());
        assert_eq!(store.keys("bucket"), vec!["logs2/keep.txt".to_string()]);
    }

    #[test]
    fn test_non_recursive_delete_of_populated_directory() {
        let (store, client) = store();
        store.insert("bucket", "logs/_", b"");
        store.insert("bucket", "logs/a.txt", b"a");
        let mut dir = BlobDirectory::new(client, "s3://bucket/logs/");

        let result = dir.delete(false, true, &Logger::quiet());
        assert!(matches!(result, Err(Error::NotEmpty(_))));
        assert_eq!(store.keys("bucket").len(), 2);

        assert!(!dir.delete(false, false, &Logger::quiet()).unwrap());
        assert_eq!(store.keys("bucket").len(), 2);
    }

    #[test]
    fn test_non_recursive_delete_of_bare_placeholder() {
        let (store, client) = store();
        store.insert("bucket", "empty/_", b"");
        let mut dir = BlobDirectory::new(client, "s3://bucket/empty/");

        assert!(dir.delete(false, true, &Logger::quiet()).unwrap());
        assert!(store.keys("bucket").is_empty());
    }

    #[test]
    fn test_delete_missing_directory_is_quiet_success() {
        let (store, client) = store();
        let mut dir = BlobDirectory::new(client, "s3://bucket/none/");
        assert!(dir.delete(true, false, &Logger::quiet()).unwrap());
        assert_eq!(store.mutations(), 0);
    }

    #[test]
    fn test_partial_failure_keeps_placeholder() {
        let (store, client) = store();
        store.insert("bucket", "mix/_", b"");
        store.insert("bucket", "mix/a.txt", b"a");
        store.insert("bucket", "mix/b.txt", b"b");
        store.fail_deletes_of("mix/a.txt");

        let mut dir = BlobDirectory::new(client, "s3://bucket/mix/");
        assert!(!dir.delete(true, false, &Logger::quiet()).unwrap());
        assert_eq!(
            store.keys("bucket"),
            vec!["mix/_".to_string(), "mix/a.txt".to_string()]
        );
        assert!(dir.exists().unwrap());
        let names: Vec<Option<String>> =
            dir.get_files().unwrap().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec![Some("a.txt".to_string())]);
    }

    #[test]
    fn test_stop_on_error_propagates_first_failure() {
        let (store, client) = store();
        store.insert("bucket", "mix/a.txt", b"a");
        store.fail_deletes_of("mix/a.txt");

        let mut dir = BlobDirectory::new(client, "s3://bucket/mix/");
        assert!(matches!(
            dir.delete(true, true, &Logger::quiet()),
            Err(Error::Backend(_))
        ));
    }

    #[test]
    fn test_children_are_one_level() {
        let (store, client) = store();
        store.insert("bucket", "top/_", b"");
        store.insert("bucket", "top/a.txt", b"a");
        store.insert("bucket", "top/b.txt", b"b");
        store.insert("bucket", "top/sub/c.txt", b"c");
        store.insert("bucket", "top/sub/deeper/d.txt", b"d");
        store.insert("bucket", "top/other/_", b"");

        let dir = BlobDirectory::new(client, "s3://bucket/top/");
        let files: Vec<String> = dir
            .get_files()
            .unwrap()
            .iter()
            .map(|f| f.full_name().to_string())
            .collect();
        assert_eq!(files, vec!["s3://bucket/top/a.txt", "s3://bucket/top/b.txt"]);

        let dirs: Vec<String> = dir
            .get_directories()
            .unwrap()
            .iter()
            .map(|d| d.full_name().to_string())
            .collect();
        assert_eq!(dirs, vec!["s3://bucket/top/other/", "s3://bucket/top/sub/"]);
    }

    #[test]
    fn test_container_root_directory() {
        let (store, client) = store();
        store.insert("bucket", "a.txt", b"a");
        store.insert("bucket", "d/b.txt", b"b");

        let dir = BlobDirectory::new(client, ROOT);
        assert!(dir.exists().unwrap());
        assert_eq!(dir.get_files().unwrap().len(), 1);
        assert_eq!(dir.get_directories().unwrap()[0].full_name(), "s3://bucket/d/");
    }

    #[test]
    fn test_child_handles() {
        let dir = BlobDirectory::new(None, ROOT);
        assert_eq!(dir.file("x.txt").full_name(), "s3://bucket/x.txt");
        assert_eq!(dir.directory("sub").full_name(), "s3://bucket/sub/");
    }

    #[test]
    fn test_malformed_url_fails_on_use() {
        let (_, client) = store();
        let file = BlobFile::new(client, "s3://");
        assert!(matches!(file.exists(), Err(Error::UnknownUrlType(_))));
    }
}
