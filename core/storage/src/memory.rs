//! In-memory stores for testing.
//!
//! Both stores count mutating calls and can be told to fail the delete of a
//! given key, so callers can check what an operation actually touched.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use unifs_common::{Error, Result};

use crate::blob::BlobStore;
use crate::share::{ShareEntry, ShareStore};

fn injected(key: &str) -> Error {
    Error::Backend(format!("injected failure deleting {}", key))
}

/// Flat object store keyed by `(container, key)`.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: RwLock<BTreeMap<(String, String), Vec<u8>>>,
    failing: RwLock<HashSet<String>>,
    mutations: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting it as a mutation.
    pub fn insert(&self, container: &str, key: &str, data: &[u8]) {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((container.to_string(), key.to_string()), data.to_vec());
    }

    /// Content of an object, if present.
    pub fn object(&self, container: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(container.to_string(), key.to_string()))
            .cloned()
    }

    /// All keys in a container, sorted.
    pub fn keys(&self, container: &str) -> Vec<String> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|(c, _)| c == container)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Number of put and delete calls that reached the store.
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Make every later delete of `key` fail.
    pub fn fail_deletes_of(&self, key: &str) {
        self.failing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string());
    }

    fn is_failing(&self, key: &str) -> bool {
        self.failing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

impl BlobStore for MemoryBlobStore {
    fn exists(&self, container: &str, key: &str) -> Result<bool> {
        Ok(self.object(container, key).is_some())
    }

    fn get(&self, container: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.object(container, key))
    }

    fn put(&self, container: &str, key: &str, data: &[u8]) -> Result<()> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        self.insert(container, key, data);
        Ok(())
    }

    fn delete(&self, container: &str, key: &str) -> Result<()> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        if self.is_failing(key) {
            return Err(injected(key));
        }
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(container.to_string(), key.to_string()));
        Ok(())
    }

    fn list(&self, container: &str, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .keys(container)
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Directory,
}

/// One recorded `write_range` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeWrite {
    pub path: String,
    pub offset: u64,
    pub len: usize,
}

/// Hierarchical share keyed by `(share, path)`.
///
/// Paths are slash-separated without leading or trailing slashes. The share
/// root (`""`) always exists.
#[derive(Default)]
pub struct MemoryShareStore {
    nodes: RwLock<BTreeMap<(String, String), Node>>,
    ranges: RwLock<Vec<RangeWrite>>,
    failing: RwLock<HashSet<String>>,
    mutations: AtomicUsize,
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn parent_of(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i]).unwrap_or("")
}

impl MemoryShareStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file, creating missing parent directories.
    pub fn insert_file(&self, share: &str, path: &str, data: &[u8]) {
        let path = normalize(path);
        self.insert_parents(share, &path);
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((share.to_string(), path), Node::File(data.to_vec()));
    }

    /// Seed a directory, creating missing parents.
    pub fn insert_dir(&self, share: &str, path: &str) {
        let path = normalize(path);
        self.insert_parents(share, &path);
        if !path.is_empty() {
            self.nodes
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert((share.to_string(), path), Node::Directory);
        }
    }

    fn insert_parents(&self, share: &str, path: &str) {
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let mut parent = parent_of(path);
        while !parent.is_empty() {
            nodes
                .entry((share.to_string(), parent.to_string()))
                .or_insert(Node::Directory);
            parent = parent_of(parent);
        }
    }

    /// Content of a file, if present.
    pub fn file(&self, share: &str, path: &str) -> Option<Vec<u8>> {
        match self.node(share, &normalize(path)) {
            Some(Node::File(data)) => Some(data),
            _ => None,
        }
    }

    /// Every path in a share, sorted.
    pub fn paths(&self, share: &str) -> Vec<String> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|(s, _)| s == share)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Range writes seen so far, in call order.
    pub fn range_writes(&self) -> Vec<RangeWrite> {
        self.ranges
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Make every later delete of `path` fail.
    pub fn fail_deletes_of(&self, path: &str) {
        self.failing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize(path));
    }

    fn node(&self, share: &str, path: &str) -> Option<Node> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(share.to_string(), path.to_string()))
            .cloned()
    }

    fn is_dir(&self, share: &str, path: &str) -> bool {
        path.is_empty() || matches!(self.node(share, path), Some(Node::Directory))
    }

    fn children(&self, share: &str, path: &str) -> Vec<(String, bool)> {
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|((s, _), _)| s == share)
            .filter_map(|((_, p), node)| {
                let rel = p.strip_prefix(&prefix)?;
                if rel.is_empty() || rel.contains('/') {
                    return None;
                }
                Some((rel.to_string(), matches!(node, Node::Directory)))
            })
            .collect()
    }

    fn mutate(&self, path: &str, deleting: bool) -> Result<()> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path);
        if deleting && failing {
            return Err(injected(path));
        }
        Ok(())
    }

    fn require_parent(&self, share: &str, path: &str) -> Result<()> {
        if self.is_dir(share, parent_of(path)) {
            Ok(())
        } else {
            Err(Error::Backend(format!("ParentNotFound: {}/{}", share, path)))
        }
    }
}

impl ShareStore for MemoryShareStore {
    fn file_length(&self, share: &str, path: &str) -> Result<Option<u64>> {
        Ok(self.file(share, path).map(|data| data.len() as u64))
    }

    fn read_file(&self, share: &str, path: &str) -> Result<Vec<u8>> {
        self.file(share, path)
            .ok_or_else(|| Error::Backend(format!("ResourceNotFound: {}/{}", share, path)))
    }

    fn create_file(&self, share: &str, path: &str, length: u64) -> Result<()> {
        let path = normalize(path);
        self.mutate(&path, false)?;
        self.require_parent(share, &path)?;
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((share.to_string(), path), Node::File(vec![0; length as usize]));
        Ok(())
    }

    fn write_range(&self, share: &str, path: &str, offset: u64, data: &[u8]) -> Result<()> {
        let path = normalize(path);
        self.mutate(&path, false)?;
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let Some(Node::File(content)) = nodes.get_mut(&(share.to_string(), path.clone())) else {
            return Err(Error::Backend(format!("ResourceNotFound: {}/{}", share, path)));
        };
        let start = offset as usize;
        let end = start + data.len();
        if end > content.len() {
            return Err(Error::Backend(format!(
                "InvalidRange: {}-{} beyond {}",
                start,
                end,
                content.len()
            )));
        }
        content[start..end].copy_from_slice(data);
        self.ranges
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RangeWrite {
                path,
                offset,
                len: data.len(),
            });
        Ok(())
    }

    fn delete_file(&self, share: &str, path: &str) -> Result<()> {
        let path = normalize(path);
        self.mutate(&path, true)?;
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        let key = (share.to_string(), path);
        if matches!(nodes.get(&key), Some(Node::File(_))) {
            nodes.remove(&key);
        }
        Ok(())
    }

    fn dir_exists(&self, share: &str, path: &str) -> Result<bool> {
        Ok(self.is_dir(share, &normalize(path)))
    }

    fn create_dir(&self, share: &str, path: &str) -> Result<()> {
        let path = normalize(path);
        self.mutate(&path, false)?;
        if self.node(share, &path).is_some() || path.is_empty() {
            return Err(Error::AlreadyExists(format!("{}/{}", share, path)));
        }
        self.require_parent(share, &path)?;
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((share.to_string(), path), Node::Directory);
        Ok(())
    }

    fn delete_dir(&self, share: &str, path: &str) -> Result<()> {
        let path = normalize(path);
        self.mutate(&path, true)?;
        if path.is_empty() {
            return Err(Error::Backend(format!("cannot delete root of {}", share)));
        }
        if !self.children(share, &path).is_empty() {
            return Err(Error::NotEmpty(format!("{}/{}", share, path)));
        }
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(share.to_string(), path));
        Ok(())
    }

    fn list_dir(&self, share: &str, path: &str) -> Result<Vec<ShareEntry>> {
        let path = normalize(path);
        if !self.is_dir(share, &path) {
            return Err(Error::Backend(format!("ResourceNotFound: {}/{}", share, path)));
        }
        Ok(self
            .children(share, &path)
            .into_iter()
            .map(|(name, is_directory)| ShareEntry { name, is_directory })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_put_get_delete() {
        let store = MemoryBlobStore::new();
        store.put("c", "a/b.txt", b"data").unwrap();
        assert!(store.exists("c", "a/b.txt").unwrap());
        assert_eq!(store.get("c", "a/b.txt").unwrap(), Some(b"data".to_vec()));
        assert_eq!(store.list("c", "a/").unwrap(), vec!["a/b.txt".to_string()]);
        assert!(store.list("other", "a/").unwrap().is_empty());

        store.delete("c", "a/b.txt").unwrap();
        store.delete("c", "a/b.txt").unwrap();
        assert_eq!(store.get("c", "a/b.txt").unwrap(), None);
        assert_eq!(store.mutations(), 3);
    }

    #[test]
    fn test_blob_injected_failure() {
        let store = MemoryBlobStore::new();
        store.insert("c", "k", b"v");
        store.fail_deletes_of("k");
        assert!(store.delete("c", "k").is_err());
        assert!(store.exists("c", "k").unwrap());
    }

    #[test]
    fn test_share_hierarchy() {
        let store = MemoryShareStore::new();
        assert!(store.dir_exists("s", "").unwrap());
        assert!(store.create_dir("s", "a/b").is_err());

        store.create_dir("s", "a").unwrap();
        store.create_dir("s", "a/b").unwrap();
        store.create_file("s", "a/f.txt", 3).unwrap();
        store.write_range("s", "a/f.txt", 1, b"xy").unwrap();
        assert_eq!(store.read_file("s", "a/f.txt").unwrap(), vec![0, b'x', b'y']);

        let mut names: Vec<(String, bool)> = store
            .list_dir("s", "a")
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.is_directory))
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![("b".to_string(), true), ("f.txt".to_string(), false)]
        );

        assert!(matches!(store.delete_dir("s", "a"), Err(Error::NotEmpty(_))));
    }

    #[test]
    fn test_share_range_out_of_bounds() {
        let store = MemoryShareStore::new();
        store.create_file("s", "f", 2).unwrap();
        assert!(store.write_range("s", "f", 1, b"abc").is_err());
        assert!(store.range_writes().is_empty());
    }

    #[test]
    fn test_share_seeding_creates_parents() {
        let store = MemoryShareStore::new();
        store.insert_file("s", "x/y/z.txt", b"z");
        assert!(store.dir_exists("s", "x/y/").unwrap());
        assert_eq!(store.paths("s"), vec!["x", "x/y", "x/y/z.txt"]);
        assert_eq!(store.mutations(), 0);
    }
}
