//! Backend dispatch: turn a URL and a client registry into a handle.
//!
//! The backend is picked once, when the handle is built, and carried as an
//! enum variant. Callers work with [`AnyFile`] and [`AnyDirectory`] and never
//! name a concrete backend type.

use unifs_common::{classify, is_directory, Backend, Error, Logger, Result, StorageUrl};

use crate::blob::{BlobDirectory, BlobFile};
use crate::local::{combine_local, LocalDirectory, LocalFile};
use crate::provider::{
    combine_url, AccessType, Entry, FileBuffer, StorageDirectory, StorageFile,
};
use crate::registry::Clients;
use crate::share::{ShareDirectory, ShareFile};

/// A file handle on any backend.
#[derive(Debug)]
pub enum AnyFile {
    Local(LocalFile),
    Network(LocalFile),
    Aws(BlobFile),
    AzureBlob(BlobFile),
    AzureShare(ShareFile),
}

/// A directory handle on any backend.
#[derive(Debug)]
pub enum AnyDirectory {
    Local(LocalDirectory),
    Network(LocalDirectory),
    Aws(BlobDirectory),
    AzureBlob(BlobDirectory),
    AzureShare(ShareDirectory),
}

macro_rules! with_file {
    ($file:expr, $h:ident => $body:expr) => {
        match $file {
            AnyFile::Local($h) | AnyFile::Network($h) => $body,
            AnyFile::Aws($h) | AnyFile::AzureBlob($h) => $body,
            AnyFile::AzureShare($h) => $body,
        }
    };
}

macro_rules! with_directory {
    ($dir:expr, $h:ident => $body:expr) => {
        match $dir {
            AnyDirectory::Local($h) | AnyDirectory::Network($h) => $body,
            AnyDirectory::Aws($h) | AnyDirectory::AzureBlob($h) => $body,
            AnyDirectory::AzureShare($h) => $body,
        }
    };
}

impl Entry for AnyFile {
    fn url(&self) -> &StorageUrl {
        with_file!(self, f => f.url())
    }
}

impl StorageFile for AnyFile {
    fn exists(&self) -> Result<bool> {
        with_file!(self, f => f.exists())
    }

    fn create(&mut self, overwrite: bool, log: &Logger<'_>) -> Result<&mut Self> {
        with_file!(&mut *self, f => {
            f.create(overwrite, log)?;
        });
        Ok(self)
    }

    fn open(&mut self, access: AccessType, log: &Logger<'_>) -> Result<&mut FileBuffer> {
        with_file!(self, f => f.open(access, log))
    }

    fn flush(&mut self, log: &Logger<'_>) -> Result<()> {
        with_file!(self, f => f.flush(log))
    }

    fn close(&mut self, log: &Logger<'_>) -> Result<()> {
        with_file!(self, f => f.close(log))
    }

    fn delete(&mut self, stop_on_error: bool, log: &Logger<'_>) -> Result<bool> {
        with_file!(self, f => f.delete(stop_on_error, log))
    }

    fn is_open(&self) -> bool {
        with_file!(self, f => f.is_open())
    }

    fn take_buffer(&mut self) -> Option<FileBuffer> {
        with_file!(self, f => f.take_buffer())
    }
}

impl Entry for AnyDirectory {
    fn url(&self) -> &StorageUrl {
        with_directory!(self, d => d.url())
    }
}

impl StorageDirectory for AnyDirectory {
    type File = AnyFile;

    fn exists(&self) -> Result<bool> {
        with_directory!(self, d => d.exists())
    }

    fn create(&mut self, fail_if_exists: bool, log: &Logger<'_>) -> Result<&mut Self> {
        with_directory!(&mut *self, d => {
            d.create(fail_if_exists, log)?;
        });
        Ok(self)
    }

    fn delete(&mut self, recurse: bool, stop_on_error: bool, log: &Logger<'_>) -> Result<bool> {
        with_directory!(self, d => d.delete(recurse, stop_on_error, log))
    }

    fn get_files(&self) -> Result<Vec<AnyFile>> {
        Ok(match self {
            AnyDirectory::Local(d) => d.get_files()?.into_iter().map(AnyFile::Local).collect(),
            AnyDirectory::Network(d) => d.get_files()?.into_iter().map(AnyFile::Network).collect(),
            AnyDirectory::Aws(d) => d.get_files()?.into_iter().map(AnyFile::Aws).collect(),
            AnyDirectory::AzureBlob(d) => {
                d.get_files()?.into_iter().map(AnyFile::AzureBlob).collect()
            }
            AnyDirectory::AzureShare(d) => {
                d.get_files()?.into_iter().map(AnyFile::AzureShare).collect()
            }
        })
    }

    fn get_directories(&self) -> Result<Vec<AnyDirectory>> {
        Ok(match self {
            AnyDirectory::Local(d) => d
                .get_directories()?
                .into_iter()
                .map(AnyDirectory::Local)
                .collect(),
            AnyDirectory::Network(d) => d
                .get_directories()?
                .into_iter()
                .map(AnyDirectory::Network)
                .collect(),
            AnyDirectory::Aws(d) => d
                .get_directories()?
                .into_iter()
                .map(AnyDirectory::Aws)
                .collect(),
            AnyDirectory::AzureBlob(d) => d
                .get_directories()?
                .into_iter()
                .map(AnyDirectory::AzureBlob)
                .collect(),
            AnyDirectory::AzureShare(d) => d
                .get_directories()?
                .into_iter()
                .map(AnyDirectory::AzureShare)
                .collect(),
        })
    }

    fn path_combine(&self, paths: &[&str]) -> String {
        with_directory!(self, d => d.path_combine(paths))
    }

    fn file_at(&self, url: &str) -> AnyFile {
        match self {
            AnyDirectory::Local(d) => AnyFile::Local(d.file_at(url)),
            AnyDirectory::Network(d) => AnyFile::Network(d.file_at(url)),
            AnyDirectory::Aws(d) => AnyFile::Aws(d.file_at(url)),
            AnyDirectory::AzureBlob(d) => AnyFile::AzureBlob(d.file_at(url)),
            AnyDirectory::AzureShare(d) => AnyFile::AzureShare(d.file_at(url)),
        }
    }

    fn directory_at(&self, url: &str) -> AnyDirectory {
        match self {
            AnyDirectory::Local(d) => AnyDirectory::Local(d.directory_at(url)),
            AnyDirectory::Network(d) => AnyDirectory::Network(d.directory_at(url)),
            AnyDirectory::Aws(d) => AnyDirectory::Aws(d.directory_at(url)),
            AnyDirectory::AzureBlob(d) => AnyDirectory::AzureBlob(d.directory_at(url)),
            AnyDirectory::AzureShare(d) => AnyDirectory::AzureShare(d.directory_at(url)),
        }
    }
}

/// Build a file handle for `url`.
///
/// The client comes from `clients`; a missing one is only reported when the
/// handle first needs it.
///
/// # Errors
/// - `UnknownUrlType` if the URL cannot be classified or names a directory
pub fn resolve_file(url: &str, clients: &Clients) -> Result<AnyFile> {
    let (backend, _) = classify(url);
    if is_directory(url) || backend == Backend::Unknown {
        return Err(Error::UnknownUrlType(url.to_string()));
    }
    Ok(match backend {
        Backend::Local => AnyFile::Local(LocalFile::new(url)),
        Backend::Network => AnyFile::Network(LocalFile::new(url)),
        Backend::Aws => AnyFile::Aws(BlobFile::new(clients.aws(), url)),
        Backend::AzureBlob => AnyFile::AzureBlob(BlobFile::new(clients.azure_blob(), url)),
        Backend::AzureShare => AnyFile::AzureShare(ShareFile::new(clients.azure_share(), url)),
        Backend::Unknown => return Err(Error::UnknownUrlType(url.to_string())),
    })
}

/// Build a directory handle for `url`.
///
/// # Errors
/// - `UnknownUrlType` if the URL cannot be classified or names a file
pub fn resolve_directory(url: &str, clients: &Clients) -> Result<AnyDirectory> {
    let (backend, _) = classify(url);
    if !is_directory(url) {
        return Err(Error::UnknownUrlType(url.to_string()));
    }
    Ok(match backend {
        Backend::Local => AnyDirectory::Local(LocalDirectory::new(url)),
        Backend::Network => AnyDirectory::Network(LocalDirectory::new(url)),
        Backend::Aws => AnyDirectory::Aws(BlobDirectory::new(clients.aws(), url)),
        Backend::AzureBlob => {
            AnyDirectory::AzureBlob(BlobDirectory::new(clients.azure_blob(), url))
        }
        Backend::AzureShare => {
            AnyDirectory::AzureShare(ShareDirectory::new(clients.azure_share(), url))
        }
        Backend::Unknown => return Err(Error::UnknownUrlType(url.to_string())),
    })
}

/// Resolve and create a file. The returned handle is open.
pub fn create_file(
    url: &str,
    clients: &Clients,
    overwrite: bool,
    log: &Logger<'_>,
) -> Result<AnyFile> {
    let mut file = resolve_file(url, clients)?;
    file.create(overwrite, log)?;
    Ok(file)
}

/// Resolve and create a directory.
pub fn create_directory(
    url: &str,
    clients: &Clients,
    fail_if_exists: bool,
    log: &Logger<'_>,
) -> Result<AnyDirectory> {
    let mut dir = resolve_directory(url, clients)?;
    dir.create(fail_if_exists, log)?;
    Ok(dir)
}

/// Delete whatever `url` names, choosing file or directory by its trailing
/// separator.
pub fn delete(
    url: &str,
    clients: &Clients,
    recurse: bool,
    stop_on_error: bool,
    log: &Logger<'_>,
) -> Result<bool> {
    if is_directory(url) {
        resolve_directory(url, clients)?.delete(recurse, stop_on_error, log)
    } else {
        resolve_file(url, clients)?.delete(stop_on_error, log)
    }
}

/// Whether the file or directory `url` names exists.
pub fn exists(url: &str, clients: &Clients) -> Result<bool> {
    if is_directory(url) {
        resolve_directory(url, clients)?.exists()
    } else {
        resolve_file(url, clients)?.exists()
    }
}

/// Join paths using the rules of the first path's backend.
///
/// # Errors
/// - `UnknownUrlType` if there is no first path or it cannot be classified
pub fn path_combine(paths: &[&str]) -> Result<String> {
    let first = paths
        .first()
        .ok_or_else(|| Error::UnknownUrlType(String::new()))?;
    match classify(first).0 {
        Backend::Local | Backend::Network => Ok(combine_local(paths)),
        Backend::Aws | Backend::AzureBlob | Backend::AzureShare => Ok(combine_url(paths)),
        Backend::Unknown => Err(Error::UnknownUrlType(first.to_string())),
    }
}

/// Copy one file to another, across backends if need be.
///
/// # Errors
/// - `NotFound` if the source does not exist
/// - `AlreadyExists` if the target exists and `overwrite` is false
pub fn copy_file(
    source: &str,
    target: &str,
    clients: &Clients,
    overwrite: bool,
    log: &Logger<'_>,
) -> Result<()> {
    let mut from = resolve_file(source, clients)?;
    let mut to = resolve_file(target, clients)?;
    if !from.exists()? {
        return Err(Error::NotFound(format!("File [{}]", source)));
    }

    let data = from.read_all_bytes()?;
    to.create(overwrite, log)?;
    to.write_all_bytes(&data, log)?;
    log.info(&format!("Copied [{}] to [{}].", source, target));
    Ok(())
}

/// Copy a file, then delete the source.
pub fn move_file(
    source: &str,
    target: &str,
    clients: &Clients,
    overwrite: bool,
    log: &Logger<'_>,
) -> Result<()> {
    copy_file(source, target, clients, overwrite, log)?;
    resolve_file(source, clients)?.delete(true, log)?;
    log.info(&format!("Moved [{}] to [{}].", source, target));
    Ok(())
}
