//! Host filesystem backend, also used for UNC network paths.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use tracing::debug;
use unifs_common::{Error, Logger, Result, StorageUrl};

use crate::provider::{
    report, settle_delete, AccessType, Entry, FileBuffer, StorageDirectory, StorageFile,
};

fn is_sep(c: char) -> bool {
    c == '/' || c == '\\'
}

fn is_rooted(segment: &str) -> bool {
    let mut chars = segment.chars();
    match (chars.next(), chars.next()) {
        (Some(c), _) if is_sep(c) => true,
        (Some(d), Some(':')) => d.is_ascii_alphabetic(),
        _ => false,
    }
}

/// Join host path segments.
///
/// A segment that is a bare separator becomes `_` plus that separator, since
/// host filesystems reject empty names. A rooted segment discards everything
/// before it. The separator is taken from the first path.
pub fn combine_local(paths: &[&str]) -> String {
    let sep = paths
        .first()
        .map(|p| StorageUrl::parse(*p).separator())
        .unwrap_or(std::path::MAIN_SEPARATOR);

    let mut out = String::new();
    for path in paths {
        let segment = match *path {
            "/" | "\\" => format!("_{}", path),
            other => other.to_string(),
        };
        if segment.is_empty() {
            continue;
        }
        if is_rooted(&segment) {
            out.clear();
        } else if !out.is_empty() && !out.ends_with(is_sep) {
            out.push(sep);
        }
        out.push_str(&segment);
    }
    out
}

/// A file on the host filesystem or a UNC share.
#[derive(Debug)]
pub struct LocalFile {
    url: StorageUrl,
    buffer: Option<FileBuffer>,
}

impl LocalFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            url: StorageUrl::parse(path),
            buffer: None,
        }
    }

    fn path(&self) -> &Path {
        Path::new(self.url.as_str())
    }

    fn try_create(&mut self, overwrite: bool, log: &Logger<'_>) -> Result<()> {
        if self.exists()? && !overwrite {
            return Err(Error::AlreadyExists(format!(
                "File [{}]",
                self.full_name()
            )));
        }
        if let Some(parent) = self.path().parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        self.buffer = Some(Cursor::new(Vec::new()));
        self.flush(log)
    }

    fn try_delete(&mut self, log: &Logger<'_>) -> Result<bool> {
        if self.path().is_file() {
            fs::remove_file(self.path())?;
        }
        log.info(&format!("File [{}] was deleted.", self.full_name()));
        Ok(true)
    }
}

impl Entry for LocalFile {
    fn url(&self) -> &StorageUrl {
        &self.url
    }
}

impl StorageFile for LocalFile {
    fn exists(&self) -> Result<bool> {
        Ok(self.path().is_file())
    }

    fn create(&mut self, overwrite: bool, log: &Logger<'_>) -> Result<&mut Self> {
        report(self.try_create(overwrite, log), log)?;
        log.info(&format!("File [{}] was created.", self.full_name()));
        Ok(self)
    }

    fn open(&mut self, access: AccessType, _log: &Logger<'_>) -> Result<&mut FileBuffer> {
        let data = match access {
            AccessType::Read if self.path().is_file() => fs::read(self.path())?,
            _ => Vec::new(),
        };
        debug!("opened {} for {:?} ({} bytes)", self.url, access, data.len());
        Ok(self.buffer.insert(Cursor::new(data)))
    }

    fn flush(&mut self, _log: &Logger<'_>) -> Result<()> {
        match &self.buffer {
            Some(buffer) => Ok(fs::write(self.path(), buffer.get_ref())?),
            None => {
                debug!("flush on closed file {}", self.url);
                Ok(())
            }
        }
    }

    fn close(&mut self, log: &Logger<'_>) -> Result<()> {
        if self.buffer.is_some() {
            self.flush(log)?;
            self.buffer = None;
            log.info(&format!("File [{}] has been closed.", self.full_name()));
        } else {
            log.info(&format!("File [{}] is already closed.", self.full_name()));
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

/// A directory on the host filesystem or a UNC share.
///
/// The full name is the path as given, trailing separator included.
#[derive(Debug)]
pub struct LocalDirectory {
    url: StorageUrl,
}

impl LocalDirectory {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            url: StorageUrl::parse(path),
        }
    }

    fn path(&self) -> &Path {
        Path::new(self.url.as_str())
    }

    fn try_create(&mut self, fail_if_exists: bool) -> Result<()> {
        if self.path().is_dir() {
            if fail_if_exists {
                return Err(Error::AlreadyExists(format!(
                    "Directory [{}]",
                    self.full_name()
                )));
            }
            return Ok(());
        }
        fs::create_dir_all(self.path())?;
        Ok(())
    }

    fn try_delete(&mut self, recurse: bool, log: &Logger<'_>) -> Result<bool> {
        if self.path().is_dir() {
            if recurse {
                fs::remove_dir_all(self.path())?;
            } else {
                if fs::read_dir(self.path())?.next().is_some() {
                    return Err(Error::NotEmpty(self.full_name().to_string()));
                }
                fs::remove_dir(self.path())?;
            }
        }
        log.info(&format!("Directory [{}] was deleted.", self.full_name()));
        Ok(true)
    }

    /// Child names whose file type satisfies `keep`, sorted.
    fn children(&self, keep: impl Fn(&fs::FileType) -> bool) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.path())? {
            let entry = entry?;
            if keep(&entry.file_type()?) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

impl Entry for LocalDirectory {
    fn url(&self) -> &StorageUrl {
        &self.url
    }
}

impl StorageDirectory for LocalDirectory {
    type File = LocalFile;

    fn exists(&self) -> Result<bool> {
        Ok(self.path().is_dir())
    }

    fn create(&mut self, fail_if_exists: bool, log: &Logger<'_>) -> Result<&mut Self> {
        report(self.try_create(fail_if_exists), log)?;
        log.info(&format!("Directory [{}] was created.", self.full_name()));
        Ok(self)
    }

    fn delete(&mut self, recurse: bool, stop_on_error: bool, log: &Logger<'_>) -> Result<bool> {
        let outcome = self.try_delete(recurse, log);
        settle_delete(outcome, stop_on_error, log)
    }

    fn get_files(&self) -> Result<Vec<LocalFile>> {
        Ok(self
            .children(fs::FileType::is_file)?
            .iter()
            .map(|name| self.file(name))
            .collect())
    }

    fn get_directories(&self) -> Result<Vec<LocalDirectory>> {
        Ok(self
            .children(fs::FileType::is_dir)?
            .iter()
            .map(|name| self.directory(name))
            .collect())
    }

    fn path_combine(&self, paths: &[&str]) -> String {
        combine_local(paths)
    }

    fn file_at(&self, url: &str) -> LocalFile {
        LocalFile::new(url)
    }

    fn directory_at(&self, url: &str) -> LocalDirectory {
        LocalDirectory::new(url)
    }
}
