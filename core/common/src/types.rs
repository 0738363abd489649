//! URL classification and the parsed storage URL.
//!
//! The kind of object a URL names is decided purely by syntax: a URL that
//! ends in `/` or `\` is a directory, anything else is a file. No backend is
//! ever consulted to disambiguate.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Scheme token that selects the AWS object store.
const S3_SCHEME: &str = "s3://";

/// UNC prefix that selects the network backend.
const UNC_PREFIX: &str = r"\\";

/// Storage account, service, endpoint suffix, container/share, key.
static AZURE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^https://([^./]+)\.(blob|file)\.([^/]+)/([^/]+)/(.*)$")
        .expect("azure url pattern is valid")
});

/// Concrete storage system a URL resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Host filesystem path.
    Local,
    /// UNC path; served by the local backend.
    Network,
    /// AWS S3 bucket.
    Aws,
    /// Azure Blob container.
    AzureBlob,
    /// Azure File Share.
    AzureShare,
    /// Not classifiable; fails when a handle is materialized.
    Unknown,
}

impl Backend {
    /// Name of the client family this backend needs, if any.
    pub fn client_family(&self) -> Option<&'static str> {
        match self {
            Backend::Aws => Some("Aws"),
            Backend::AzureBlob | Backend::AzureShare => Some("Azure"),
            _ => None,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Backend::Local => "Local",
            Backend::Network => "Network",
            Backend::Aws => "AwsS3",
            Backend::AzureBlob => "AzureBlob",
            Backend::AzureShare => "AzureShare",
            Backend::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// File or directory, by the trailing-separator rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    File,
    Directory,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::File => f.write_str("File"),
            Kind::Directory => f.write_str("Directory"),
        }
    }
}

/// Whether `url` names a directory (ends in `/` or `\`).
pub fn is_directory(url: &str) -> bool {
    url.ends_with('/') || url.ends_with('\\')
}

/// Whether `url` names a file.
pub fn is_file(url: &str) -> bool {
    !is_directory(url)
}

/// Classify a URL into its backend and kind.
pub fn classify(url: &str) -> (Backend, Kind) {
    let kind = if is_directory(url) {
        Kind::Directory
    } else {
        Kind::File
    };

    let backend = if url.trim().is_empty() {
        Backend::Unknown
    } else if starts_with_ignore_case(url, S3_SCHEME) {
        Backend::Aws
    } else if let Some(caps) = AZURE_URL.captures(url) {
        if caps[2].eq_ignore_ascii_case("blob") {
            Backend::AzureBlob
        } else {
            Backend::AzureShare
        }
    } else if url.starts_with(UNC_PREFIX) {
        Backend::Network
    } else {
        Backend::Local
    };

    (backend, kind)
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn is_sep(c: char) -> bool {
    c == '/' || c == '\\'
}

/// A URL decomposed into the fields the backends need.
///
/// Parsing never fails. Fields that cannot be derived from a malformed URL
/// are left unset and the failure surfaces in whichever operation needs them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageUrl {
    raw: String,
    backend: Backend,
    kind: Kind,
    /// Azure storage account.
    account: Option<String>,
    /// Bucket, container or share.
    container: Option<String>,
    /// Object key or share path, relative to the container.
    key: Option<String>,
    /// URL prefix up to and including the container separator.
    root: Option<String>,
}

impl StorageUrl {
    /// Parse a URL string.
    pub fn parse(url: impl Into<String>) -> Self {
        let raw = url.into();
        let (backend, kind) = classify(&raw);
        let mut parsed = Self {
            raw,
            backend,
            kind,
            account: None,
            container: None,
            key: None,
            root: None,
        };

        match backend {
            Backend::Aws => parsed.parse_s3(),
            Backend::AzureBlob | Backend::AzureShare => parsed.parse_azure(),
            Backend::Local | Backend::Network => parsed.root = local_root(&parsed.raw),
            Backend::Unknown => {}
        }

        parsed
    }

    fn parse_s3(&mut self) {
        let rest = &self.raw[S3_SCHEME.len()..];
        let (bucket, key) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i + 1..]),
            None => (rest, ""),
        };
        if bucket.is_empty() {
            return;
        }
        self.container = Some(bucket.to_string());
        self.key = Some(key.to_string());
        self.root = Some(format!("{}{}/", &self.raw[..S3_SCHEME.len()], bucket));
    }

    fn parse_azure(&mut self) {
        let Some(caps) = AZURE_URL.captures(&self.raw) else {
            return;
        };
        self.account = Some(caps[1].to_string());
        self.container = Some(caps[4].to_string());
        if let Some(key) = caps.get(5) {
            self.key = Some(key.as_str().to_string());
            self.root = Some(self.raw[..key.start()].to_string());
        }
    }

    /// The URL as given.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn is_directory(&self) -> bool {
        self.kind == Kind::Directory
    }

    /// Azure storage account name.
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// Bucket, container or share name.
    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    /// Key or path within the container. Directories keep their trailing `/`.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Path separator used when building child URLs.
    pub fn separator(&self) -> char {
        match self.backend {
            Backend::Network => '\\',
            Backend::Local => {
                if self.raw.contains('/') {
                    '/'
                } else if self.raw.contains('\\') {
                    '\\'
                } else {
                    std::path::MAIN_SEPARATOR
                }
            }
            _ => '/',
        }
    }

    /// Root of the namespace: `s3://bucket/`, the container URL, `/`,
    /// a drive, or `\\server\share\`.
    pub fn root(&self) -> Option<String> {
        self.root.clone()
    }

    /// Last path segment, without any trailing separator.
    pub fn name(&self) -> Option<String> {
        match self.backend {
            Backend::Aws | Backend::AzureBlob | Backend::AzureShare => self
                .key
                .as_deref()?
                .split('/')
                .filter(|s| !s.is_empty())
                .last()
                .map(str::to_string),
            Backend::Local | Backend::Network => {
                let prefix = self.root.as_deref().unwrap_or("");
                self.raw
                    .get(prefix.len()..)
                    .unwrap_or("")
                    .split(is_sep)
                    .filter(|s| !s.is_empty())
                    .last()
                    .map(str::to_string)
            }
            Backend::Unknown => None,
        }
    }

    /// Parent directory URL, always ending in a separator.
    pub fn parent(&self) -> Option<String> {
        match self.backend {
            Backend::Aws | Backend::AzureBlob | Backend::AzureShare => {
                let root = self.root.as_deref()?;
                let parts: Vec<&str> = self
                    .key
                    .as_deref()?
                    .split('/')
                    .filter(|s| !s.is_empty())
                    .collect();
                match parts.len() {
                    0 => None,
                    1 => Some(root.to_string()),
                    n => Some(format!("{}{}/", root, parts[..n - 1].join("/"))),
                }
            }
            Backend::Local | Backend::Network => {
                let prefix = self.root.as_deref().unwrap_or("");
                let rest = self.raw.get(prefix.len()..).unwrap_or("");
                if rest.split(is_sep).all(str::is_empty) {
                    return None;
                }
                let trimmed = self.raw.trim_end_matches(is_sep);
                trimmed.rfind(is_sep).map(|i| trimmed[..=i].to_string())
            }
            Backend::Unknown => None,
        }
    }
}

impl fmt::Display for StorageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for StorageUrl {
    fn from(url: &str) -> Self {
        Self::parse(url)
    }
}

/// Root of a host or UNC path, if it has one.
fn local_root(raw: &str) -> Option<String> {
    if let Some(rest) = raw.strip_prefix(UNC_PREFIX) {
        // \\server\share\
        let mut end = UNC_PREFIX.len();
        for (n, part) in rest.split(is_sep).take(2).enumerate() {
            if part.is_empty() {
                break;
            }
            end += part.len();
            if end < raw.len() {
                end += 1;
            } else if n == 0 {
                break;
            }
        }
        let mut root = raw[..end].to_string();
        if !is_directory(&root) {
            root.push('\\');
        }
        return Some(root);
    }

    let mut chars = raw.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(c), _, _) if is_sep(c) => Some(c.to_string()),
        (Some(d), Some(':'), Some(s)) if d.is_ascii_alphabetic() && is_sep(s) => {
            Some(format!("{}:{}", d, s))
        }
        (Some(d), Some(':'), _) if d.is_ascii_alphabetic() => Some(format!("{}:", d)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_classification_table() {
        assert_eq!(classify("s3://b/k"), (Backend::Aws, Kind::File));
        assert_eq!(classify("s3://b/k/"), (Backend::Aws, Kind::Directory));
        assert_eq!(
            classify("https://a.blob.core.windows.net/c/k"),
            (Backend::AzureBlob, Kind::File)
        );
        assert_eq!(
            classify("https://a.file.core.windows.net/share/path/"),
            (Backend::AzureShare, Kind::Directory)
        );
        assert_eq!(classify(r"\\srv\share\f.txt"), (Backend::Network, Kind::File));
        assert_eq!(classify("/tmp/x"), (Backend::Local, Kind::File));
        assert_eq!(classify("/tmp/x/"), (Backend::Local, Kind::Directory));
        assert_eq!(classify(r"C:\temp\"), (Backend::Local, Kind::Directory));
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        assert_eq!(classify("S3://bucket/key").0, Backend::Aws);
        assert_eq!(
            classify("HTTPS://acct.BLOB.core.windows.net/c/k").0,
            Backend::AzureBlob
        );
    }

    #[test]
    fn test_unclassifiable() {
        assert_eq!(classify("").0, Backend::Unknown);
        assert_eq!(classify("   ").0, Backend::Unknown);
        // Not an account host, so it falls through to local.
        assert_eq!(classify("https://example.com/c/k").0, Backend::Local);
    }

    #[test]
    fn test_s3_fields() {
        let url = StorageUrl::parse("s3://bucket/dir/file.txt");
        assert_eq!(url.container(), Some("bucket"));
        assert_eq!(url.key(), Some("dir/file.txt"));
        assert_eq!(url.root().as_deref(), Some("s3://bucket/"));
        assert_eq!(url.name().as_deref(), Some("file.txt"));
        assert_eq!(url.parent().as_deref(), Some("s3://bucket/dir/"));
        assert_eq!(url.account(), None);
    }

    #[test]
    fn test_s3_malformed_leaves_fields_unset() {
        let url = StorageUrl::parse("s3://");
        assert_eq!(url.backend(), Backend::Aws);
        assert_eq!(url.container(), None);
        assert_eq!(url.key(), None);
        assert_eq!(url.name(), None);
        assert_eq!(url.parent(), None);
    }

    #[test]
    fn test_azure_fields() {
        let url = StorageUrl::parse("https://acct.file.core.windows.net/share/a/b/");
        assert_eq!(url.backend(), Backend::AzureShare);
        assert_eq!(url.account(), Some("acct"));
        assert_eq!(url.container(), Some("share"));
        assert_eq!(url.key(), Some("a/b/"));
        assert_eq!(
            url.root().as_deref(),
            Some("https://acct.file.core.windows.net/share/")
        );
        assert_eq!(url.name().as_deref(), Some("b"));
        assert_eq!(
            url.parent().as_deref(),
            Some("https://acct.file.core.windows.net/share/a/")
        );
    }

    #[test]
    fn test_azure_container_root() {
        let url = StorageUrl::parse("https://acct.blob.core.windows.net/c/");
        assert_eq!(url.key(), Some(""));
        assert_eq!(url.name(), None);
        assert_eq!(url.parent(), None);
        assert!(url.is_directory());
    }

    #[test]
    fn test_local_identity() {
        let file = StorageUrl::parse("/Users/x/test.txt");
        assert_eq!(file.root().as_deref(), Some("/"));
        assert_eq!(file.name().as_deref(), Some("test.txt"));
        assert_eq!(file.parent().as_deref(), Some("/Users/x/"));

        let dir = StorageUrl::parse("/Users/x/");
        assert_eq!(dir.name().as_deref(), Some("x"));
        assert_eq!(dir.parent().as_deref(), Some("/Users/"));

        let root = StorageUrl::parse("/");
        assert_eq!(root.name(), None);
        assert_eq!(root.parent(), None);
    }

    #[test]
    fn test_network_identity() {
        let url = StorageUrl::parse(r"\\server\share$\dir\test.txt");
        assert_eq!(url.backend(), Backend::Network);
        assert_eq!(url.root().as_deref(), Some(r"\\server\share$\"));
        assert_eq!(url.name().as_deref(), Some("test.txt"));
        assert_eq!(url.parent().as_deref(), Some(r"\\server\share$\dir\"));
        assert_eq!(url.separator(), '\\');

        let share = StorageUrl::parse(r"\\server\share$\");
        assert_eq!(share.root().as_deref(), Some(r"\\server\share$\"));
        assert_eq!(share.parent(), None);
    }

    #[test]
    fn test_drive_identity() {
        let url = StorageUrl::parse(r"C:\temp\a.txt");
        assert_eq!(url.root().as_deref(), Some(r"C:\"));
        assert_eq!(url.parent().as_deref(), Some(r"C:\temp\"));
        assert_eq!(url.separator(), '\\');
    }

    #[test]
    fn test_relative_local_has_no_root() {
        let url = StorageUrl::parse("notes/today.txt");
        assert_eq!(url.root(), None);
        assert_eq!(url.parent().as_deref(), Some("notes/"));
        assert_eq!(StorageUrl::parse("today.txt").parent(), None);
    }

    #[test]
    fn test_backend_serialization() {
        assert_eq!(
            serde_json::to_string(&Backend::AzureShare).unwrap(),
            "\"azureshare\""
        );
        assert_eq!(serde_json::to_string(&Kind::File).unwrap(), "\"file\"");
    }

    proptest! {
        #[test]
        fn prop_trailing_separator_decides_kind(s in ".*") {
            let expected = s.ends_with('/') || s.ends_with('\\');
            prop_assert_eq!(is_directory(&s), expected);
            prop_assert_eq!(StorageUrl::parse(s.clone()).is_directory(), expected);
        }

        #[test]
        fn prop_separator_suffix_is_directory(s in ".*", sep in prop_oneof![Just('/'), Just('\\')]) {
            let url = format!("{}{}", s, sep);
            prop_assert!(is_directory(&url));
            prop_assert_eq!(classify(&url).1, Kind::Directory);
        }
    }
}
