//! Azure Storage client for Blob containers and File Shares.
//!
//! Reads, listings and deletes go through `opendal` operators, one per
//! container or share. Creating a share file at a declared length and
//! uploading it range by range have no operator equivalent, so those two
//! calls are raw REST requests signed with `reqsign`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{PoisonError, RwLock};

use base64::{engine::general_purpose::STANDARD, Engine};
use opendal::{services, ErrorKind, Operator};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqsign::{AzureStorageCredential, AzureStorageSigner};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use unifs_common::{Error, Result, Secret};

use super::connection::{ConnectionString, Service};
use crate::blob::BlobStore;
use crate::share::{ShareEntry, ShareStore};

/// REST API version sent with the raw File service requests.
pub const API_VERSION: &str = "2021-08-06";

/// Characters left unescaped in path segments.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Azure client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureConfig {
    pub connection_string: Secret,
}

/// Blocking client for one storage account.
///
/// Serves both the Blob and the File service; containers and shares are
/// named per call and get their operator on first use.
pub struct AzureClient {
    runtime: Runtime,
    http: Client,
    connection: ConnectionString,
    credential: AzureStorageCredential,
    signer: AzureStorageSigner,
    containers: RwLock<HashMap<String, Operator>>,
    shares: RwLock<HashMap<String, Operator>>,
}

/// Percent-encode a URL path from unencoded segments.
fn encode_path(share: &str, path: &str) -> String {
    let mut out = String::from("/");
    out.push_str(&utf8_percent_encode(share, UNRESERVED).to_string());
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(&utf8_percent_encode(segment, UNRESERVED).to_string());
    }
    out
}

/// Operator path of a file.
fn file_path(path: &str) -> &str {
    path.trim_matches('/')
}

/// Operator path of a directory; the share root is `/`.
fn dir_path(path: &str) -> String {
    match path.trim_matches('/') {
        "" => "/".to_string(),
        trimmed => format!("{}/", trimmed),
    }
}

fn failure(op: &str, target: &str, e: opendal::Error) -> Error {
    Error::Backend(format!("Azure {} of {} failed: {}", op, target, e))
}

/// Look up the operator for `name`, building it on first use.
fn cached(
    cache: &RwLock<HashMap<String, Operator>>,
    name: &str,
    build: impl FnOnce() -> opendal::Result<Operator>,
) -> Result<Operator> {
    if let Some(op) = cache
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
    {
        return Ok(op.clone());
    }
    let op = build().map_err(|e| Error::Config(format!("Azure operator for {}: {}", name, e)))?;
    cache
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(name.to_string(), op.clone());
    Ok(op)
}

impl AzureClient {
    /// Build a client from a storage connection string.
    ///
    /// Nothing is sent until the first call.
    ///
    /// # Errors
    /// - Malformed connection string
    /// - Account key that is not base64
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let connection = ConnectionString::parse(connection_string)?;
        let credential = match (&connection.account_key, &connection.sas_token) {
            (Some(key), _) => {
                let key = key.expose().trim();
                STANDARD
                    .decode(key)
                    .map_err(|e| Error::Config(format!("AccountKey is not valid base64: {}", e)))?;
                AzureStorageCredential::SharedKey(connection.account_name.clone(), key.to_string())
            }
            (None, Some(sas)) => {
                AzureStorageCredential::SharedAccessSignature(sas.expose().to_string())
            }
            (None, None) => {
                return Err(Error::Config("No Azure credential".to_string()));
            }
        };

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Config(format!("Failed to start Azure runtime: {}", e)))?;
        let http = Client::builder()
            .user_agent(concat!("unifs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            runtime,
            http,
            connection,
            credential,
            signer: AzureStorageSigner::new(),
            containers: RwLock::new(HashMap::new()),
            shares: RwLock::new(HashMap::new()),
        })
    }

    pub fn new(config: &AzureConfig) -> Result<Self> {
        Self::from_connection_string(config.connection_string.expose())
    }

    pub fn account_name(&self) -> &str {
        &self.connection.account_name
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn blob_operator(&self, container: &str) -> Result<Operator> {
        cached(&self.containers, container, || {
            let mut builder = services::Azblob::default()
                .endpoint(&self.connection.endpoint(Service::Blob))
                .account_name(&self.connection.account_name)
                .container(container)
                .root("/");
            if let Some(key) = &self.connection.account_key {
                builder = builder.account_key(key.expose());
            }
            if let Some(sas) = &self.connection.sas_token {
                builder = builder.sas_token(sas.expose());
            }
            Ok(Operator::new(builder)?.finish())
        })
    }

    fn share_operator(&self, share: &str) -> Result<Operator> {
        cached(&self.shares, share, || {
            let mut config = services::AzfileConfig {
                endpoint: Some(
                    self.connection
                        .endpoint(Service::File)
                        .trim_end_matches('/')
                        .to_string(),
                ),
                account_name: Some(self.connection.account_name.clone()),
                share_name: share.to_string(),
                root: Some("/".to_string()),
                ..Default::default()
            };
            if let Some(key) = &self.connection.account_key {
                config.account_key = Some(key.expose().to_string());
            }
            if let Some(sas) = &self.connection.sas_token {
                config.sas_token = Some(sas.expose().to_string());
            }
            Ok(Operator::from_config(config)?.finish())
        })
    }

    /// Build and sign a File service request.
    ///
    /// `Content-Length` takes part in the signature but is left off the
    /// returned headers; the HTTP client sets it from the body.
    fn signed_file_request(
        &self,
        method: Method,
        share: &str,
        path: &str,
        query: Option<&str>,
        headers: &[(&str, String)],
        content_length: usize,
    ) -> Result<http::request::Parts> {
        let mut url = format!(
            "{}{}",
            self.connection.endpoint(Service::File),
            encode_path(share, path)
        );
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }

        let mut builder = http::Request::builder()
            .method(method)
            .uri(url.as_str())
            .header("x-ms-version", API_VERSION)
            .header(CONTENT_LENGTH, content_length);
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        let mut request = builder
            .body(())
            .map_err(|e| Error::Backend(format!("Invalid request to {}: {}", url, e)))?;
        self.signer
            .sign(&mut request, &self.credential)
            .map_err(|e| Error::Backend(format!("Failed to sign request to {}: {}", url, e)))?;

        let (mut parts, ()) = request.into_parts();
        parts.headers.remove(CONTENT_LENGTH);
        Ok(parts)
    }

    fn send_file_request(&self, op: &str, parts: http::request::Parts, body: Vec<u8>) -> Result<()> {
        let target = parts.uri.path().to_string();
        debug!("azure {} {}", parts.method, target);
        let request = self
            .http
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers)
            .body(body);

        self.block_on(async {
            let response = request.send().await.map_err(|e| {
                Error::Backend(format!("Azure request to {} failed: {}", target, e))
            })?;
            let status = response.status();
            if status.is_success() {
                return Ok(());
            }
            let body = response.text().await.unwrap_or_default();
            Err(Error::Backend(format!(
                "Azure {} of {} failed: {} - {}",
                op, target, status, body
            )))
        })
    }
}

impl std::fmt::Debug for AzureClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureClient")
            .field("account", &self.connection.account_name)
            .finish_non_exhaustive()
    }
}

impl BlobStore for AzureClient {
    fn exists(&self, container: &str, key: &str) -> Result<bool> {
        let op = self.blob_operator(container)?;
        match self.block_on(async { op.stat(key).await }) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(failure("lookup", key, e)),
        }
    }

    fn get(&self, container: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let op = self.blob_operator(container)?;
        match self.block_on(async { op.read(key).await }) {
            Ok(buffer) => Ok(Some(buffer.to_vec())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(failure("download", key, e)),
        }
    }

    fn put(&self, container: &str, key: &str, data: &[u8]) -> Result<()> {
        if BlobStore::exists(self, container, key)? {
            BlobStore::delete(self, container, key)?;
        }
        let op = self.blob_operator(container)?;
        self.block_on(async { op.write(key, data.to_vec()).await })
            .map(|_| ())
            .map_err(|e| failure("upload", key, e))
    }

    fn delete(&self, container: &str, key: &str) -> Result<()> {
        let op = self.blob_operator(container)?;
        self.block_on(async { op.delete(key).await })
            .map_err(|e| failure("delete", key, e))
    }

    fn list(&self, container: &str, prefix: &str) -> Result<Vec<String>> {
        let op = self.blob_operator(container)?;
        let path = if prefix.is_empty() { "/" } else { prefix };
        let entries = self
            .block_on(async { op.list_with(path).recursive(true).await })
            .map_err(|e| failure("list", path, e))?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.metadata().is_file())
            .map(|entry| entry.path().to_string())
            .collect())
    }
}

impl ShareStore for AzureClient {
    fn file_length(&self, share: &str, path: &str) -> Result<Option<u64>> {
        let op = self.share_operator(share)?;
        match self.block_on(async { op.stat(file_path(path)).await }) {
            Ok(meta) if meta.is_file() => Ok(Some(meta.content_length())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(failure("lookup", path, e)),
        }
    }

    fn read_file(&self, share: &str, path: &str) -> Result<Vec<u8>> {
        let op = self.share_operator(share)?;
        match self.block_on(async { op.read(file_path(path)).await }) {
            Ok(buffer) => Ok(buffer.to_vec()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::NotFound(format!("{}/{}", share, file_path(path))))
            }
            Err(e) => Err(failure("download", path, e)),
        }
    }

    fn create_file(&self, share: &str, path: &str, length: u64) -> Result<()> {
        let headers = [
            ("x-ms-type", "file".to_string()),
            ("x-ms-content-length", length.to_string()),
            ("x-ms-file-permission", "inherit".to_string()),
            ("x-ms-file-attributes", "None".to_string()),
            ("x-ms-file-creation-time", "now".to_string()),
            ("x-ms-file-last-write-time", "now".to_string()),
        ];
        let parts = self.signed_file_request(Method::PUT, share, path, None, &headers, 0)?;
        self.send_file_request("create", parts, Vec::new())
    }

    fn write_range(&self, share: &str, path: &str, offset: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let end = offset + data.len() as u64 - 1;
        let headers = [
            ("x-ms-range", format!("bytes={}-{}", offset, end)),
            ("x-ms-write", "update".to_string()),
        ];
        let parts = self.signed_file_request(
            Method::PUT,
            share,
            path,
            Some("comp=range"),
            &headers,
            data.len(),
        )?;
        self.send_file_request("upload range", parts, data.to_vec())
    }

    fn delete_file(&self, share: &str, path: &str) -> Result<()> {
        let op = self.share_operator(share)?;
        self.block_on(async { op.delete(file_path(path)).await })
            .map_err(|e| failure("delete", path, e))
    }

    fn dir_exists(&self, share: &str, path: &str) -> Result<bool> {
        let op = self.share_operator(share)?;
        let dir = dir_path(path);
        match self.block_on(async { op.stat(&dir).await }) {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(failure("lookup", &dir, e)),
        }
    }

    fn create_dir(&self, share: &str, path: &str) -> Result<()> {
        let op = self.share_operator(share)?;
        let dir = dir_path(path);
        self.block_on(async { op.create_dir(&dir).await })
            .map_err(|e| failure("create directory", &dir, e))
    }

    fn delete_dir(&self, share: &str, path: &str) -> Result<()> {
        if !self.list_dir(share, path)?.is_empty() {
            return Err(Error::NotEmpty(format!("{}/{}", share, file_path(path))));
        }
        let op = self.share_operator(share)?;
        let dir = dir_path(path);
        self.block_on(async { op.delete(&dir).await })
            .map_err(|e| failure("delete directory", &dir, e))
    }

    fn list_dir(&self, share: &str, path: &str) -> Result<Vec<ShareEntry>> {
        let op = self.share_operator(share)?;
        let dir = dir_path(path);
        let entries = self
            .block_on(async { op.list(&dir).await })
            .map_err(|e| failure("list", &dir, e))?;
        Ok(entries
            .into_iter()
            // Listings may include the directory itself.
            .filter(|entry| entry.path().trim_start_matches('/') != dir.trim_start_matches('/'))
            .map(|entry| ShareEntry {
                name: entry.name().trim_end_matches('/').to_string(),
                is_directory: entry.metadata().is_dir(),
            })
            .collect())
    }
}
