//! S3 object store client.

use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;
use serde::{Deserialize, Serialize};
use tracing::debug;

use unifs_common::{Error, Result, Secret};

use crate::blob::BlobStore;

/// Region used when neither the caller nor the environment names one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// AWS client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwsConfig {
    /// Region name, e.g. `eu-west-1`.
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub access_key: Option<Secret>,
    #[serde(default)]
    pub secret_key: Option<Secret>,
    /// Endpoint of an S3-compatible service.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`.
    #[serde(default)]
    pub path_style: bool,
}

/// Blocking S3 client shared by every AWS handle.
///
/// One client serves any number of buckets; the bucket comes from each URL.
pub struct AwsClient {
    region: Region,
    credentials: Credentials,
    path_style: bool,
}

fn s3_error(op: &str, key: &str, e: S3Error) -> Error {
    Error::Backend(format!("S3 {} of {} failed: {}", op, key, e))
}

fn status_error(op: &str, key: &str, status: u16) -> Error {
    Error::Backend(format!("S3 {} of {} returned HTTP {}", op, key, status))
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn object_path(key: &str) -> String {
    format!("/{}", key)
}

impl AwsClient {
    /// Build a client from explicit settings.
    ///
    /// # Preconditions
    /// - Access and secret key are given together or not at all
    ///
    /// # Errors
    /// - Unknown region name
    /// - No credentials found when relying on ambient discovery
    pub fn new(config: &AwsConfig) -> Result<Self> {
        let region_name = config
            .region
            .clone()
            .or_else(|| std::env::var("AWS_REGION").ok())
            .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: region_name,
                endpoint: endpoint.clone(),
            },
            None => region_name
                .parse()
                .map_err(|e| Error::Config(format!("Invalid AWS region {}: {}", region_name, e)))?,
        };

        let credentials = match (&config.access_key, &config.secret_key) {
            (Some(access), Some(secret)) => Credentials::new(
                Some(access.expose()),
                Some(secret.expose()),
                None,
                None,
                None,
            ),
            (None, None) => Credentials::new(None, None, None, None, None),
            _ => {
                return Err(Error::Config(
                    "AWS access key and secret key must be given together".to_string(),
                ))
            }
        }
        .map_err(|e| Error::Config(format!("AWS credentials unavailable: {}", e)))?;

        Ok(Self {
            region,
            credentials,
            path_style: config.path_style,
        })
    }

    /// Build a client the way callers usually do: optional region and an
    /// optional key pair, falling back to ambient discovery.
    pub fn init(
        region: Option<&str>,
        access_key: Option<&str>,
        secret_key: Option<&str>,
    ) -> Result<Self> {
        Self::new(&AwsConfig {
            region: region.map(str::to_string),
            access_key: access_key.map(Secret::from),
            secret_key: secret_key.map(Secret::from),
            ..AwsConfig::default()
        })
    }

    /// Name of the region requests go to.
    pub fn region(&self) -> String {
        self.region.to_string()
    }

    /// Run one request against `bucket`, tagging failures with `op` and `key`.
    fn request<T>(
        &self,
        bucket: &str,
        op: &str,
        key: &str,
        call: impl FnOnce(&Bucket) -> std::result::Result<T, S3Error>,
    ) -> Result<T> {
        let mut handle = Bucket::new(bucket, self.region.clone(), self.credentials.clone())
            .map_err(|e| s3_error("open", bucket, e))?;
        if self.path_style {
            handle.set_path_style();
        }
        call(&handle).map_err(|e| s3_error(op, key, e))
    }
}

impl BlobStore for AwsClient {
    fn exists(&self, container: &str, key: &str) -> Result<bool> {
        debug!("s3 head {}/{}", container, key);
        let (_, status) =
            self.request(container, "head", key, |b| b.head_object(object_path(key)))?;
        match status {
            s if is_success(s) => Ok(true),
            404 => Ok(false),
            s => Err(status_error("head", key, s)),
        }
    }

    fn get(&self, container: &str, key: &str) -> Result<Option<Vec<u8>>> {
        debug!("s3 get {}/{}", container, key);
        let response =
            self.request(container, "get", key, |b| b.get_object(object_path(key)))?;
        match response.status_code() {
            s if is_success(s) => Ok(Some(response.bytes().to_vec())),
            404 => Ok(None),
            s => Err(status_error("get", key, s)),
        }
    }

    fn put(&self, container: &str, key: &str, data: &[u8]) -> Result<()> {
        debug!("s3 put {}/{} ({} bytes)", container, key, data.len());
        let response =
            self.request(container, "put", key, |b| b.put_object(object_path(key), data))?;
        match response.status_code() {
            s if is_success(s) => Ok(()),
            s => Err(status_error("put", key, s)),
        }
    }

    fn delete(&self, container: &str, key: &str) -> Result<()> {
        debug!("s3 delete {}/{}", container, key);
        let response =
            self.request(container, "delete", key, |b| b.delete_object(object_path(key)))?;
        match response.status_code() {
            s if is_success(s) || s == 404 => Ok(()),
            s => Err(status_error("delete", key, s)),
        }
    }

    fn list(&self, container: &str, prefix: &str) -> Result<Vec<String>> {
        debug!("s3 list {}/{}", container, prefix);
        let pages = self.request(container, "list", prefix, |b| b.list(prefix.to_string(), None))?;
        Ok(pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| object.key)
            .collect())
    }
}
