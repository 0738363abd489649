//! Client registry: the backend connections handed to every handle.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use unifs_common::{Error, Result, Secret};

use crate::aws::{AwsClient, AwsConfig};
use crate::azure::{AzureClient, AzureConfig};
use crate::blob::BlobStore;
use crate::share::ShareStore;

/// Client settings for every cloud backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientsConfig {
    #[serde(default)]
    pub aws: Option<AwsConfig>,
    #[serde(default)]
    pub azure: Option<AzureConfig>,
}

impl ClientsConfig {
    /// Parse settings from a JSON value.
    pub fn from_json(config: Value) -> Result<Self> {
        serde_json::from_value(config)
            .map_err(|e| Error::Config(format!("Invalid clients config: {}", e)))
    }

    /// Read settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{} is not JSON: {}", path.display(), e)))?;
        Self::from_json(value)
    }

    /// Settings discovered from the process environment.
    ///
    /// AWS is always present so the ambient credential chain gets a chance;
    /// Azure only when `AZURE_STORAGE_CONNECTION_STRING` is set.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let aws = AwsConfig {
            region: lookup("AWS_REGION").or_else(|| lookup("AWS_DEFAULT_REGION")),
            access_key: lookup("AWS_ACCESS_KEY_ID").map(Secret::from),
            secret_key: lookup("AWS_SECRET_ACCESS_KEY").map(Secret::from),
            endpoint: lookup("AWS_ENDPOINT_URL"),
            path_style: false,
        };
        let azure = lookup("AZURE_STORAGE_CONNECTION_STRING").map(|cs| AzureConfig {
            connection_string: Secret::from(cs),
        });
        Self {
            aws: Some(aws),
            azure,
        }
    }

    /// `<config dir>/unifs/clients.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("unifs").join("clients.json"))
    }
}

/// At most one client per backend family, shared read-only by all handles.
///
/// A missing client is not an error here; handles that need it fail with
/// `ClientNotConfigured` when first used.
#[derive(Clone, Default)]
pub struct Clients {
    aws: Option<Arc<dyn BlobStore>>,
    azure_blob: Option<Arc<dyn BlobStore>>,
    azure_share: Option<Arc<dyn ShareStore>>,
}

impl Clients {
    /// Registry with no clients.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_aws(mut self, client: Arc<dyn BlobStore>) -> Self {
        self.aws = Some(client);
        self
    }

    /// Use one client for both Azure services.
    pub fn with_azure<C>(self, client: Arc<C>) -> Self
    where
        C: BlobStore + ShareStore + 'static,
    {
        let blob: Arc<dyn BlobStore> = client.clone();
        let share: Arc<dyn ShareStore> = client;
        self.with_azure_blob(blob).with_azure_share(share)
    }

    pub fn with_azure_blob(mut self, client: Arc<dyn BlobStore>) -> Self {
        self.azure_blob = Some(client);
        self
    }

    pub fn with_azure_share(mut self, client: Arc<dyn ShareStore>) -> Self {
        self.azure_share = Some(client);
        self
    }

    /// Add an S3 client from an optional region and key pair.
    pub fn init_aws(
        self,
        region: Option<&str>,
        access_key: Option<&str>,
        secret_key: Option<&str>,
    ) -> Result<Self> {
        let client = AwsClient::init(region, access_key, secret_key)?;
        Ok(self.with_aws(Arc::new(client)))
    }

    /// Add an Azure client from a storage connection string.
    pub fn init_azure(self, connection_string: &str) -> Result<Self> {
        let client = AzureClient::from_connection_string(connection_string)?;
        Ok(self.with_azure(Arc::new(client)))
    }

    /// Build every configured client.
    ///
    /// # Errors
    /// - Explicit AWS keys or an Azure connection string that cannot be used
    ///
    /// AWS without explicit keys relies on ambient discovery. If that finds
    /// nothing the AWS slot stays empty rather than failing the whole registry.
    pub fn from_config(config: &ClientsConfig) -> Result<Self> {
        let mut clients = Self::new();

        if let Some(aws) = &config.aws {
            let explicit = aws.access_key.is_some() || aws.secret_key.is_some();
            match AwsClient::new(aws) {
                Ok(client) => {
                    info!("AWS client ready for region {}", client.region());
                    clients = clients.with_aws(Arc::new(client));
                }
                Err(e) if !explicit => warn!("AWS client not configured: {}", e),
                Err(e) => return Err(e),
            }
        }

        if let Some(azure) = &config.azure {
            let client = AzureClient::new(azure)?;
            info!("Azure client ready for account {}", client.account_name());
            clients = clients.with_azure(Arc::new(client));
        }

        Ok(clients)
    }

    pub fn aws(&self) -> Option<Arc<dyn BlobStore>> {
        self.aws.clone()
    }

    pub fn azure_blob(&self) -> Option<Arc<dyn BlobStore>> {
        self.azure_blob.clone()
    }

    pub fn azure_share(&self) -> Option<Arc<dyn ShareStore>> {
        self.azure_share.clone()
    }
}

impl fmt::Debug for Clients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clients")
            .field("aws", &self.aws.is_some())
            .field("azure_blob", &self.azure_blob.is_some())
            .field("azure_share", &self.azure_share.is_some())
            .finish()
    }
}
