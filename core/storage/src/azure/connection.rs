//! Azure storage connection strings.

use unifs_common::{Error, Result, Secret};

/// Endpoint suffix of the public Azure cloud.
pub const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Which storage service a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Blob,
    File,
}

impl Service {
    fn host_label(&self) -> &'static str {
        match self {
            Service::Blob => "blob",
            Service::File => "file",
        }
    }
}

/// Parsed `Key=Value;...` storage connection string.
#[derive(Debug, Clone)]
pub struct ConnectionString {
    pub account_name: String,
    pub account_key: Option<Secret>,
    pub sas_token: Option<Secret>,
    pub protocol: String,
    pub endpoint_suffix: String,
    pub blob_endpoint: Option<String>,
    pub file_endpoint: Option<String>,
}

impl ConnectionString {
    /// Parse a connection string.
    ///
    /// # Errors
    /// - `AccountName` missing
    /// - Neither `AccountKey` nor `SharedAccessSignature` present
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parsed = Self {
            account_name: String::new(),
            account_key: None,
            sas_token: None,
            protocol: "https".to_string(),
            endpoint_suffix: DEFAULT_ENDPOINT_SUFFIX.to_string(),
            blob_endpoint: None,
            file_endpoint: None,
        };

        for pair in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            // Values (account keys in particular) may themselves contain '='.
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                Error::Config(format!("Malformed connection string segment: {}", key_only(pair)))
            })?;
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "accountname" => parsed.account_name = value.to_string(),
                "accountkey" => parsed.account_key = Some(Secret::new(value)),
                "sharedaccesssignature" => {
                    parsed.sas_token = Some(Secret::new(value.trim_start_matches('?')))
                }
                "defaultendpointsprotocol" => parsed.protocol = value.to_ascii_lowercase(),
                "endpointsuffix" => parsed.endpoint_suffix = value.to_string(),
                "blobendpoint" => parsed.blob_endpoint = Some(value.trim_end_matches('/').to_string()),
                "fileendpoint" => parsed.file_endpoint = Some(value.trim_end_matches('/').to_string()),
                _ => {}
            }
        }

        if parsed.account_name.is_empty() {
            return Err(Error::Config(
                "Connection string has no AccountName".to_string(),
            ));
        }
        if parsed.account_key.is_none() && parsed.sas_token.is_none() {
            return Err(Error::Config(
                "Connection string has neither AccountKey nor SharedAccessSignature".to_string(),
            ));
        }
        Ok(parsed)
    }

    /// Base URL of a service, without trailing slash.
    pub fn endpoint(&self, service: Service) -> String {
        let explicit = match service {
            Service::Blob => &self.blob_endpoint,
            Service::File => &self.file_endpoint,
        };
        explicit.clone().unwrap_or_else(|| {
            format!(
                "{}://{}.{}.{}",
                self.protocol,
                self.account_name,
                service.host_label(),
                self.endpoint_suffix
            )
        })
    }
}

fn key_only(pair: &str) -> &str {
    pair.split('=').next().unwrap_or(pair)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "c2VjcmV0LWtleS1mb3ItdGVzdHM=";

    #[test]
    fn test_parse_standard_connection_string() {
        let cs = ConnectionString::parse(&format!(
            "DefaultEndpointsProtocol=https;AccountName=myacct;AccountKey={};EndpointSuffix=core.windows.net",
            KEY
        ))
        .unwrap();
        assert_eq!(cs.account_name, "myacct");
        assert_eq!(cs.account_key.as_ref().map(Secret::expose), Some(KEY));
        assert_eq!(
            cs.endpoint(Service::Blob),
            "https://myacct.blob.core.windows.net"
        );
        assert_eq!(
            cs.endpoint(Service::File),
            "https://myacct.file.core.windows.net"
        );
    }

    #[test]
    fn test_parse_explicit_endpoints_and_sas() {
        let cs = ConnectionString::parse(
            "AccountName=dev;BlobEndpoint=http://127.0.0.1:10000/dev/;SharedAccessSignature=?sv=2021&sig=abc%3D",
        )
        .unwrap();
        assert_eq!(cs.endpoint(Service::Blob), "http://127.0.0.1:10000/dev");
        assert_eq!(cs.sas_token.unwrap().expose(), "sv=2021&sig=abc%3D");
        assert!(cs.account_key.is_none());
    }

    #[test]
    fn test_parse_rejects_incomplete() {
        assert!(matches!(
            ConnectionString::parse("AccountKey=abc"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ConnectionString::parse("AccountName=a"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ConnectionString::parse("AccountName"),
            Err(Error::Config(_))
        ));
    }
}
