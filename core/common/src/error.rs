//! Common error types for unifs.

use thiserror::Error;

/// Top-level error type for unifs operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A backend client is required but none was configured.
    #[error("{0} client not configured")]
    ClientNotConfigured(String),

    /// The URL could not be classified at the point a handle was needed.
    #[error("Url [{0}] is not a known type")]
    UnknownUrlType(String),

    /// Create-time guard: the object is already present.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The object an operation reads from is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Non-recursive delete on a populated directory.
    #[error("Directory [{0}] is not empty")]
    NotEmpty(String),

    /// A cloud storage call failed.
    #[error("Backend error: {0}")]
    Backend(String),

    /// A local or network filesystem call failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Client configuration could not be used.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::ClientNotConfigured("Azure".to_string()).to_string(),
            "Azure client not configured"
        );
        assert_eq!(
            Error::NotEmpty("s3://b/dir/".to_string()).to_string(),
            "Directory [s3://b/dir/] is not empty"
        );
        assert_eq!(
            Error::UnknownUrlType(String::new()).to_string(),
            "Url [] is not a known type"
        );
    }

    #[test]
    fn test_io_error_converts() {
        let err: Error = std::io::Error::other("disk gone").into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.to_string(), "I/O error: disk gone");
    }
}
