//! Credential wrapper that zeroizes on drop.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Access keys, account keys and SAS tokens.
///
/// The value is wiped from memory when dropped and never printed by `Debug`.
#[derive(Clone, Zeroize, Serialize, Deserialize, PartialEq, Eq)]
#[zeroize(drop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED; {} chars])", self.0.len())
    }
}
