//! Shared bearer token storage.

use parking_lot::RwLock;
use secrecy::SecretString;

use crate::error::{CrptError, Result};

/// Holds the current bearer token.
///
/// Replacing the token is atomic and the last writer wins. The token is
/// never inspected beyond a blank check.
#[derive(Debug, Default)]
pub struct TokenStore {
    token: RwLock<Option<SecretString>>,
}

impl TokenStore {
    /// Create an empty token store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the trimmed token.
    ///
    /// Fails with [`CrptError::InvalidArgument`] if the token is missing or
    /// blank.
    pub fn set<'a>(&self, token: impl Into<Option<&'a str>>) -> Result<()> {
        let token = token
            .into()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                CrptError::InvalidArgument("token must not be empty".to_string())
            })?;

        *self.token.write() = Some(SecretString::from(token.to_string()));
        Ok(())
    }

    /// Get the current token, if one has been set.
    pub fn get(&self) -> Option<SecretString> {
        self.token.read().clone()
    }

    pub fn is_set(&self) -> bool {
        self.token.read().is_some()
    }
}
