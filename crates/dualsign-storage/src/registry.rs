//! Registry of locally registered identities.
//!
//! Persisted under [`StorageKeys::REGISTERED_USERS`] as a JSON array of
//! `{ name, email, secret }`. Secrets are stored and compared verbatim; see
//! DESIGN.md for the open hashing issue.

use crate::{KeyValueStorage, StorageError, StorageKeys, StorageResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A locally registered identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredIdentity {
    pub name: String,
    pub email: String,
    pub secret: String,
}

impl RegisteredIdentity {
    /// Exact comparison against the stored secret.
    pub fn secret_matches(&self, candidate: &str) -> bool {
        self.secret == candidate
    }
}

impl fmt::Debug for RegisteredIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredIdentity")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Errors from registry writes.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// An identity with the same normalized email already exists
    #[error("An account with this email already exists: {0}")]
    DuplicateEmail(String),

    /// Name, email or secret was empty
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Normalize an email for uniqueness comparisons.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Durable mapping of normalized email to registered identity.
///
/// Every call reads the backing storage; nothing is cached.
#[derive(Clone)]
pub struct CredentialRegistry {
    storage: Arc<dyn KeyValueStorage>,
}

impl CredentialRegistry {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// All registered identities.
    ///
    /// A corrupt payload is logged and treated as an empty registry.
    pub fn list(&self) -> StorageResult<Vec<RegisteredIdentity>> {
        let Some(json) = self.storage.get(StorageKeys::REGISTERED_USERS)? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<RegisteredIdentity>>(&json) {
            Ok(identities) => Ok(identities),
            Err(e) => {
                warn!(error = %e, "Registered users payload is corrupt, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    /// Case-insensitive lookup by email.
    pub fn find_by_email(&self, email: &str) -> StorageResult<Option<RegisteredIdentity>> {
        let wanted = normalize_email(email);
        Ok(self
            .list()?
            .into_iter()
            .find(|identity| normalize_email(&identity.email) == wanted))
    }

    /// Register a new identity if its normalized email is not taken.
    pub fn register(
        &self,
        name: &str,
        email: &str,
        secret: &str,
    ) -> Result<RegisteredIdentity, RegistryError> {
        let name = name.trim();
        let email = normalize_email(email);

        if name.is_empty() {
            return Err(RegistryError::InvalidInput("name is required".to_string()));
        }
        if email.is_empty() {
            return Err(RegistryError::InvalidInput("email is required".to_string()));
        }
        if secret.is_empty() {
            return Err(RegistryError::InvalidInput("password is required".to_string()));
        }

        let mut identities = self.list()?;
        if identities
            .iter()
            .any(|identity| normalize_email(&identity.email) == email)
        {
            debug!(email = %email, "Registration rejected, email already registered");
            return Err(RegistryError::DuplicateEmail(email));
        }

        let identity = RegisteredIdentity {
            name: name.to_string(),
            email,
            secret: secret.to_string(),
        };
        identities.push(identity.clone());

        let json = serde_json::to_string(&identities).map_err(StorageError::from)?;
        self.storage.set(StorageKeys::REGISTERED_USERS, &json)?;

        info!(email = %identity.email, "Registered local identity");
        Ok(identity)
    }
}
