//! Durable storage for dualsign.
//!
//! This crate provides:
//! - A [`KeyValueStorage`] abstraction with file-backed and in-memory backends
//! - [`CredentialRegistry`]: registered local identities keyed by normalized email
//! - [`SessionStore`]: the single slot holding the active local session

mod file;
mod keys;
mod memory;
mod registry;
mod session_store;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use registry::{normalize_email, CredentialRegistry, RegisteredIdentity, RegistryError};
pub use session_store::{LocalSession, SessionStore};
pub use traits::KeyValueStorage;

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Key contains characters that cannot be mapped to a storage slot
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default durable storage rooted at `dir`.
pub fn create_storage(dir: &Path) -> StorageResult<Arc<dyn KeyValueStorage>> {
    let storage = FileStorage::new(dir)?;
    Ok(Arc::new(storage))
}
