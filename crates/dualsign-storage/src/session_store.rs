//! Single-slot storage of the active local session.

use crate::{KeyValueStorage, StorageError, StorageKeys, StorageResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// The active local session as persisted under [`StorageKeys::ACTIVE_SESSION`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalSession {
    pub display_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Durable slot holding at most one [`LocalSession`].
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Load the persisted session.
    ///
    /// A payload that fails to decode is treated as no session.
    pub fn load(&self) -> StorageResult<Option<LocalSession>> {
        let Some(json) = self.storage.get(StorageKeys::ACTIVE_SESSION)? else {
            return Ok(None);
        };

        match serde_json::from_str::<LocalSession>(&json) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(error = %e, "Active session payload is corrupt, treating as absent");
                Ok(None)
            }
        }
    }

    /// Persist `session`, replacing whatever was there.
    pub fn save(&self, session: &LocalSession) -> StorageResult<()> {
        let json = serde_json::to_string(session).map_err(StorageError::from)?;
        self.storage.set(StorageKeys::ACTIVE_SESSION, &json)?;
        debug!(email = %session.email, "Saved active local session");
        Ok(())
    }

    /// Remove the persisted session. Returns true if one existed.
    pub fn clear(&self) -> StorageResult<bool> {
        let existed = self.storage.delete(StorageKeys::ACTIVE_SESSION)?;
        if existed {
            debug!("Cleared active local session");
        }
        Ok(existed)
    }
}
