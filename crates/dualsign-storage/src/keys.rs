//! Storage key constants.

/// Storage keys shared with other clients of the same store.
pub struct StorageKeys;

impl StorageKeys {
    /// Registered local identities (JSON array)
    pub const REGISTERED_USERS: &'static str = "registered_users";

    /// Currently active local session (JSON object)
    pub const ACTIVE_SESSION: &'static str = "active_session";
}
