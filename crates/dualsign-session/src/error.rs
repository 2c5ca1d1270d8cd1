//! Session error types.

use dualsign_storage::{RegistryError, StorageError};
use thiserror::Error;

/// Errors reported by a federated identity provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// No provider is configured for this installation
    #[error("Federated provider is not configured")]
    NotConfigured,

    /// The user dismissed the interactive flow
    #[error("Federated sign-in was cancelled")]
    Cancelled,

    /// The provider reported a failure
    #[error("Federated provider operation failed: {0}")]
    OperationFailed(String),
}

/// Result type alias using ProviderError.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Session coordinator error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Registration with an email that already has an account
    #[error("An account with this email already exists: {0}")]
    DuplicateEmail(String),

    /// Local sign-in with an unregistered email
    #[error("No account found for {0}")]
    NoSuchAccount(String),

    /// Local sign-in with the wrong password
    #[error("Wrong password")]
    WrongSecret,

    /// Missing name, email or password
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Federated provider error
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Operation not allowed in the current coordinator phase
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    /// The coordinator has been disposed
    #[error("Session coordinator has been disposed")]
    Disposed,

    /// A logout ran while the federated flow was pending
    #[error("Logged out before federated sign-in completed")]
    SignInSuperseded,

    /// Called outside a tokio runtime
    #[error("No tokio runtime available")]
    RuntimeUnavailable,

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<RegistryError> for AuthError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DuplicateEmail(email) => AuthError::DuplicateEmail(email),
            RegistryError::InvalidInput(reason) => AuthError::InvalidInput(reason),
            RegistryError::Storage(e) => AuthError::Storage(e),
        }
    }
}

impl AuthError {
    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::DuplicateEmail(_) => "An account with this email already exists".to_string(),
            AuthError::NoSuchAccount(_) => "No account found with this email".to_string(),
            AuthError::WrongSecret => "Incorrect password".to_string(),
            AuthError::InvalidInput(_) => "Name, email and password are required".to_string(),
            AuthError::Provider(ProviderError::NotConfigured) => {
                "Federated sign-in is not configured".to_string()
            }
            AuthError::Provider(ProviderError::Cancelled) => "Sign-in was cancelled".to_string(),
            AuthError::Provider(ProviderError::OperationFailed(_)) => {
                "Sign-in failed. Please try again.".to_string()
            }
            AuthError::Disposed => "Session is no longer available".to_string(),
            AuthError::SignInSuperseded => "Sign-in was cancelled".to_string(),
            AuthError::InvalidStateTransition(_)
            | AuthError::RuntimeUnavailable
            | AuthError::Storage(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }

    /// Returns true for errors caused by what the user typed.
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            AuthError::DuplicateEmail(_)
                | AuthError::NoSuchAccount(_)
                | AuthError::WrongSecret
                | AuthError::InvalidInput(_)
        )
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
