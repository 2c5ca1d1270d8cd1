//! Federated identity provider adapter.
//!
//! [`FederatedAuthAdapter`] wraps an optional [`FederatedProvider`] and fans
//! identity changes out to subscribers. Every subscriber receives the
//! provider's initial state exactly once, then one call per change.

use crate::{ProviderError, ProviderResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the identity change channel.
const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Identity asserted by the federated provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedIdentity {
    /// Provider-assigned user id.
    pub uid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Contract consumed from a federated identity provider SDK.
///
/// The interactive flow behind `sign_in` is opaque; it may wait on the user
/// indefinitely and only resolves on completion or failure.
#[async_trait]
pub trait FederatedProvider: Send + Sync {
    /// Short provider name, e.g. "google".
    fn name(&self) -> &str;

    /// Run the interactive sign-in flow.
    async fn sign_in(&self) -> ProviderResult<FederatedIdentity>;

    /// Sign the current user out of the provider.
    async fn sign_out(&self) -> ProviderResult<()>;

    /// Identity persisted by the provider from a previous run, if any.
    async fn restore(&self) -> ProviderResult<Option<FederatedIdentity>> {
        Ok(None)
    }
}

/// Whether a federated provider is available.
#[derive(Clone)]
pub enum ProviderConfig {
    Configured(Arc<dyn FederatedProvider>),
    Unconfigured,
}

impl ProviderConfig {
    fn provider(&self) -> Option<Arc<dyn FederatedProvider>> {
        match self {
            ProviderConfig::Configured(provider) => Some(provider.clone()),
            ProviderConfig::Unconfigured => None,
        }
    }
}

/// Callback invoked with the provider's current identity.
pub type IdentityCallback = Box<dyn Fn(Option<FederatedIdentity>) + Send + Sync>;

type CallbackSlot = Arc<Mutex<Option<IdentityCallback>>>;

#[derive(Default)]
struct CurrentIdentity {
    identity: Option<FederatedIdentity>,
    /// Set by the first sign-in, sign-out or external change.
    changed: bool,
}

struct AdapterState {
    current: Mutex<CurrentIdentity>,
    restored: OnceCell<()>,
    changes: broadcast::Sender<Option<FederatedIdentity>>,
}

impl AdapterState {
    fn current(&self) -> Option<FederatedIdentity> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .identity
            .clone()
    }

    fn set_current(&self, identity: Option<FederatedIdentity>) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.identity = identity.clone();
        current.changed = true;
        // Sent under the lock so channel order matches `current` order.
        let _ = self.changes.send(identity);
    }

    /// Ask the provider for a persisted identity, once per adapter.
    async fn restore_once(&self, provider: Option<Arc<dyn FederatedProvider>>) {
        self.restored
            .get_or_init(|| async move {
                let Some(provider) = provider else {
                    return;
                };
                match provider.restore().await {
                    Ok(Some(identity)) => {
                        let mut current =
                            self.current.lock().unwrap_or_else(PoisonError::into_inner);
                        // A change made while restore was pending is newer.
                        if current.changed {
                            debug!(provider = %provider.name(), "Identity changed during restore, ignoring restored identity");
                        } else {
                            info!(provider = %provider.name(), uid = %identity.uid, "Restored federated identity");
                            current.identity = Some(identity);
                        }
                    }
                    Ok(None) => debug!(provider = %provider.name(), "No federated identity to restore"),
                    Err(e) => warn!(provider = %provider.name(), error = %e, "Failed to restore federated identity"),
                }
            })
            .await;
    }
}

/// Wraps a federated provider and publishes its identity changes.
pub struct FederatedAuthAdapter {
    config: ProviderConfig,
    state: Arc<AdapterState>,
}

impl FederatedAuthAdapter {
    pub fn new(config: ProviderConfig) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            config,
            state: Arc::new(AdapterState {
                current: Mutex::new(CurrentIdentity::default()),
                restored: OnceCell::new(),
                changes,
            }),
        }
    }

    /// Adapter backed by `provider`.
    pub fn configured(provider: Arc<dyn FederatedProvider>) -> Self {
        Self::new(ProviderConfig::Configured(provider))
    }

    /// Adapter with no provider; sign-in reports [`ProviderError::NotConfigured`].
    pub fn unconfigured() -> Self {
        Self::new(ProviderConfig::Unconfigured)
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.config, ProviderConfig::Configured(_))
    }

    /// Name of the configured provider.
    pub fn provider_name(&self) -> Option<String> {
        self.config.provider().map(|p| p.name().to_string())
    }

    /// Identity as last reported by the provider.
    pub fn current_identity(&self) -> Option<FederatedIdentity> {
        self.state.current()
    }

    /// Run the provider's sign-in flow.
    ///
    /// Subscribers see the new identity only after the flow resolves.
    pub async fn sign_in(&self) -> ProviderResult<FederatedIdentity> {
        let provider = self.config.provider().ok_or(ProviderError::NotConfigured)?;

        debug!(provider = %provider.name(), "Starting federated sign-in");
        let identity = provider.sign_in().await?;

        info!(provider = %provider.name(), uid = %identity.uid, "Federated sign-in succeeded");
        self.state.set_current(Some(identity.clone()));
        Ok(identity)
    }

    /// Sign out of the provider.
    pub async fn sign_out(&self) -> ProviderResult<()> {
        let provider = self.config.provider().ok_or(ProviderError::NotConfigured)?;

        provider.sign_out().await?;

        info!(provider = %provider.name(), "Federated sign-out succeeded");
        self.state.set_current(None);
        Ok(())
    }

    /// Forward an identity change pushed by the provider SDK (token revoked,
    /// session expired elsewhere).
    pub fn publish_external_change(&self, identity: Option<FederatedIdentity>) {
        debug!(signed_in = identity.is_some(), "External federated identity change");
        self.state.set_current(identity);
    }

    /// Register `callback` for identity changes.
    ///
    /// The callback runs on a spawned task, so this must be called from
    /// within a tokio runtime. It first receives the initial identity, then
    /// every change. The callback must not drop or unsubscribe its own
    /// [`Subscription`].
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<FederatedIdentity>) + Send + Sync + 'static,
    {
        // Receiver is created before the initial read so no change is missed.
        let mut changes = self.state.changes.subscribe();
        let slot: CallbackSlot = Arc::new(Mutex::new(Some(Box::new(callback))));

        let state = self.state.clone();
        let provider = self.config.provider();
        let task_slot = slot.clone();

        let handle = tokio::spawn(async move {
            state.restore_once(provider).await;

            if !deliver(&task_slot, state.current()) {
                return;
            }

            loop {
                match changes.recv().await {
                    Ok(identity) => {
                        if !deliver(&task_slot, identity) {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Identity subscriber lagged, resyncing");
                        if !deliver(&task_slot, state.current()) {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Subscription { slot, handle }
    }
}

/// Invoke the callback if the subscription is still live.
///
/// The slot lock is held for the duration of the call, which is what makes
/// [`Subscription::unsubscribe`] wait out an in-flight delivery.
fn deliver(slot: &CallbackSlot, identity: Option<FederatedIdentity>) -> bool {
    let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
    match guard.as_ref() {
        Some(callback) => {
            callback(identity);
            true
        }
        None => false,
    }
}

/// Handle to a live identity subscription.
///
/// After [`Subscription::unsubscribe`] returns (or the handle is dropped) the
/// callback is never invoked again.
pub struct Subscription {
    slot: CallbackSlot,
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Stop deliveries. Idempotent.
    pub fn unsubscribe(&self) {
        let removed = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.handle.abort();
        if removed.is_some() {
            debug!("Identity subscription closed");
        }
    }

    pub fn is_active(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
