//! Session coordinator.
//!
//! Merges the federated provider's live identity with the persisted local
//! session into a single [`SessionView`]. Federated identity wins when both
//! are present.

use crate::federated::{FederatedAuthAdapter, FederatedIdentity, Subscription};
use crate::session_fsm::{CoordinatorPhase, SessionMachine, SessionMachineInput, SessionMachineState};
use crate::{AuthError, AuthResult, ProviderError};
use dualsign_storage::{
    normalize_email, CredentialRegistry, LocalSession, RegisteredIdentity, SessionStore,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

/// Capacity of the user notice channel.
const NOTICE_CHANNEL_CAPACITY: usize = 32;

/// Which identity source backs the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionSource {
    Federated,
    Local,
}

/// Merged session state as seen by consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    /// True until the provider reports its initial state.
    pub initializing: bool,
    pub is_logged_in: bool,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub source: Option<SessionSource>,
}

/// Result of a local register or sign-in, shaped for a UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAuthOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> From<AuthResult<T>> for LocalAuthOutcome {
    fn from(result: AuthResult<T>) -> Self {
        match result {
            Ok(_) => Self {
                success: true,
                error: None,
            },
            Err(e) => Self {
                success: false,
                error: Some(e.user_message()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Non-fatal message the UI should surface to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserNotice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug)]
struct CoordinatorState {
    federated: Option<FederatedIdentity>,
    local: Option<LocalSession>,
    initializing: bool,
}

impl CoordinatorState {
    fn view(&self) -> SessionView {
        if let Some(identity) = &self.federated {
            return SessionView {
                initializing: self.initializing,
                is_logged_in: true,
                display_name: identity
                    .display_name
                    .clone()
                    .or_else(|| identity.email.clone()),
                email: identity.email.clone(),
                source: Some(SessionSource::Federated),
            };
        }

        match &self.local {
            Some(session) => SessionView {
                initializing: self.initializing,
                is_logged_in: true,
                display_name: Some(session.display_name.clone()),
                email: Some(session.email.clone()),
                source: Some(SessionSource::Local),
            },
            None => SessionView {
                initializing: self.initializing,
                is_logged_in: false,
                display_name: None,
                email: None,
                source: None,
            },
        }
    }
}

/// State shared with the federated subscription callback.
struct Shared {
    state: Mutex<CoordinatorState>,
    view_tx: watch::Sender<SessionView>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate state and republish the view.
    fn update<R>(&self, f: impl FnOnce(&mut CoordinatorState) -> R) -> R {
        let mut state = self.lock();
        let result = f(&mut state);
        // Published under the lock so views are observed in mutation order.
        self.view_tx.send_replace(state.view());
        result
    }

    fn apply_federated(&self, identity: Option<FederatedIdentity>) {
        self.update(|state| {
            if state.initializing {
                debug!(signed_in = identity.is_some(), "Federated provider reported initial state");
            }
            state.federated = identity;
            state.initializing = false;
        });
    }
}

/// Coordinates registration, local and federated sign-in, and logout.
///
/// Construct with [`SessionCoordinator::new`], then call
/// [`SessionCoordinator::start`] from within a tokio runtime.
pub struct SessionCoordinator {
    registry: CredentialRegistry,
    store: SessionStore,
    federated: Arc<FederatedAuthAdapter>,
    shared: Arc<Shared>,
    fsm: Mutex<SessionMachine>,
    subscription: Mutex<Option<Subscription>>,
    started: AtomicBool,
    /// Bumped by every logout; a federated flow that sees it change drops its result.
    logout_generation: AtomicU64,
    notices: broadcast::Sender<UserNotice>,
}

impl SessionCoordinator {
    pub fn new(
        registry: CredentialRegistry,
        store: SessionStore,
        federated: Arc<FederatedAuthAdapter>,
    ) -> Self {
        let initial = CoordinatorState {
            federated: None,
            local: None,
            initializing: true,
        };
        let (view_tx, _) = watch::channel(initial.view());
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);

        Self {
            registry,
            store,
            federated,
            shared: Arc::new(Shared {
                state: Mutex::new(initial),
                view_tx,
            }),
            fsm: Mutex::new(SessionMachine::new()),
            subscription: Mutex::new(None),
            started: AtomicBool::new(false),
            logout_generation: AtomicU64::new(0),
            notices,
        }
    }

    /// Restore the persisted local session and subscribe to the provider.
    ///
    /// Runs once; later calls are no-ops. Fails with
    /// [`AuthError::RuntimeUnavailable`] outside a tokio runtime because the
    /// subscription delivers on a spawned task.
    pub fn start(&self) -> AuthResult<()> {
        // Held throughout so dispose cannot interleave with subscribing.
        let fsm = self.lock_fsm();
        if *fsm.state() == SessionMachineState::Disposed {
            return Err(AuthError::Disposed);
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("Session coordinator started outside a tokio runtime");
            return Err(AuthError::RuntimeUnavailable);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Session coordinator already started");
            return Ok(());
        }

        let restored = match self.store.load() {
            Ok(session) => session.and_then(|s| self.validate_restored(s)),
            Err(e) => {
                warn!(error = %e, "Failed to load persisted session");
                None
            }
        };
        if let Some(session) = restored {
            info!(email = %session.email, "Restored local session");
            self.shared.update(|state| state.local = Some(session));
        }

        let shared = self.shared.clone();
        let subscription = self
            .federated
            .subscribe(move |identity| shared.apply_federated(identity));
        *self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(subscription);

        drop(fsm);
        info!(
            federated_configured = self.federated.is_configured(),
            "Session coordinator started"
        );
        Ok(())
    }

    /// Drop a persisted session whose email is no longer registered.
    fn validate_restored(&self, session: LocalSession) -> Option<LocalSession> {
        match self.registry.find_by_email(&session.email) {
            Ok(Some(_)) => Some(session),
            Ok(None) => {
                warn!(email = %session.email, "Discarding persisted session for unregistered email");
                if let Err(e) = self.store.clear() {
                    error!(error = %e, "Failed to clear orphaned session");
                }
                None
            }
            Err(e) => {
                warn!(error = %e, "Could not verify persisted session against registry");
                Some(session)
            }
        }
    }

    /// Current merged view.
    pub fn view(&self) -> SessionView {
        self.shared.view_tx.borrow().clone()
    }

    /// Receiver that observes every view change.
    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.shared.view_tx.subscribe()
    }

    /// Receiver for user-visible notices.
    pub fn notices(&self) -> broadcast::Receiver<UserNotice> {
        self.notices.subscribe()
    }

    pub fn phase(&self) -> CoordinatorPhase {
        CoordinatorPhase::from(self.lock_fsm().state())
    }

    pub fn is_logged_in(&self) -> bool {
        self.shared.lock().view().is_logged_in
    }

    pub fn user_name(&self) -> Option<String> {
        self.shared.lock().view().display_name
    }

    pub fn is_initializing(&self) -> bool {
        self.shared.lock().initializing
    }

    /// Whether federated sign-in is available.
    pub fn federated_configured(&self) -> bool {
        self.federated.is_configured()
    }

    /// Register a local identity and sign it in.
    pub fn register(&self, name: &str, email: &str, secret: &str) -> AuthResult<RegisteredIdentity> {
        self.ensure_live()?;

        let identity = self.registry.register(name, email, secret)?;
        let session = LocalSession {
            display_name: identity.name.clone(),
            email: identity.email.clone(),
            avatar_url: None,
        };
        self.store.save(&session)?;
        self.shared.update(|state| state.local = Some(session));

        info!(email = %identity.email, "Local registration complete, signed in");
        Ok(identity)
    }

    /// [`SessionCoordinator::register`] with the outcome shaped for a UI.
    pub fn register_local(&self, name: &str, email: &str, secret: &str) -> LocalAuthOutcome {
        let result = self.register(name, email, secret);
        if let Err(e) = &result {
            log_local_failure("register", e);
        }
        result.into()
    }

    /// Verify local credentials and sign in.
    pub fn authenticate_local(&self, email: &str, secret: &str) -> AuthResult<LocalSession> {
        self.ensure_live()?;

        let email = normalize_email(email);
        let identity = self
            .registry
            .find_by_email(&email)?
            .ok_or_else(|| AuthError::NoSuchAccount(email.clone()))?;

        if !identity.secret_matches(secret) {
            return Err(AuthError::WrongSecret);
        }

        let session = LocalSession {
            display_name: identity.name,
            email: identity.email,
            avatar_url: None,
        };
        self.store.save(&session)?;
        self.shared.update(|state| state.local = Some(session.clone()));

        info!(email = %session.email, "Local sign-in succeeded");
        Ok(session)
    }

    /// [`SessionCoordinator::authenticate_local`] with the outcome shaped for a UI.
    pub fn sign_in_local(&self, email: &str, secret: &str) -> LocalAuthOutcome {
        let result = self.authenticate_local(email, secret);
        if let Err(e) = &result {
            log_local_failure("sign_in", e);
        }
        result.into()
    }

    /// Run the federated sign-in flow.
    ///
    /// On success any local session is cleared; the registry is untouched.
    /// On failure the session state is unchanged. A logout while the flow is
    /// pending wins: the provider is signed out again and
    /// [`AuthError::SignInSuperseded`] returned.
    pub async fn sign_in_federated(&self) -> AuthResult<FederatedIdentity> {
        self.ensure_live()?;

        if !self.federated.is_configured() {
            let err = AuthError::Provider(ProviderError::NotConfigured);
            warn!("Federated sign-in requested but no provider is configured");
            self.notify(NoticeLevel::Warning, err.user_message());
            return Err(err);
        }

        self.transition(SessionMachineInput::SignInStarted)?;
        let generation = self.logout_generation.load(Ordering::SeqCst);
        let result = self.federated.sign_in().await;

        if self.transition(SessionMachineInput::SignInFinished).is_err() {
            debug!("Coordinator disposed during federated sign-in, dropping result");
            return Err(AuthError::Disposed);
        }

        if self.logout_generation.load(Ordering::SeqCst) != generation {
            if let Ok(identity) = &result {
                info!(uid = %identity.uid, "Logout during federated sign-in, discarding identity");
                if let Err(e) = self.federated.sign_out().await {
                    warn!(error = %e, "Federated sign-out after superseded sign-in failed");
                    self.federated.publish_external_change(None);
                }
                self.shared.update(|state| state.federated = None);
                return Err(AuthError::SignInSuperseded);
            }
        }

        match result {
            Ok(identity) => {
                if let Err(e) = self.store.clear() {
                    error!(error = %e, "Failed to clear local session after federated sign-in");
                }
                self.shared.update(|state| {
                    state.local = None;
                    state.federated = Some(identity.clone());
                    state.initializing = false;
                });
                info!(uid = %identity.uid, "Federated sign-in complete");
                Ok(identity)
            }
            Err(e) => {
                warn!(error = %e, "Federated sign-in failed");
                let err = AuthError::Provider(e);
                if !matches!(err, AuthError::Provider(ProviderError::Cancelled)) {
                    self.notify(NoticeLevel::Error, err.user_message());
                }
                Err(err)
            }
        }
    }

    /// Fire-and-forget federated sign-in; failures are logged and surfaced
    /// as notices.
    pub async fn sign_in_with_google(&self) {
        if let Err(e) = self.sign_in_federated().await {
            debug!(error = %e, "Google sign-in did not complete");
        }
    }

    /// Clear the local session and sign out of the provider if needed.
    ///
    /// Always leaves the view logged out, even when storage or the provider
    /// fails.
    pub async fn log_out(&self) {
        if self.ensure_live().is_err() {
            debug!("Logout ignored, coordinator disposed");
            return;
        }

        self.logout_generation.fetch_add(1, Ordering::SeqCst);
        let _ = self.transition(SessionMachineInput::LogoutRequested);

        if let Err(e) = self.store.clear() {
            error!(error = %e, "Failed to clear persisted session");
        }
        let federated_active = self.shared.update(|state| {
            state.local = None;
            state.federated.is_some()
        }) || self.federated.current_identity().is_some();

        if federated_active {
            if let Err(e) = self.federated.sign_out().await {
                warn!(error = %e, "Federated sign-out failed");
                // Supersede identity changes still queued for the subscriber.
                self.federated.publish_external_change(None);
            }
            if self.ensure_live().is_ok() {
                self.shared.update(|state| state.federated = None);
            }
        }

        let _ = self.transition(SessionMachineInput::LogoutComplete);
        info!("Logged out");
    }

    /// Tear down the provider subscription. No view updates follow.
    pub fn dispose(&self) {
        {
            let mut fsm = self.lock_fsm();
            if *fsm.state() == SessionMachineState::Disposed {
                return;
            }
            let _ = fsm.consume(&SessionMachineInput::Dispose);
        }

        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        info!("Session coordinator disposed");
    }

    fn lock_fsm(&self) -> MutexGuard<'_, SessionMachine> {
        self.fsm.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_live(&self) -> AuthResult<()> {
        if *self.lock_fsm().state() == SessionMachineState::Disposed {
            return Err(AuthError::Disposed);
        }
        Ok(())
    }

    fn transition(&self, input: SessionMachineInput) -> AuthResult<()> {
        let mut fsm = self.lock_fsm();
        let from = fsm.state().clone();
        fsm.consume(&input).map_err(|_| {
            AuthError::InvalidStateTransition(format!("{:?} from {:?}", input, from))
        })?;
        Ok(())
    }

    fn notify(&self, level: NoticeLevel, message: String) {
        // No receivers is fine.
        let _ = self.notices.send(UserNotice { level, message });
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn log_local_failure(operation: &str, err: &AuthError) {
    if err.is_credential_error() {
        debug!(operation, error = %err, "Local auth rejected");
    } else {
        error!(operation, error = %err, "Local auth failed");
    }
}
