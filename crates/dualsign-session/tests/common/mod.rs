#![allow(dead_code)]

use async_trait::async_trait;
use dualsign_session::{
    FederatedAuthAdapter, FederatedIdentity, FederatedProvider, ProviderError, ProviderResult,
    SessionCoordinator, SessionView,
};
use dualsign_storage::{CredentialRegistry, KeyValueStorage, MemoryStorage, SessionStore};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Scriptable federated provider.
#[derive(Default)]
pub struct MockProvider {
    sign_in_results: Mutex<VecDeque<ProviderResult<FederatedIdentity>>>,
    sign_out_result: Mutex<Option<ProviderError>>,
    restored: Mutex<Option<FederatedIdentity>>,
    sign_in_gate: Option<Arc<Notify>>,
    restore_gate: Option<Arc<Notify>>,
    pub sign_in_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next `sign_in` call.
    pub fn push_sign_in(&self, result: ProviderResult<FederatedIdentity>) {
        self.sign_in_results.lock().unwrap().push_back(result);
    }

    pub fn fail_sign_out(&self, err: ProviderError) {
        *self.sign_out_result.lock().unwrap() = Some(err);
    }

    pub fn with_restored(self, identity: FederatedIdentity) -> Self {
        *self.restored.lock().unwrap() = Some(identity);
        self
    }

    /// `sign_in` waits on `gate` before resolving.
    pub fn with_sign_in_gate(mut self, gate: Arc<Notify>) -> Self {
        self.sign_in_gate = Some(gate);
        self
    }

    /// `restore` waits on `gate` before resolving.
    pub fn with_restore_gate(mut self, gate: Arc<Notify>) -> Self {
        self.restore_gate = Some(gate);
        self
    }

    pub fn sign_in_count(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_count(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FederatedProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn sign_in(&self) -> ProviderResult<FederatedIdentity> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.sign_in_gate {
            gate.notified().await;
        }
        self.sign_in_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::OperationFailed("no scripted result".to_string())))
    }

    async fn sign_out(&self) -> ProviderResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        match self.sign_out_result.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn restore(&self) -> ProviderResult<Option<FederatedIdentity>> {
        if let Some(gate) = &self.restore_gate {
            gate.notified().await;
        }
        Ok(self.restored.lock().unwrap().clone())
    }
}

pub fn identity(uid: &str, name: &str, email: &str) -> FederatedIdentity {
    FederatedIdentity {
        uid: uid.to_string(),
        display_name: Some(name.to_string()),
        email: Some(email.to_string()),
        avatar_url: Some(format!("https://avatars.example.com/{}.png", uid)),
    }
}

/// Everything a coordinator test needs to poke at.
pub struct Harness {
    pub storage: Arc<dyn KeyValueStorage>,
    pub registry: CredentialRegistry,
    pub store: SessionStore,
    pub adapter: Arc<FederatedAuthAdapter>,
    pub coordinator: Arc<SessionCoordinator>,
}

impl Harness {
    pub fn new(adapter: FederatedAuthAdapter) -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new()), adapter)
    }

    pub fn with_storage(storage: Arc<dyn KeyValueStorage>, adapter: FederatedAuthAdapter) -> Self {
        let registry = CredentialRegistry::new(storage.clone());
        let store = SessionStore::new(storage.clone());
        let adapter = Arc::new(adapter);
        let coordinator = Arc::new(SessionCoordinator::new(
            registry.clone(),
            store.clone(),
            adapter.clone(),
        ));
        Self {
            storage,
            registry,
            store,
            adapter,
            coordinator,
        }
    }

    pub fn unconfigured() -> Self {
        Self::new(FederatedAuthAdapter::unconfigured())
    }

    pub fn with_provider(provider: Arc<MockProvider>) -> Self {
        Self::new(FederatedAuthAdapter::configured(provider))
    }

    /// Start the coordinator and wait for the provider's initial state.
    pub async fn start(&self) -> SessionView {
        self.coordinator.start().unwrap();
        let mut rx = self.coordinator.watch();
        wait_for_view(&mut rx, |view| !view.initializing).await
    }
}

pub async fn wait_for_view<F>(rx: &mut watch::Receiver<SessionView>, predicate: F) -> SessionView
where
    F: FnMut(&SessionView) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for session view")
        .expect("session view channel closed")
        .clone()
}

/// Give spawned tasks a chance to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}
