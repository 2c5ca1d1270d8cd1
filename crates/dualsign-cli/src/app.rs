//! Command implementations.
//!
//! Every command opens a coordinator over the on-disk storage, waits for the
//! provider's initial state, runs once and prints a JSON result to stdout.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use dualsign_config::{Config, Paths};
use dualsign_session::{
    CoordinatorPhase, FederatedAuthAdapter, LocalAuthOutcome, SessionCoordinator, SessionView,
};
use dualsign_storage::{create_storage, CredentialRegistry, SessionStore};
use serde::Serialize;
use tracing::{debug, warn};

/// How long to wait for the federated provider's initial state.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

type AppResult<T> = Result<T, Box<dyn Error>>;

#[derive(Serialize)]
struct StatusReport {
    #[serde(flatten)]
    view: SessionView,
    phase: CoordinatorPhase,
    federated_configured: bool,
}

/// Build the adapter described by `config`.
///
/// No interactive provider ships with the CLI, so a configured provider is
/// reported and the adapter stays unconfigured.
fn federated_adapter(config: &Config) -> FederatedAuthAdapter {
    if let Some(federated) = config.federated() {
        warn!(
            provider = %federated.provider,
            "No sign-in flow for this provider is available in the CLI, federated sign-in disabled"
        );
    }
    FederatedAuthAdapter::unconfigured()
}

/// Open and start a coordinator backed by the storage under `paths`.
pub async fn open(config: &Config, paths: &Paths) -> AppResult<SessionCoordinator> {
    paths.ensure_dirs()?;
    let storage = create_storage(&paths.storage_dir())?;

    let coordinator = SessionCoordinator::new(
        CredentialRegistry::new(storage.clone()),
        SessionStore::new(storage),
        Arc::new(federated_adapter(config)),
    );
    coordinator.start()?;

    let mut views = coordinator.watch();
    let view = tokio::time::timeout(STARTUP_TIMEOUT, views.wait_for(|view| !view.initializing))
        .await??
        .clone();
    debug!(logged_in = view.is_logged_in, "Session ready");

    Ok(coordinator)
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report(outcome: LocalAuthOutcome) -> AppResult<bool> {
    print_json(&outcome)?;
    Ok(outcome.success)
}

pub fn register(
    coordinator: &SessionCoordinator,
    name: &str,
    email: &str,
    password: &str,
) -> AppResult<bool> {
    report(coordinator.register_local(name, email, password))
}

pub fn login_local(coordinator: &SessionCoordinator, email: &str, password: &str) -> AppResult<bool> {
    report(coordinator.sign_in_local(email, password))
}

pub async fn login_federated(coordinator: &SessionCoordinator) -> AppResult<bool> {
    let mut notices = coordinator.notices();
    let outcome = LocalAuthOutcome::from(coordinator.sign_in_federated().await);

    while let Ok(notice) = notices.try_recv() {
        eprintln!("{}", notice.message);
    }
    report(outcome)
}

pub async fn logout(coordinator: &SessionCoordinator) -> AppResult<bool> {
    coordinator.log_out().await;
    print_json(&coordinator.view())?;
    Ok(true)
}

pub fn status(coordinator: &SessionCoordinator) -> AppResult<bool> {
    print_json(&StatusReport {
        view: coordinator.view(),
        phase: coordinator.phase(),
        federated_configured: coordinator.federated_configured(),
    })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn open_in(dir: &std::path::Path) -> SessionCoordinator {
        let paths = Paths::with_base_dir(dir.to_path_buf());
        open(&Config::default(), &paths).await.unwrap()
    }

    #[tokio::test]
    async fn test_session_persists_between_invocations() {
        let dir = tempdir().unwrap();

        let first = open_in(dir.path()).await;
        assert!(register(&first, "Ann", "a@x.com", "pw1").unwrap());
        first.dispose();
        drop(first);

        let second = open_in(dir.path()).await;
        assert!(second.is_logged_in());
        assert_eq!(second.user_name(), Some("Ann".to_string()));

        assert!(logout(&second).await.unwrap());
        drop(second);

        let third = open_in(dir.path()).await;
        assert!(!third.is_logged_in());
        assert!(login_local(&third, "A@X.com", "pw1").unwrap());
        assert!(!login_local(&third, "a@x.com", "nope").unwrap());
    }

    #[tokio::test]
    async fn test_federated_login_without_provider_fails() {
        let dir = tempdir().unwrap();
        let coordinator = open_in(dir.path()).await;

        assert!(!login_federated(&coordinator).await.unwrap());
        assert!(!coordinator.is_logged_in());
    }

    #[test]
    fn test_status_report_flattens_view() {
        let report = StatusReport {
            view: SessionView {
                initializing: false,
                is_logged_in: false,
                display_name: None,
                email: None,
                source: None,
            },
            phase: CoordinatorPhase::Idle,
            federated_configured: false,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["is_logged_in"], false);
        assert_eq!(json["phase"], "idle");
    }
}
