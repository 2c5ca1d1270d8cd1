//! Session coordination for dualsign.
//!
//! This crate provides:
//! - [`FederatedAuthAdapter`] wrapping an optional federated identity provider
//! - [`SessionCoordinator`] merging federated and local identities into one view
//! - Explicit FSM-based coordinator phase tracking

mod coordinator;
mod error;
mod federated;
mod session_fsm;

pub use coordinator::{
    LocalAuthOutcome, NoticeLevel, SessionCoordinator, SessionSource, SessionView, UserNotice,
};
pub use error::{AuthError, AuthResult, ProviderError, ProviderResult};
pub use federated::{
    FederatedAuthAdapter, FederatedIdentity, FederatedProvider, IdentityCallback, ProviderConfig,
    Subscription,
};
pub use session_fsm::session_machine;
pub use session_fsm::{CoordinatorPhase, SessionMachine, SessionMachineInput, SessionMachineState};
