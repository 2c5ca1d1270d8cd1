//! Coordinator phase state machine using rust-fsm.
//!
//! Tracks which federated operation (if any) is in flight and whether the
//! coordinator has been torn down. Session contents (which identities are
//! present) live beside the machine, not in it.
//!
//! ## State Diagram
//!
//! ```text
//!         SignInStarted               LogoutRequested
//! ┌───────────┐ ◄─────── ┌────────┐ ───────► ┌────────────┐
//! │ SigningIn │          │  Idle  │          │ LoggingOut │
//! └───────────┘ ───────► └────────┘ ◄─────── └────────────┘
//!         SignInFinished     │        LogoutComplete
//!                            │ Dispose (from any state)
//!                            ▼
//!                       ┌──────────┐
//!                       │ Disposed │
//!                       └──────────┘
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Idle)

    Idle => {
        SignInStarted => SigningIn,
        LogoutRequested => LoggingOut,
        Dispose => Disposed
    },
    SigningIn => {
        SignInFinished => Idle,
        Dispose => Disposed
    },
    LoggingOut => {
        LogoutComplete => Idle,
        Dispose => Disposed
    },
    Disposed => {
        Dispose => Disposed
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Coordinator phase for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorPhase {
    /// No federated operation in flight.
    Idle,
    /// Waiting on the federated sign-in flow.
    SigningIn,
    /// Logging out.
    LoggingOut,
    /// Torn down; no further updates.
    Disposed,
}

impl From<&SessionMachineState> for CoordinatorPhase {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Idle => CoordinatorPhase::Idle,
            SessionMachineState::SigningIn => CoordinatorPhase::SigningIn,
            SessionMachineState::LoggingOut => CoordinatorPhase::LoggingOut,
            SessionMachineState::Disposed => CoordinatorPhase::Disposed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_idle() {
        let machine = SessionMachine::new();
        assert_eq!(*machine.state(), SessionMachineState::Idle);
    }

    #[test]
    fn test_sign_in_flow() {
        let mut machine = SessionMachine::new();

        machine.consume(&SessionMachineInput::SignInStarted).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::SigningIn);

        machine.consume(&SessionMachineInput::SignInFinished).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Idle);
    }

    #[test]
    fn test_concurrent_sign_in_rejected() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::SignInStarted).unwrap();

        assert!(machine.consume(&SessionMachineInput::SignInStarted).is_err());
        assert_eq!(*machine.state(), SessionMachineState::SigningIn);
    }

    #[test]
    fn test_logout_flow() {
        let mut machine = SessionMachine::new();

        machine.consume(&SessionMachineInput::LogoutRequested).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::LoggingOut);

        machine.consume(&SessionMachineInput::LogoutComplete).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Idle);
    }

    #[test]
    fn test_dispose_from_every_state_is_terminal() {
        let paths: [&[SessionMachineInput]; 3] = [
            &[],
            &[SessionMachineInput::SignInStarted],
            &[SessionMachineInput::LogoutRequested],
        ];

        for path in paths {
            let mut machine = SessionMachine::new();
            for input in path {
                machine.consume(input).unwrap();
            }
            machine.consume(&SessionMachineInput::Dispose).unwrap();
            assert_eq!(*machine.state(), SessionMachineState::Disposed);

            assert!(machine.consume(&SessionMachineInput::SignInStarted).is_err());
            assert!(machine.consume(&SessionMachineInput::LogoutRequested).is_err());
            machine.consume(&SessionMachineInput::Dispose).unwrap();
            assert_eq!(*machine.state(), SessionMachineState::Disposed);
        }
    }

    #[test]
    fn test_finish_without_start_is_invalid() {
        let mut machine = SessionMachine::new();
        assert!(machine.consume(&SessionMachineInput::SignInFinished).is_err());
        assert!(machine.consume(&SessionMachineInput::LogoutComplete).is_err());
    }

    #[test]
    fn test_phase_conversion() {
        assert_eq!(
            CoordinatorPhase::from(&SessionMachineState::Idle),
            CoordinatorPhase::Idle
        );
        assert_eq!(
            CoordinatorPhase::from(&SessionMachineState::SigningIn),
            CoordinatorPhase::SigningIn
        );
        assert_eq!(
            CoordinatorPhase::from(&SessionMachineState::LoggingOut),
            CoordinatorPhase::LoggingOut
        );
        assert_eq!(
            CoordinatorPhase::from(&SessionMachineState::Disposed),
            CoordinatorPhase::Disposed
        );
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        let json = serde_json::to_string(&CoordinatorPhase::SigningIn).unwrap();
        assert_eq!(json, "\"signing_in\"");
    }
}
