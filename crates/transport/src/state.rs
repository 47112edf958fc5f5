//! Per-direction session state machine (§4.5): `New → Handshaking → Active
//! → Rotating → Active' → … → Closed`. `Active'` is represented as `Active`
//! again — the state machine has no memory of "how many times rotated",
//! only whether a key schedule currently exists.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    New,
    Handshaking,
    Active,
    Rotating,
    Closed,
}

/// One edge of the state machine. `Any` transitions (MITM, local delete)
/// are checked separately by [`SessionState::close`] rather than listed
/// here for every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    ReceivedKepInit,
    LocalSendIntent,
    ReceivedKepResponse,
    KeyUpdateInit,
    KeyUpdateComplete,
}

impl SessionState {
    /// Apply `transition`, returning the resulting state or `None` if the
    /// edge doesn't exist from the current state (the caller treats `None`
    /// as a no-op / protocol error, never a panic).
    pub fn apply(self, transition: Transition) -> Option<SessionState> {
        use SessionState::*;
        use Transition::*;
        match (self, transition) {
            (New, ReceivedKepInit) | (New, LocalSendIntent) => Some(Handshaking),
            (Handshaking, ReceivedKepResponse) => Some(Active),
            (Active, KeyUpdateInit) => Some(Rotating),
            (Rotating, KeyUpdateComplete) => Some(Active),
            _ => None,
        }
    }

    /// The `Any → Closed` edge: fires on `MITMDetected` or local delete
    /// regardless of current state. Envelopes arriving for a `Closed`
    /// session are dropped by the caller before reaching this module.
    pub fn close(self) -> SessionState {
        SessionState::Closed
    }

    pub fn is_closed(self) -> bool {
        matches!(self, SessionState::Closed)
    }
}
