//! Transport session state machine.
//!
//! Pure transition logic, no I/O. The driver in [`client`](super) feeds it
//! triggers and acts on the returned [`Transition`].
//!
//! ```text
//!                 Start / Reconnect
//!  Disconnected ─────────────────────▶ Connecting ◀──────────┐
//!       ▲                              │        │            │ BackoffElapsed
//!       │ LinkFailed(other)   Connected│        │ConnectFailed│ / Reconnect
//!       │                              ▼        ▼            │
//!       └──────────────────────── Connected ──▶ BackingOff ──┘
//!                                   LinkFailed(reset)
//! ```

use std::fmt;

use thiserror::Error;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Idle; waits for an explicit reconnect.
    Disconnected,
    /// TCP connect in progress.
    Connecting,
    /// Link up, exchanging snapshots.
    Connected,
    /// Waiting out the backoff interval before the next attempt.
    BackingOff,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::BackingOff => "backing-off",
        };
        f.write_str(name)
    }
}

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Session task started.
    Start,
    /// Externally requested reconnect.
    Reconnect,
    /// Connect attempt succeeded.
    ConnectSucceeded,
    /// Connect attempt failed.
    ConnectFailed,
    /// Send/receive failed on an established link.
    LinkFailed {
        /// Peer forcibly closed (retry after backoff) vs. any other failure (stop).
        reset: bool,
    },
    /// Backoff interval elapsed.
    BackoffElapsed,
    /// Session is shutting down.
    Stop,
}

/// Result of applying a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the trigger.
    pub from: SessionState,
    /// State after the trigger.
    pub to: SessionState,
    /// Connection status to report, if any.
    pub status: Option<bool>,
}

impl Transition {
    /// Whether the trigger changed nothing.
    pub fn is_noop(&self) -> bool {
        self.from == self.to && self.status.is_none()
    }
}

/// A trigger that is not valid in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("trigger {trigger:?} is not valid in state {state}")]
pub struct InvalidTransition {
    /// State the machine was in.
    pub state: SessionState,
    /// Rejected trigger.
    pub trigger: Trigger,
}

/// The session state machine.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: SessionState,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    /// A machine in [`SessionState::Disconnected`].
    pub fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Apply a trigger.
    pub fn apply(&mut self, trigger: Trigger) -> Result<Transition, InvalidTransition> {
        use SessionState::*;

        let from = self.state;
        let (to, status) = match (from, trigger) {
            (_, Trigger::Stop) => (Disconnected, None),

            (Disconnected, Trigger::Start | Trigger::Reconnect) => (Connecting, None),
            // Already dialing: repeated requests collapse into the current attempt.
            (Connecting, Trigger::Reconnect) => (Connecting, None),
            // The live link is torn down; peers see it go away.
            (Connected, Trigger::Reconnect) => (Connecting, Some(false)),
            (BackingOff, Trigger::Reconnect) => (Connecting, None),

            (Connecting, Trigger::ConnectSucceeded) => (Connected, Some(true)),
            (Connecting, Trigger::ConnectFailed) => (BackingOff, Some(false)),

            (Connected, Trigger::LinkFailed { reset: true }) => (BackingOff, Some(false)),
            (Connected, Trigger::LinkFailed { reset: false }) => (Disconnected, Some(false)),

            (BackingOff, Trigger::BackoffElapsed) => (Connecting, None),

            (state, trigger) => return Err(InvalidTransition { state, trigger }),
        };

        self.state = to;
        Ok(Transition { from, to, status })
    }
}
