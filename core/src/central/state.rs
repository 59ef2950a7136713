//! Connection state reduction for the central session
//!
//! Session lifecycle events (including asynchronous remote-initiated
//! disconnects) fold into a single authoritative `ConnectionState`
//! value. The session emits `SessionEvent`s; nobody mutates the state
//! from multiple call sites. `Disconnected` is a transient pass-through
//! carrying the platform codes and immediately reduces to `Idle`.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Authoritative connection state of a central session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Bonding,
    Connecting,
    Ready,
    /// Transient: the link dropped with these platform codes
    Disconnected { status: i32, new_state: i32 },
    Error(String),
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "Idle"),
            ConnectionState::Scanning => write!(f, "Scanning"),
            ConnectionState::Bonding => write!(f, "Bonding"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Ready => write!(f, "Ready"),
            ConnectionState::Disconnected { status, new_state } => {
                write!(f, "Disconnected(status={}, newState={})", status, new_state)
            }
            ConnectionState::Error(reason) => write!(f, "Error({})", reason),
        }
    }
}

/// Lifecycle events produced by the central session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    ScanStarted,
    ScanFinished,
    BondingStarted,
    ConnectStarted,
    SessionReady,
    /// The remote end (or the platform stack) dropped the link
    RemoteDisconnected { status: i32, new_state: i32 },
    /// A connect sub-step failed
    StepFailed(String),
    /// Explicit local disconnect
    DisconnectRequested,
}

/// Fold one event into the current state. Pure; the tracker below owns
/// publication. The session drives events strictly sequentially, so the
/// next state is fully determined by the event.
pub fn reduce(_current: &ConnectionState, event: &SessionEvent) -> ConnectionState {
    match event {
        SessionEvent::ScanStarted => ConnectionState::Scanning,
        // Scan completion selects 0 or 1 devices either way; the session
        // returns the result, the state goes back to Idle
        SessionEvent::ScanFinished => ConnectionState::Idle,
        SessionEvent::BondingStarted => ConnectionState::Bonding,
        SessionEvent::ConnectStarted => ConnectionState::Connecting,
        SessionEvent::SessionReady => ConnectionState::Ready,
        SessionEvent::RemoteDisconnected { status, new_state } => ConnectionState::Disconnected {
            status: *status,
            new_state: *new_state,
        },
        SessionEvent::StepFailed(reason) => ConnectionState::Error(reason.clone()),
        // Also the way out of Error
        SessionEvent::DisconnectRequested => ConnectionState::Idle,
    }
}

/// Owns the watch channel carrying state snapshots.
pub struct StateTracker {
    tx: watch::Sender<ConnectionState>,
}

impl StateTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Idle);
        Self { tx }
    }

    /// Subscribe to state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Current state.
    pub fn current(&self) -> ConnectionState {
        self.tx.borrow().clone()
    }

    /// Apply an event and publish the result. A remote disconnect
    /// publishes the transient `Disconnected` value and then settles to
    /// `Idle`; the returned value is the settled state.
    pub fn apply(&self, event: SessionEvent) -> ConnectionState {
        let next = reduce(&self.current(), &event);
        self.tx.send_replace(next.clone());

        if matches!(next, ConnectionState::Disconnected { .. }) {
            self.tx.send_replace(ConnectionState::Idle);
            return ConnectionState::Idle;
        }
        next
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
