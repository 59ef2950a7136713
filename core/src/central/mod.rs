/// Central role — scanner + GATT client
///
/// - **session**: bond → connect → discover → MTU → subscribe lifecycle,
///   command/data writes, platform callback entry points
/// - **pending**: one-shot waiter slots for the awaited GATT steps
/// - **state**: connection state reduction and publication

pub mod pending;
pub mod session;
pub mod state;

use thiserror::Error;
use uuid::Uuid;

use crate::platform::AdapterError;

pub use session::{BoundCharacteristics, CentralSession};
pub use state::{ConnectionState, SessionEvent, StateTracker};

/// The awaited sub-steps of `connect()`, named for timeout diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStep {
    Scan,
    Bond,
    Connect,
    Discover,
    Mtu,
    Subscribe,
}

impl std::fmt::Display for ConnectStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectStep::Scan => write!(f, "scan"),
            ConnectStep::Bond => write!(f, "bonding"),
            ConnectStep::Connect => write!(f, "connection"),
            ConnectStep::Discover => write!(f, "service discovery"),
            ConnectStep::Mtu => write!(f, "MTU exchange"),
            ConnectStep::Subscribe => write!(f, "notification subscription"),
        }
    }
}

/// Errors surfaced by central session operations.
#[derive(Debug, Clone, Error)]
pub enum CentralError {
    #[error("Radio is disabled")]
    RadioDisabled,

    #[error("Timed out waiting for {step}")]
    Timeout { step: ConnectStep },

    #[error("Bonding failed: {0}")]
    BondingFailed(String),

    #[error("Link service not found on remote device")]
    ServiceNotFound,

    #[error("Required characteristic missing after discovery: {0}")]
    MissingCharacteristic(Uuid),

    #[error("Negotiated MTU {negotiated} cannot carry a stream block (need >= {required})")]
    MtuTooSmall { negotiated: u16, required: u16 },

    #[error("No established session")]
    NotReady,

    #[error("Connection lost")]
    ConnectionLost,

    #[error("Pending step abandoned")]
    StepInterrupted,

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}
