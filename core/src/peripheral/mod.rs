/// Peripheral role — advertiser + GATT server
///
/// - **session**: advertise/accept lifecycle, inbound command and data
///   handling, subscription tracking, outbound streaming
/// - **registry**: the connected/subscribed device sets behind one lock

pub mod registry;
pub mod session;

use thiserror::Error;

use crate::platform::AdapterError;

pub use registry::{DeviceRegistry, RegistryCounts, SubscriptionChannel};
pub use session::{PeripheralSession, PeripheralState};

/// Errors surfaced by peripheral session operations.
#[derive(Debug, Clone, Error)]
pub enum PeripheralError {
    #[error("Radio is disabled")]
    RadioDisabled,

    #[error("Peripheral already running")]
    AlreadyRunning,

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}
