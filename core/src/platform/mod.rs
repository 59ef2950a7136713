// Platform BLE adapter traits
//
// The core never touches radio hardware. Platform glue (Android, Linux,
// the in-process loopback link) implements these traits for outgoing
// calls and feeds GATT callbacks back by invoking the sessions' `on_*`
// methods. Callback delivery order per connection must match the order
// the platform GATT stack produced the events; the sessions do not
// reorder.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque platform identity of a remote device (address or handle).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A device seen during scanning, with signal strength.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvertisedDevice {
    pub id: DeviceId,
    pub name: Option<String>,
    /// RSSI in dBm
    pub rssi: i16,
}

/// Platform bond state of a remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondState {
    /// No bond, and no bonding in progress
    None,
    /// Pairing in progress
    Bonding,
    /// Persistent bond established
    Bonded,
}

/// GATT write semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Acknowledged write
    WithResponse,
    /// Fire-and-forget write
    WithoutResponse,
}

/// A characteristic as seen in a service definition or discovery result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    pub descriptors: Vec<Uuid>,
}

/// A service as registered on the peripheral or discovered by the central.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicInfo>,
}

impl ServiceInfo {
    /// Find a characteristic of this service by UUID.
    pub fn characteristic(&self, uuid: Uuid) -> Option<&CharacteristicInfo> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

/// Errors surfaced by platform adapter calls.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    #[error("Radio is disabled")]
    RadioDisabled,
    #[error("Operation not supported on this platform")]
    Unsupported,
    #[error("No active GATT connection")]
    NotConnected,
    #[error("Platform operation failed: {0}")]
    OperationFailed(String),
}

/// Outgoing operations of the GATT client role.
///
/// Completion of the asynchronous GATT steps (connect, discovery, MTU,
/// descriptor writes) is reported through the `CentralSession::on_*`
/// callbacks, not through these return values; a returned `Ok(())`
/// only means the request was issued.
#[async_trait]
pub trait CentralAdapter: Send + Sync {
    /// Whether the platform radio is powered on.
    fn is_radio_enabled(&self) -> bool;

    /// Start scanning, filtered to advertisements of `service`.
    async fn start_scan(&self, service: Uuid) -> Result<(), AdapterError>;

    /// Stop an active scan. Must be safe when no scan is running.
    async fn stop_scan(&self) -> Result<(), AdapterError>;

    /// Current bond state of `device`.
    fn bond_state(&self, device: &DeviceId) -> BondState;

    /// Begin pairing with `device`; terminal outcome arrives via
    /// `on_bond_state_changed`.
    async fn create_bond(&self, device: &DeviceId) -> Result<(), AdapterError>;

    /// Open a GATT client connection to `device`.
    async fn connect_gatt(&self, device: &DeviceId) -> Result<(), AdapterError>;

    /// Start service discovery on the open connection.
    async fn discover_services(&self) -> Result<(), AdapterError>;

    /// Request an enlarged MTU; the negotiated value arrives via
    /// `on_mtu_changed`.
    async fn request_mtu(&self, mtu: u16) -> Result<(), AdapterError>;

    /// Write a characteristic value.
    async fn write_characteristic(
        &self,
        characteristic: Uuid,
        value: &[u8],
        mode: WriteMode,
    ) -> Result<(), AdapterError>;

    /// Write a descriptor value (CCCD subscription writes).
    async fn write_descriptor(
        &self,
        characteristic: Uuid,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<(), AdapterError>;

    /// Close the GATT client. Must be safe when already closed.
    async fn close_gatt(&self) -> Result<(), AdapterError>;
}

/// Outgoing operations of the GATT server role.
#[async_trait]
pub trait PeripheralAdapter: Send + Sync {
    /// Whether this platform can advertise at all.
    fn advertising_supported(&self) -> bool;

    /// Whether the platform radio is powered on.
    fn is_radio_enabled(&self) -> bool;

    /// Open the GATT server.
    async fn open_server(&self) -> Result<(), AdapterError>;

    /// Register the link service on the open server.
    async fn register_service(&self, service: &ServiceInfo) -> Result<(), AdapterError>;

    /// Begin advertising `service_uuid` under `name`.
    async fn start_advertising(&self, name: &str, service_uuid: Uuid)
        -> Result<(), AdapterError>;

    /// Stop advertising. Must be safe when not advertising.
    async fn stop_advertising(&self) -> Result<(), AdapterError>;

    /// Send a notification of `characteristic` to one subscribed device.
    async fn notify(
        &self,
        device: &DeviceId,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<(), AdapterError>;

    /// Answer a write request that asked for a response.
    async fn send_write_response(
        &self,
        device: &DeviceId,
        request_id: u32,
        success: bool,
    ) -> Result<(), AdapterError>;

    /// Force-disconnect one remote device.
    async fn disconnect_device(&self, device: &DeviceId) -> Result<(), AdapterError>;

    /// Close the GATT server. Must be safe when already closed.
    async fn close_server(&self) -> Result<(), AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_display_and_eq() {
        let a = DeviceId::new("AA:BB:CC:DD:EE:FF");
        let b = DeviceId::new("AA:BB:CC:DD:EE:FF");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(a.as_str(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_device_id_hashable() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(DeviceId::new("a"));
        set.insert(DeviceId::new("a"));
        set.insert(DeviceId::new("b"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_service_info_lookup() {
        let service = crate::protocol::service_definition();
        assert!(service.characteristic(crate::protocol::CMD_RX_UUID).is_some());
        assert!(service.characteristic(crate::protocol::SERVICE_UUID).is_none());
    }

    #[test]
    fn test_adapter_error_display() {
        let err = AdapterError::OperationFailed("advertise failed".to_string());
        assert!(err.to_string().contains("advertise failed"));
        assert_eq!(AdapterError::RadioDisabled.to_string(), "Radio is disabled");
    }
}
