//! In-memory loopback link — both adapter traits over direct dispatch
//!
//! Wires one central session and one peripheral session back-to-back
//! with no radio underneath, mirroring how a platform GATT stack would
//! drive the sessions' callback entry points. Used by the integration
//! tests and the cli demo; the MTU cap and remote-disconnect injection
//! exist to exercise the failure paths.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::central::CentralSession;
use crate::config::{ConfigError, LinkConfig};
use crate::peripheral::PeripheralSession;
use crate::platform::{
    AdapterError, AdvertisedDevice, BondState, CentralAdapter, DeviceId, PeripheralAdapter,
    ServiceInfo, WriteMode,
};

/// Status code reported to the central when the peripheral side drops
/// the link (mirrors HCI "remote user terminated connection").
pub const REMOTE_TERMINATED_STATUS: i32 = 19;

struct LinkShared {
    central_device: DeviceId,
    peripheral_device: DeviceId,

    mtu_cap: AtomicU16,
    central_radio: AtomicBool,
    peripheral_radio: AtomicBool,
    advertising_supported: AtomicBool,

    server_open: AtomicBool,
    connected: AtomicBool,
    advertising: Mutex<Option<(String, Uuid)>>,
    registered: Mutex<Option<ServiceInfo>>,
    bonded: Mutex<HashSet<DeviceId>>,
    next_request_id: AtomicU32,

    central: RwLock<Option<Arc<CentralSession>>>,
    peripheral: RwLock<Option<Arc<PeripheralSession>>>,
}

impl LinkShared {
    fn central_session(&self) -> Option<Arc<CentralSession>> {
        self.central.read().clone()
    }

    fn peripheral_session(&self) -> Option<Arc<PeripheralSession>> {
        self.peripheral.read().clone()
    }
}

/// Central half of the loopback link.
pub struct LoopbackCentralAdapter {
    shared: Arc<LinkShared>,
}

/// Peripheral half of the loopback link.
pub struct LoopbackPeripheralAdapter {
    shared: Arc<LinkShared>,
}

#[async_trait]
impl CentralAdapter for LoopbackCentralAdapter {
    fn is_radio_enabled(&self) -> bool {
        self.shared.central_radio.load(Ordering::Acquire)
    }

    async fn start_scan(&self, service: Uuid) -> Result<(), AdapterError> {
        let advertised = self.shared.advertising.lock().clone();
        if let Some((name, advertised_service)) = advertised {
            if advertised_service == service {
                if let Some(central) = self.shared.central_session() {
                    let device = AdvertisedDevice {
                        id: self.shared.peripheral_device.clone(),
                        name: Some(name),
                        rssi: -42,
                    };
                    // Delivered off the caller's stack like a real
                    // platform scan callback
                    tokio::spawn(async move {
                        central.on_device_discovered(device);
                    });
                }
            }
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    fn bond_state(&self, device: &DeviceId) -> BondState {
        if self.shared.bonded.lock().contains(device) {
            BondState::Bonded
        } else {
            BondState::None
        }
    }

    async fn create_bond(&self, device: &DeviceId) -> Result<(), AdapterError> {
        self.shared.bonded.lock().insert(device.clone());
        if let Some(central) = self.shared.central_session() {
            tokio::spawn(async move {
                central.on_bond_state_changed(BondState::Bonded);
            });
        }
        Ok(())
    }

    async fn connect_gatt(&self, _device: &DeviceId) -> Result<(), AdapterError> {
        if !self.shared.server_open.load(Ordering::Acquire) {
            return Err(AdapterError::OperationFailed(
                "peripheral not reachable".to_string(),
            ));
        }
        self.shared.connected.store(true, Ordering::Release);

        let shared = self.shared.clone();
        tokio::spawn(async move {
            if let Some(peripheral) = shared.peripheral_session() {
                peripheral.on_device_connected(shared.central_device.clone());
            }
            if let Some(central) = shared.central_session() {
                central.on_connection_state_changed(0, true).await;
            }
        });
        Ok(())
    }

    async fn discover_services(&self) -> Result<(), AdapterError> {
        if !self.shared.connected.load(Ordering::Acquire) {
            return Err(AdapterError::NotConnected);
        }
        let services: Vec<ServiceInfo> = self.shared.registered.lock().clone().into_iter().collect();
        if let Some(central) = self.shared.central_session() {
            tokio::spawn(async move {
                central.on_services_discovered(services);
            });
        }
        Ok(())
    }

    async fn request_mtu(&self, mtu: u16) -> Result<(), AdapterError> {
        if !self.shared.connected.load(Ordering::Acquire) {
            return Err(AdapterError::NotConnected);
        }
        let negotiated = mtu.min(self.shared.mtu_cap.load(Ordering::Acquire));
        if let Some(central) = self.shared.central_session() {
            tokio::spawn(async move {
                central.on_mtu_changed(negotiated);
            });
        }
        Ok(())
    }

    async fn write_characteristic(
        &self,
        characteristic: Uuid,
        value: &[u8],
        mode: WriteMode,
    ) -> Result<(), AdapterError> {
        if !self.shared.connected.load(Ordering::Acquire) {
            return Err(AdapterError::NotConnected);
        }
        let peripheral = self
            .shared
            .peripheral_session()
            .ok_or(AdapterError::NotConnected)?;
        let request_id = self.shared.next_request_id.fetch_add(1, Ordering::AcqRel);
        peripheral
            .on_characteristic_write(
                &self.shared.central_device,
                characteristic,
                value,
                mode == WriteMode::WithResponse,
                request_id,
            )
            .await;
        Ok(())
    }

    async fn write_descriptor(
        &self,
        characteristic: Uuid,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<(), AdapterError> {
        if !self.shared.connected.load(Ordering::Acquire) {
            return Err(AdapterError::NotConnected);
        }
        let peripheral = self
            .shared
            .peripheral_session()
            .ok_or(AdapterError::NotConnected)?;
        let request_id = self.shared.next_request_id.fetch_add(1, Ordering::AcqRel);
        peripheral
            .on_descriptor_write(
                &self.shared.central_device,
                characteristic,
                descriptor,
                value,
                true,
                request_id,
            )
            .await;
        if let Some(central) = self.shared.central_session() {
            central.on_descriptor_write_completed(characteristic);
        }
        Ok(())
    }

    async fn close_gatt(&self) -> Result<(), AdapterError> {
        if self.shared.connected.swap(false, Ordering::AcqRel) {
            if let Some(peripheral) = self.shared.peripheral_session() {
                peripheral.on_device_disconnected(&self.shared.central_device);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PeripheralAdapter for LoopbackPeripheralAdapter {
    fn advertising_supported(&self) -> bool {
        self.shared.advertising_supported.load(Ordering::Acquire)
    }

    fn is_radio_enabled(&self) -> bool {
        self.shared.peripheral_radio.load(Ordering::Acquire)
    }

    async fn open_server(&self) -> Result<(), AdapterError> {
        self.shared.server_open.store(true, Ordering::Release);
        Ok(())
    }

    async fn register_service(&self, service: &ServiceInfo) -> Result<(), AdapterError> {
        *self.shared.registered.lock() = Some(service.clone());
        Ok(())
    }

    async fn start_advertising(
        &self,
        name: &str,
        service_uuid: Uuid,
    ) -> Result<(), AdapterError> {
        *self.shared.advertising.lock() = Some((name.to_string(), service_uuid));
        Ok(())
    }

    async fn stop_advertising(&self) -> Result<(), AdapterError> {
        self.shared.advertising.lock().take();
        Ok(())
    }

    async fn notify(
        &self,
        device: &DeviceId,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<(), AdapterError> {
        if !self.shared.connected.load(Ordering::Acquire)
            || device != &self.shared.central_device
        {
            return Err(AdapterError::NotConnected);
        }
        if let Some(central) = self.shared.central_session() {
            central.on_notification(characteristic, value);
        }
        Ok(())
    }

    async fn send_write_response(
        &self,
        _device: &DeviceId,
        _request_id: u32,
        _success: bool,
    ) -> Result<(), AdapterError> {
        // The central's writes do not await acknowledgement
        Ok(())
    }

    async fn disconnect_device(&self, device: &DeviceId) -> Result<(), AdapterError> {
        if device != &self.shared.central_device {
            return Err(AdapterError::NotConnected);
        }
        if self.shared.connected.swap(false, Ordering::AcqRel) {
            if let Some(central) = self.shared.central_session() {
                central
                    .on_connection_state_changed(REMOTE_TERMINATED_STATUS, false)
                    .await;
            }
        }
        Ok(())
    }

    async fn close_server(&self) -> Result<(), AdapterError> {
        self.shared.server_open.store(false, Ordering::Release);
        self.shared.advertising.lock().take();
        self.shared.registered.lock().take();
        Ok(())
    }
}

/// Handle on the shared link, exposing the test/demo knobs.
pub struct LoopbackLink {
    shared: Arc<LinkShared>,
    central_adapter: Arc<LoopbackCentralAdapter>,
    peripheral_adapter: Arc<LoopbackPeripheralAdapter>,
}

impl LoopbackLink {
    pub fn new() -> Self {
        let shared = Arc::new(LinkShared {
            central_device: DeviceId::new("loopback-central"),
            peripheral_device: DeviceId::new("loopback-peripheral"),
            mtu_cap: AtomicU16::new(247),
            central_radio: AtomicBool::new(true),
            peripheral_radio: AtomicBool::new(true),
            advertising_supported: AtomicBool::new(true),
            server_open: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            advertising: Mutex::new(None),
            registered: Mutex::new(None),
            bonded: Mutex::new(HashSet::new()),
            next_request_id: AtomicU32::new(1),
            central: RwLock::new(None),
            peripheral: RwLock::new(None),
        });
        Self {
            central_adapter: Arc::new(LoopbackCentralAdapter {
                shared: shared.clone(),
            }),
            peripheral_adapter: Arc::new(LoopbackPeripheralAdapter {
                shared: shared.clone(),
            }),
            shared,
        }
    }

    pub fn central_adapter(&self) -> Arc<LoopbackCentralAdapter> {
        self.central_adapter.clone()
    }

    pub fn peripheral_adapter(&self) -> Arc<LoopbackPeripheralAdapter> {
        self.peripheral_adapter.clone()
    }

    pub fn attach_central(&self, session: Arc<CentralSession>) {
        *self.shared.central.write() = Some(session);
    }

    pub fn attach_peripheral(&self, session: Arc<PeripheralSession>) {
        *self.shared.peripheral.write() = Some(session);
    }

    pub fn central_device_id(&self) -> DeviceId {
        self.shared.central_device.clone()
    }

    pub fn peripheral_device_id(&self) -> DeviceId {
        self.shared.peripheral_device.clone()
    }

    /// Cap the MTU the link will negotiate, regardless of the request.
    pub fn set_mtu_cap(&self, mtu: u16) {
        self.shared.mtu_cap.store(mtu, Ordering::Release);
    }

    pub fn set_central_radio(&self, enabled: bool) {
        self.shared.central_radio.store(enabled, Ordering::Release);
    }

    pub fn set_peripheral_radio(&self, enabled: bool) {
        self.shared.peripheral_radio.store(enabled, Ordering::Release);
    }

    pub fn set_advertising_supported(&self, supported: bool) {
        self.shared
            .advertising_supported
            .store(supported, Ordering::Release);
    }

    pub fn is_link_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Drop the link as if the peripheral vanished, reporting `status`
    /// to the central.
    pub async fn inject_remote_disconnect(&self, status: i32) {
        if self.shared.connected.swap(false, Ordering::AcqRel) {
            if let Some(peripheral) = self.shared.peripheral_session() {
                peripheral.on_device_disconnected(&self.shared.central_device);
            }
            if let Some(central) = self.shared.central_session() {
                central.on_connection_state_changed(status, false).await;
            }
        }
    }
}

impl Default for LoopbackLink {
    fn default() -> Self {
        Self::new()
    }
}

/// A fully wired loopback deployment: one link, one session per role.
pub struct LoopbackPair {
    pub link: LoopbackLink,
    pub central: Arc<CentralSession>,
    pub peripheral: Arc<PeripheralSession>,
}

/// Build a central/peripheral pair over a fresh loopback link.
pub fn loopback_pair(config: LinkConfig) -> Result<LoopbackPair, ConfigError> {
    let link = LoopbackLink::new();
    let central = Arc::new(CentralSession::new(link.central_adapter(), config.clone())?);
    let peripheral = Arc::new(PeripheralSession::new(link.peripheral_adapter(), config)?);
    link.attach_central(central.clone());
    link.attach_peripheral(peripheral.clone());
    Ok(LoopbackPair {
        link,
        central,
        peripheral,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_scan_sees_nothing_until_advertising() {
        let pair = loopback_pair(LinkConfig::default()).unwrap();

        let found = pair
            .central
            .scan_first(Duration::from_millis(30))
            .await
            .unwrap();
        assert!(found.is_none());

        pair.peripheral.start("GattLink Demo").await.unwrap();
        let found = pair
            .central
            .scan_first(Duration::from_millis(200))
            .await
            .unwrap()
            .expect("advertised device found");
        assert_eq!(found.id, pair.link.peripheral_device_id());
        assert_eq!(found.name.as_deref(), Some("GattLink Demo"));
    }

    #[tokio::test]
    async fn test_mtu_cap_applies() {
        let pair = loopback_pair(LinkConfig::default()).unwrap();
        pair.link.set_mtu_cap(100);
        pair.peripheral.start("GattLink Demo").await.unwrap();

        let device = pair.link.peripheral_device_id();
        let result = pair.central.connect(&device).await;
        assert!(result.is_err());
        assert!(!pair.link.is_link_connected());
    }

    #[tokio::test]
    async fn test_connect_and_teardown_flags() {
        let pair = loopback_pair(LinkConfig::default()).unwrap();
        pair.peripheral.start("GattLink Demo").await.unwrap();

        let device = pair.link.peripheral_device_id();
        pair.central.connect(&device).await.unwrap();
        assert!(pair.link.is_link_connected());

        pair.central.disconnect().await;
        assert!(!pair.link.is_link_connected());
        assert_eq!(pair.peripheral.current_state().connected_count, 0);
    }
}
