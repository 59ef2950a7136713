//! Central session — GATT client lifecycle
//!
//! Owns the single GATT client handle. `connect()` runs the full
//! sequence (bond → connect → discover → bind characteristics → MTU →
//! subscribe) with one awaited platform callback per step; any failure
//! tears the partial connection down and surfaces a typed error.
//! Platform glue delivers GATT callbacks by calling the `on_*` methods;
//! those never propagate errors back into platform code.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use super::pending::StepWaiters;
use super::state::{ConnectionState, SessionEvent, StateTracker};
use super::{CentralError, ConnectStep};
use crate::bus::{BleNotification, DisconnectEvent, EventBus};
use crate::config::{ConfigError, LinkConfig};
use crate::platform::{
    AdvertisedDevice, BondState, CentralAdapter, CharacteristicInfo, DeviceId, ServiceInfo,
    WriteMode,
};
use crate::protocol::{
    schema, Command, LinkCharacteristic, CCCD_ENABLE_NOTIFICATION, CCCD_UUID, SERVICE_UUID,
};
use crate::stream::{BlockSink, StreamController};

/// Synthetic status code recorded when the link is torn down because
/// the remote GATT database changed while the session was Ready.
pub const SERVICE_CHANGED_STATUS: i32 = -1;

/// Handles to the four link characteristics, rebound on every
/// successful connection and invalidated on any disconnect.
#[derive(Debug, Clone)]
pub struct BoundCharacteristics {
    pub cmd_rx: CharacteristicInfo,
    pub cmd_tx: CharacteristicInfo,
    pub data_rx: CharacteristicInfo,
    pub data_tx: CharacteristicInfo,
}

/// The GATT client session.
pub struct CentralSession {
    adapter: Arc<dyn CentralAdapter>,
    config: LinkConfig,
    waiters: StepWaiters,
    tracker: StateTracker,
    bus: EventBus,
    bound: RwLock<Option<BoundCharacteristics>>,
    target: RwLock<Option<DeviceId>>,
    init_in_progress: AtomicBool,
    stream: StreamController,
}

impl CentralSession {
    pub fn new(adapter: Arc<dyn CentralAdapter>, config: LinkConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            adapter,
            config,
            waiters: StepWaiters::new(),
            tracker: StateTracker::new(),
            bus: EventBus::new(),
            bound: RwLock::new(None),
            target: RwLock::new(None),
            init_in_progress: AtomicBool::new(false),
            stream: StreamController::new(),
        })
    }

    /// The session's event/log/notification bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Subscribe to connection state snapshots.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.tracker.subscribe()
    }

    /// Current connection state.
    pub fn current_state(&self) -> ConnectionState {
        self.tracker.current()
    }

    /// Whether a session is fully established.
    pub fn is_ready(&self) -> bool {
        self.current_state() == ConnectionState::Ready
    }

    /// The device of the current session attempt, if any.
    pub fn connected_device(&self) -> Option<DeviceId> {
        self.target.read().clone()
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Scan for the first peripheral advertising the link service.
    /// Returns `None` when the timeout elapses first. The underlying
    /// scan is stopped on both paths.
    pub async fn scan_first(
        &self,
        timeout: Duration,
    ) -> Result<Option<AdvertisedDevice>, CentralError> {
        if !self.adapter.is_radio_enabled() {
            return Err(CentralError::RadioDisabled);
        }

        self.tracker.apply(SessionEvent::ScanStarted);
        self.bus.log("scan: started");

        let rx = self.waiters.arm_scan();
        if let Err(e) = self.adapter.start_scan(SERVICE_UUID).await {
            self.waiters.disarm_scan();
            self.tracker.apply(SessionEvent::ScanFinished);
            return Err(e.into());
        }

        let outcome = tokio::time::timeout(timeout, rx).await;
        self.waiters.disarm_scan();

        // Stop on the found path and the timeout path alike
        if let Err(e) = self.adapter.stop_scan().await {
            self.bus.log(format!("scan: stop failed: {}", e));
        }
        self.tracker.apply(SessionEvent::ScanFinished);

        match outcome {
            Ok(Ok(Ok(device))) => {
                self.bus.log(format!(
                    "scan: found {} ({} dBm)",
                    device.id, device.rssi
                ));
                Ok(Some(device))
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(CentralError::StepInterrupted),
            Err(_) => {
                self.bus.log("scan: timeout, no device found");
                Ok(None)
            }
        }
    }

    /// Establish a full session with `device`. Only after bonding,
    /// connection, discovery, characteristic binding, MTU exchange and
    /// both CCCD subscriptions succeed does the state become `Ready`.
    pub async fn connect(&self, device: &DeviceId) -> Result<(), CentralError> {
        // Any prior session is torn down first
        self.disconnect().await;

        if !self.adapter.is_radio_enabled() {
            return Err(CentralError::RadioDisabled);
        }

        *self.target.write() = Some(device.clone());
        self.init_in_progress.store(true, Ordering::Release);
        let result = self.run_connect_sequence(device).await;
        self.init_in_progress.store(false, Ordering::Release);

        match result {
            Ok(()) => {
                self.tracker.apply(SessionEvent::SessionReady);
                self.bus.log(format!("session ready with {}", device));
                Ok(())
            }
            Err(e) => {
                self.bus.log(format!("connect failed: {}", e));
                self.teardown().await;
                self.tracker.apply(SessionEvent::StepFailed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run_connect_sequence(&self, device: &DeviceId) -> Result<(), CentralError> {
        // Bonding (skipped when a bond already exists)
        self.tracker.apply(SessionEvent::BondingStarted);
        if self.adapter.bond_state(device) == BondState::Bonded {
            self.bus.log(format!("bond: {} already bonded", device));
        } else {
            self.bus.log(format!("bond: pairing with {}", device));
            let rx = self.waiters.arm_bond();
            self.adapter.create_bond(device).await?;
            self.await_step(rx, self.config.bond_timeout(), ConnectStep::Bond)
                .await?;
        }

        // GATT connection
        self.tracker.apply(SessionEvent::ConnectStarted);
        let rx = self.waiters.arm_connect();
        self.adapter.connect_gatt(device).await?;
        self.await_step(rx, self.config.step_timeout(), ConnectStep::Connect)
            .await?;

        // Service discovery and characteristic binding
        let rx = self.waiters.arm_discover();
        self.adapter.discover_services().await?;
        let services = self
            .await_step(rx, self.config.step_timeout(), ConnectStep::Discover)
            .await?;
        let bound = resolve_characteristics(&services)?;

        // MTU check: the result must hold one block plus ATT overhead
        let rx = self.waiters.arm_mtu();
        self.adapter.request_mtu(self.config.requested_mtu).await?;
        let negotiated = self
            .await_step(rx, self.config.step_timeout(), ConnectStep::Mtu)
            .await?;
        let required = self.config.min_mtu();
        if negotiated < required {
            return Err(CentralError::MtuTooSmall {
                negotiated,
                required,
            });
        }
        self.bus.log(format!("mtu: negotiated {}", negotiated));

        // Enable notifications on both TX characteristics
        for characteristic in [&bound.cmd_tx, &bound.data_tx] {
            let rx = self.waiters.arm_descriptor();
            self.adapter
                .write_descriptor(characteristic.uuid, CCCD_UUID, &CCCD_ENABLE_NOTIFICATION)
                .await?;
            self.await_step(rx, self.config.step_timeout(), ConnectStep::Subscribe)
                .await?;
        }

        *self.bound.write() = Some(bound);
        Ok(())
    }

    async fn await_step<T>(
        &self,
        rx: oneshot::Receiver<Result<T, CentralError>>,
        timeout: Duration,
        step: ConnectStep,
    ) -> Result<T, CentralError> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CentralError::StepInterrupted),
            Err(_) => Err(CentralError::Timeout { step }),
        }
    }

    /// Tear down the session. Always safe to call, including when
    /// already idle; resource-release failures are logged, never
    /// propagated.
    pub async fn disconnect(&self) {
        self.stream.stop();
        self.waiters.fail_all(&CentralError::ConnectionLost);
        self.teardown().await;
        self.tracker.apply(SessionEvent::DisconnectRequested);
    }

    async fn teardown(&self) {
        if let Err(e) = self.adapter.close_gatt().await {
            self.bus.log(format!("teardown: close failed: {}", e));
        }
        *self.bound.write() = None;
        *self.target.write() = None;
    }

    /// Encode and write a command to CMD_RX with acknowledgement.
    pub async fn send_cmd(&self, cmd: Command) -> Result<(), CentralError> {
        let uuid = self.bound_uuid(|b| b.cmd_rx.uuid)?;
        self.adapter
            .write_characteristic(uuid, &[cmd.encode()], WriteMode::WithResponse)
            .await?;
        self.bus.log(format!("sent command {}", cmd));
        Ok(())
    }

    /// Fire-and-forget write to DATA_RX; the streaming path.
    pub async fn write_data(&self, bytes: &[u8]) -> Result<(), CentralError> {
        let uuid = self.bound_uuid(|b| b.data_rx.uuid)?;
        self.adapter
            .write_characteristic(uuid, bytes, WriteMode::WithoutResponse)
            .await?;
        Ok(())
    }

    fn bound_uuid(&self, pick: impl FnOnce(&BoundCharacteristics) -> Uuid) -> Result<Uuid, CentralError> {
        self.bound
            .read()
            .as_ref()
            .map(pick)
            .ok_or(CentralError::NotReady)
    }

    /// Start streaming blocks to the peripheral over DATA_RX. No-op
    /// when already streaming.
    pub fn start_stream(&self) -> Result<(), CentralError> {
        let data_rx = self.bound_uuid(|b| b.data_rx.uuid)?;
        let sink = Arc::new(CentralBlockSink {
            adapter: self.adapter.clone(),
            data_rx,
        });
        if !self
            .stream
            .start(self.config.block_size, self.config.block_period(), sink)
        {
            self.bus.log("stream: already active, start ignored");
        } else {
            self.bus.log("stream: started");
        }
        Ok(())
    }

    /// Stop the outbound stream. Idempotent.
    pub fn stop_stream(&self) {
        self.stream.stop();
        self.bus.log("stream: stopped");
    }

    // ------------------------------------------------------------------
    // Platform callback entry points
    // ------------------------------------------------------------------

    /// A device matching the scan filter was seen.
    pub fn on_device_discovered(&self, device: AdvertisedDevice) {
        self.waiters.complete_scan(device);
    }

    /// Terminal bond broadcast arrived.
    pub fn on_bond_state_changed(&self, state: BondState) {
        match state {
            BondState::Bonded => self.waiters.complete_bond(),
            BondState::None => self
                .waiters
                .fail_bond(CentralError::BondingFailed("rejected or cancelled".to_string())),
            BondState::Bonding => {}
        }
    }

    /// GATT client connection state callback.
    pub async fn on_connection_state_changed(&self, status: i32, connected: bool) {
        if connected {
            self.waiters.complete_connect();
        } else {
            self.handle_link_loss(status, 0).await;
        }
    }

    /// Service discovery finished.
    pub fn on_services_discovered(&self, services: Vec<ServiceInfo>) {
        self.waiters.complete_discover(services);
    }

    /// MTU exchange finished.
    pub fn on_mtu_changed(&self, mtu: u16) {
        self.waiters.complete_mtu(mtu);
    }

    /// A descriptor write completed.
    pub fn on_descriptor_write_completed(&self, characteristic: Uuid) {
        self.waiters.complete_descriptor(characteristic);
    }

    /// Inbound notification on a TX characteristic.
    pub fn on_notification(&self, characteristic: Uuid, value: &[u8]) {
        match LinkCharacteristic::from_uuid(characteristic) {
            Some(LinkCharacteristic::CmdTx) => match Command::decode(value) {
                Some(cmd) => {
                    self.bus.log(format!("notification: command {}", cmd));
                    self.bus.publish(BleNotification::Command(cmd));
                }
                None => {
                    // Still published; consumers decide what an
                    // unrecognized byte means
                    self.bus.log(format!(
                        "notification: unknown command byte {:02x?}",
                        value.first()
                    ));
                    self.bus.publish(BleNotification::UnknownCommand(value.to_vec()));
                }
            },
            Some(LinkCharacteristic::DataTx) => {
                self.bus.publish(BleNotification::Data(value.to_vec()));
            }
            _ => {
                self.bus.log(format!(
                    "notification on unexpected characteristic {}",
                    characteristic
                ));
            }
        }
    }

    /// The remote GATT database changed. Legitimate while the connect
    /// sequence is still running its own discovery; while Ready it means
    /// the peer re-registered its services, so the session force-closes
    /// rather than operating on stale handles.
    pub async fn on_service_changed(&self) {
        if self.init_in_progress.load(Ordering::Acquire) {
            self.bus.log("service change during session setup, ignored");
            return;
        }
        if self.current_state() == ConnectionState::Ready {
            self.bus.log("gatt database changed while ready, closing");
            self.handle_link_loss(SERVICE_CHANGED_STATUS, 0).await;
        }
    }

    async fn handle_link_loss(&self, status: i32, new_state: i32) {
        self.stream.stop();
        self.waiters.fail_all(&CentralError::ConnectionLost);
        self.teardown().await;
        self.bus.log(format!(
            "link lost (status={}, newState={})",
            status, new_state
        ));
        self.bus
            .publish_disconnect(DisconnectEvent { status, new_state });
        self.tracker
            .apply(SessionEvent::RemoteDisconnected { status, new_state });
    }
}

fn resolve_characteristics(services: &[ServiceInfo]) -> Result<BoundCharacteristics, CentralError> {
    let service = services
        .iter()
        .find(|s| s.uuid == SERVICE_UUID)
        .ok_or(CentralError::ServiceNotFound)?;

    let find = |uuid: Uuid| -> Result<CharacteristicInfo, CentralError> {
        service
            .characteristic(uuid)
            .cloned()
            .ok_or(CentralError::MissingCharacteristic(uuid))
    };

    Ok(BoundCharacteristics {
        cmd_rx: find(schema::CMD_RX_UUID)?,
        cmd_tx: find(schema::CMD_TX_UUID)?,
        data_rx: find(schema::DATA_RX_UUID)?,
        data_tx: find(schema::DATA_TX_UUID)?,
    })
}

struct CentralBlockSink {
    adapter: Arc<dyn CentralAdapter>,
    data_rx: Uuid,
}

#[async_trait::async_trait]
impl BlockSink for CentralBlockSink {
    async fn send_block(&self, _seq: u32, block: Vec<u8>) -> Result<(), String> {
        self.adapter
            .write_characteristic(self.data_rx, &block, WriteMode::WithoutResponse)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::AdapterError;
    use crate::protocol::service_definition;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct MockCentralAdapter {
        radio_enabled: AtomicBool,
        calls: Mutex<Vec<String>>,
    }

    impl MockCentralAdapter {
        fn new(radio: bool) -> Arc<Self> {
            let adapter = Arc::new(Self::default());
            adapter.radio_enabled.store(radio, Ordering::Release);
            adapter
        }

        fn record(&self, call: &str) {
            self.calls.lock().push(call.to_string());
        }

        fn count(&self, call: &str) -> usize {
            self.calls.lock().iter().filter(|c| c.as_str() == call).count()
        }
    }

    #[async_trait]
    impl CentralAdapter for MockCentralAdapter {
        fn is_radio_enabled(&self) -> bool {
            self.radio_enabled.load(Ordering::Acquire)
        }

        async fn start_scan(&self, _service: Uuid) -> Result<(), AdapterError> {
            self.record("start_scan");
            Ok(())
        }

        async fn stop_scan(&self) -> Result<(), AdapterError> {
            self.record("stop_scan");
            Ok(())
        }

        fn bond_state(&self, _device: &DeviceId) -> BondState {
            BondState::None
        }

        async fn create_bond(&self, _device: &DeviceId) -> Result<(), AdapterError> {
            self.record("create_bond");
            Ok(())
        }

        async fn connect_gatt(&self, _device: &DeviceId) -> Result<(), AdapterError> {
            self.record("connect_gatt");
            Ok(())
        }

        async fn discover_services(&self) -> Result<(), AdapterError> {
            self.record("discover_services");
            Ok(())
        }

        async fn request_mtu(&self, _mtu: u16) -> Result<(), AdapterError> {
            self.record("request_mtu");
            Ok(())
        }

        async fn write_characteristic(
            &self,
            _characteristic: Uuid,
            _value: &[u8],
            _mode: WriteMode,
        ) -> Result<(), AdapterError> {
            self.record("write_characteristic");
            Ok(())
        }

        async fn write_descriptor(
            &self,
            _characteristic: Uuid,
            _descriptor: Uuid,
            _value: &[u8],
        ) -> Result<(), AdapterError> {
            self.record("write_descriptor");
            Ok(())
        }

        async fn close_gatt(&self) -> Result<(), AdapterError> {
            self.record("close_gatt");
            Ok(())
        }
    }

    fn fast_config() -> LinkConfig {
        LinkConfig {
            step_timeout_ms: 50,
            bond_timeout_ms: 50,
            ..LinkConfig::default()
        }
    }

    fn device() -> DeviceId {
        DeviceId::new("peripheral-under-test")
    }

    /// Keeps completing every step so a sequential connect goes through.
    fn spawn_callback_driver(session: Arc<CentralSession>, mtu: u16) {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(5)).await;
                session.on_bond_state_changed(BondState::Bonded);
                session.on_connection_state_changed(0, true).await;
                session.on_services_discovered(vec![service_definition()]);
                session.on_mtu_changed(mtu);
                session.on_descriptor_write_completed(schema::CMD_TX_UUID);
                session.on_descriptor_write_completed(schema::DATA_TX_UUID);
            }
        });
    }

    #[tokio::test]
    async fn test_send_cmd_requires_session() {
        let session =
            CentralSession::new(MockCentralAdapter::new(true), fast_config()).unwrap();
        let result = session.send_cmd(Command::Ping).await;
        assert!(matches!(result, Err(CentralError::NotReady)));
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_is_safe() {
        let session =
            CentralSession::new(MockCentralAdapter::new(true), fast_config()).unwrap();
        session.disconnect().await;
        session.disconnect().await;
        assert_eq!(session.current_state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_scan_requires_radio() {
        let session =
            CentralSession::new(MockCentralAdapter::new(false), fast_config()).unwrap();
        let result = session.scan_first(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(CentralError::RadioDisabled)));
    }

    #[tokio::test]
    async fn test_scan_timeout_stops_scan() {
        let adapter = MockCentralAdapter::new(true);
        let session = CentralSession::new(adapter.clone(), fast_config()).unwrap();

        let found = session.scan_first(Duration::from_millis(40)).await.unwrap();
        assert!(found.is_none());
        assert_eq!(adapter.count("start_scan"), 1);
        assert_eq!(adapter.count("stop_scan"), 1);
        assert_eq!(session.current_state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_scan_found_stops_scan() {
        let adapter = MockCentralAdapter::new(true);
        let session =
            Arc::new(CentralSession::new(adapter.clone(), fast_config()).unwrap());

        let scanning = session.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            scanning.on_device_discovered(AdvertisedDevice {
                id: device(),
                name: Some("GattLink".to_string()),
                rssi: -40,
            });
        });

        let found = session.scan_first(Duration::from_millis(200)).await.unwrap();
        assert!(found.is_some());
        assert_eq!(adapter.count("stop_scan"), 1);
    }

    #[tokio::test]
    async fn test_connect_without_callbacks_times_out_on_bond() {
        let session =
            CentralSession::new(MockCentralAdapter::new(true), fast_config()).unwrap();
        let result = session.connect(&device()).await;
        assert!(matches!(
            result,
            Err(CentralError::Timeout { step: ConnectStep::Bond })
        ));
        assert!(matches!(session.current_state(), ConnectionState::Error(_)));
    }

    #[tokio::test]
    async fn test_connect_full_sequence_reaches_ready() {
        let adapter = MockCentralAdapter::new(true);
        let session =
            Arc::new(CentralSession::new(adapter.clone(), fast_config()).unwrap());
        spawn_callback_driver(session.clone(), 247);

        session.connect(&device()).await.unwrap();
        assert!(session.is_ready());

        // bond -> connect -> discover -> mtu -> two CCCD writes
        assert_eq!(adapter.count("create_bond"), 1);
        assert_eq!(adapter.count("connect_gatt"), 1);
        assert_eq!(adapter.count("discover_services"), 1);
        assert_eq!(adapter.count("request_mtu"), 1);
        assert_eq!(adapter.count("write_descriptor"), 2);
    }

    #[tokio::test]
    async fn test_connect_observes_state_sequence() {
        let session = Arc::new(
            CentralSession::new(MockCentralAdapter::new(true), fast_config()).unwrap(),
        );
        spawn_callback_driver(session.clone(), 247);

        let mut states = vec![session.current_state()];
        let mut rx = session.state();
        let collector = tokio::spawn(async move {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                let state = rx.borrow().clone();
                let done = state == ConnectionState::Ready;
                seen.push(state);
                if done {
                    break;
                }
            }
            seen
        });

        session.connect(&device()).await.unwrap();
        states.extend(collector.await.unwrap());

        let ready_at = states
            .iter()
            .position(|s| *s == ConnectionState::Ready)
            .expect("ready reached");
        let connecting_at = states
            .iter()
            .position(|s| *s == ConnectionState::Connecting)
            .expect("connecting observed");
        let bonding_at = states
            .iter()
            .position(|s| *s == ConnectionState::Bonding)
            .expect("bonding observed");
        assert!(bonding_at < connecting_at && connecting_at < ready_at);
    }

    #[tokio::test]
    async fn test_undersized_mtu_fails_before_ready() {
        let adapter = MockCentralAdapter::new(true);
        let session =
            Arc::new(CentralSession::new(adapter.clone(), fast_config()).unwrap());
        spawn_callback_driver(session.clone(), 100);

        let result = session.connect(&device()).await;
        assert!(matches!(
            result,
            Err(CentralError::MtuTooSmall { negotiated: 100, required: 163 })
        ));
        assert!(!session.is_ready());
        // Partial connection torn down
        assert!(adapter.count("close_gatt") >= 1);
    }

    #[tokio::test]
    async fn test_missing_characteristic_fails_connect() {
        let adapter = MockCentralAdapter::new(true);
        let session =
            Arc::new(CentralSession::new(adapter.clone(), fast_config()).unwrap());

        let driver = session.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(5)).await;
                driver.on_bond_state_changed(BondState::Bonded);
                driver.on_connection_state_changed(0, true).await;
                // A service missing DATA_TX
                let mut service = service_definition();
                service.characteristics.pop();
                driver.on_services_discovered(vec![service]);
            }
        });

        let result = session.connect(&device()).await;
        assert!(matches!(
            result,
            Err(CentralError::MissingCharacteristic(uuid)) if uuid == schema::DATA_TX_UUID
        ));
    }

    #[tokio::test]
    async fn test_remote_disconnect_fails_pending_step() {
        let session = Arc::new(
            CentralSession::new(MockCentralAdapter::new(true), fast_config()).unwrap(),
        );

        let dropper = session.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            dropper.on_bond_state_changed(BondState::Bonded);
            tokio::time::sleep(Duration::from_millis(5)).await;
            // Link drops while the connect step waits
            dropper.on_connection_state_changed(8, false).await;
        });

        let mut disconnects = session.bus().take_disconnects().expect("receiver");
        let result = session.connect(&device()).await;
        assert!(result.is_err());

        let event = disconnects.recv().await.expect("disconnect event");
        assert_eq!(event.status, 8);
    }

    #[tokio::test]
    async fn test_service_changed_while_ready_forces_disconnect() {
        let session = Arc::new(
            CentralSession::new(MockCentralAdapter::new(true), fast_config()).unwrap(),
        );
        spawn_callback_driver(session.clone(), 247);

        session.connect(&device()).await.unwrap();
        assert!(session.is_ready());

        let mut disconnects = session.bus().take_disconnects().expect("receiver");
        session.on_service_changed().await;

        assert_eq!(session.current_state(), ConnectionState::Idle);
        let event = disconnects.recv().await.expect("disconnect event");
        assert_eq!(event.status, SERVICE_CHANGED_STATUS);
    }

    #[tokio::test]
    async fn test_notification_decoding() {
        let session =
            CentralSession::new(MockCentralAdapter::new(true), fast_config()).unwrap();
        let mut rx = session.bus().subscribe_notifications();

        session.on_notification(schema::CMD_TX_UUID, &[0x02]);
        session.on_notification(schema::CMD_TX_UUID, &[0xFF]);
        session.on_notification(schema::DATA_TX_UUID, &[0u8; 8]);

        assert_eq!(
            rx.recv().await.unwrap(),
            BleNotification::Command(Command::Pong)
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            BleNotification::UnknownCommand(vec![0xFF])
        );
        assert_eq!(rx.recv().await.unwrap(), BleNotification::Data(vec![0u8; 8]));
    }
}
