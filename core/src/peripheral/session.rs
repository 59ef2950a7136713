//! Peripheral session — GATT server lifecycle
//!
//! Owns the single GATT server handle: advertise, accept connections,
//! track CCCD subscriptions, decode inbound commands, validate inbound
//! data blocks and drive the outbound stream. GATT server callbacks
//! arrive on platform threads and are folded into the guarded registry
//! and the published `PeripheralState`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

use super::registry::{DeviceRegistry, SubscriptionChannel};
use super::PeripheralError;
use crate::bus::{BleNotification, EventBus};
use crate::config::{ConfigError, LinkConfig};
use crate::platform::{DeviceId, PeripheralAdapter};
use crate::protocol::{
    is_valid_len, sequence_of, service_definition, Command, LinkCharacteristic,
    CCCD_ENABLE_NOTIFICATION, CCCD_UUID, CMD_TX_UUID, DATA_TX_UUID, SERVICE_UUID,
};
use crate::stream::{BlockSink, StreamController};

/// Published snapshot of the peripheral's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralState {
    /// Whether the platform can advertise at all
    pub supported: bool,
    /// Server open and advertising
    pub running: bool,
    /// Outbound stream active
    pub transferring: bool,
    pub connected_count: usize,
    pub cmd_subscriber_count: usize,
    pub data_subscriber_count: usize,
    pub last_error: Option<String>,
}

impl Default for PeripheralState {
    fn default() -> Self {
        Self {
            supported: true,
            running: false,
            transferring: false,
            connected_count: 0,
            cmd_subscriber_count: 0,
            data_subscriber_count: 0,
            last_error: None,
        }
    }
}

/// The GATT server session.
pub struct PeripheralSession {
    adapter: Arc<dyn PeripheralAdapter>,
    config: LinkConfig,
    registry: Arc<DeviceRegistry>,
    state_tx: watch::Sender<PeripheralState>,
    bus: EventBus,
    stream: StreamController,
}

impl PeripheralSession {
    pub fn new(
        adapter: Arc<dyn PeripheralAdapter>,
        config: LinkConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (state_tx, _) = watch::channel(PeripheralState::default());
        Ok(Self {
            adapter,
            config,
            registry: Arc::new(DeviceRegistry::new()),
            state_tx,
            bus: EventBus::new(),
            stream: StreamController::new(),
        })
    }

    /// The session's event/log/notification bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Subscribe to peripheral state snapshots.
    pub fn state(&self) -> watch::Receiver<PeripheralState> {
        self.state_tx.subscribe()
    }

    /// Current peripheral state.
    pub fn current_state(&self) -> PeripheralState {
        self.state_tx.borrow().clone()
    }

    fn update_state(&self, f: impl FnOnce(&mut PeripheralState)) {
        self.state_tx.send_modify(f);
    }

    fn publish_counts(&self) {
        let counts = self.registry.counts();
        self.update_state(|s| {
            s.connected_count = counts.connected;
            s.cmd_subscriber_count = counts.cmd_subscribers;
            s.data_subscriber_count = counts.data_subscribers;
        });
    }

    fn record_error(&self, error: impl std::fmt::Display) {
        let message = error.to_string();
        self.bus.log(format!("peripheral error: {}", message));
        self.update_state(|s| s.last_error = Some(message));
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Open the GATT server, register the link service and advertise it
    /// as `name`.
    ///
    /// A platform without advertising support records an error state and
    /// returns without side effects. A disabled radio fails fast.
    /// Failures of the platform calls themselves are caught and recorded
    /// in `last_error` rather than propagated.
    pub async fn start(&self, name: &str) -> Result<(), PeripheralError> {
        if self.current_state().running {
            return Err(PeripheralError::AlreadyRunning);
        }

        if !self.adapter.advertising_supported() {
            self.update_state(|s| s.supported = false);
            self.record_error("advertising not supported on this platform");
            return Ok(());
        }
        if !self.adapter.is_radio_enabled() {
            return Err(PeripheralError::RadioDisabled);
        }

        if let Err(e) = self.adapter.open_server().await {
            self.record_error(format!("opening gatt server failed: {}", e));
            return Ok(());
        }
        if let Err(e) = self.adapter.register_service(&service_definition()).await {
            self.record_error(format!("registering service failed: {}", e));
            if let Err(e) = self.adapter.close_server().await {
                self.bus.log(format!("close after failed start: {}", e));
            }
            return Ok(());
        }
        if let Err(e) = self.adapter.start_advertising(name, SERVICE_UUID).await {
            self.record_error(format!("advertising failed: {}", e));
            if let Err(e) = self.adapter.close_server().await {
                self.bus.log(format!("close after failed start: {}", e));
            }
            return Ok(());
        }

        self.update_state(|s| {
            *s = PeripheralState {
                running: true,
                ..PeripheralState::default()
            };
        });
        self.bus.log(format!("advertising as \"{}\"", name));
        Ok(())
    }

    /// Stop everything: streaming, connections, advertising, server.
    /// Every sub-step failure is logged and swallowed so stop always
    /// completes; calling it again is safe.
    pub async fn stop(&self) {
        self.stop_transfer();

        for device in self.registry.connected() {
            if let Err(e) = self.adapter.disconnect_device(&device).await {
                self.bus.log(format!("disconnect of {} failed: {}", device, e));
            }
        }
        if let Err(e) = self.adapter.stop_advertising().await {
            self.bus.log(format!("stop advertising failed: {}", e));
        }
        if let Err(e) = self.adapter.close_server().await {
            self.bus.log(format!("close server failed: {}", e));
        }

        self.registry.clear();
        let supported = self.current_state().supported;
        self.update_state(|s| {
            *s = PeripheralState {
                supported,
                ..PeripheralState::default()
            };
        });
        self.bus.log("peripheral stopped");
    }

    // ------------------------------------------------------------------
    // Streaming
    // ------------------------------------------------------------------

    /// Begin the outbound DATA_TX stream. Starting while already
    /// streaming is a logged no-op.
    pub fn start_transfer(&self) {
        if !self.current_state().running {
            self.bus.log("transfer: not running, start ignored");
            return;
        }

        let sink = Arc::new(DataNotifySink {
            adapter: self.adapter.clone(),
            registry: self.registry.clone(),
        });
        if self
            .stream
            .start(self.config.block_size, self.config.block_period(), sink)
        {
            self.update_state(|s| s.transferring = true);
            self.bus.log("transfer: started");
        } else {
            self.bus.log("transfer: already streaming, start ignored");
        }
    }

    /// End the outbound stream. Safe no-op when not streaming.
    pub fn stop_transfer(&self) {
        self.stream.stop();
        if self.current_state().transferring {
            self.update_state(|s| s.transferring = false);
            self.bus.log("transfer: stopped");
        }
    }

    // ------------------------------------------------------------------
    // Platform callback entry points
    // ------------------------------------------------------------------

    /// A remote device connected to the server.
    pub fn on_device_connected(&self, device: DeviceId) {
        if self.registry.add_connected(device.clone()) {
            self.bus.log(format!("device connected: {}", device));
        }
        self.publish_counts();
    }

    /// A remote device disconnected. Removal from the connected set and
    /// both subscription sets is atomic.
    pub fn on_device_disconnected(&self, device: &DeviceId) {
        self.registry.remove_device(device);
        self.bus.log(format!("device disconnected: {}", device));
        self.publish_counts();
    }

    /// Inbound characteristic write from `device`.
    pub async fn on_characteristic_write(
        &self,
        device: &DeviceId,
        characteristic: Uuid,
        value: &[u8],
        response_needed: bool,
        request_id: u32,
    ) {
        let mut accepted = true;
        match LinkCharacteristic::from_uuid(characteristic) {
            Some(LinkCharacteristic::CmdRx) => self.handle_command_write(device, value).await,
            Some(LinkCharacteristic::DataRx) => {
                if is_valid_len(value, self.config.block_size) {
                    self.bus.log(format!(
                        "data block {:?} from {}",
                        sequence_of(value),
                        device
                    ));
                    self.bus.publish(BleNotification::Data(value.to_vec()));
                } else {
                    // Wrong-size writes are rejected, never forwarded
                    self.bus.log(format!(
                        "rejected data write of {} bytes from {} (expected {})",
                        value.len(),
                        device,
                        self.config.block_size
                    ));
                    accepted = false;
                }
            }
            _ => {
                self.bus.log(format!(
                    "write to unexpected characteristic {} from {}",
                    characteristic, device
                ));
                accepted = false;
            }
        }

        if response_needed {
            if let Err(e) = self
                .adapter
                .send_write_response(device, request_id, accepted)
                .await
            {
                self.bus.log(format!("write response failed: {}", e));
            }
        }
    }

    async fn handle_command_write(&self, device: &DeviceId, value: &[u8]) {
        match Command::decode(value) {
            Some(Command::Ping) => {
                // Pong goes back to the sender only, and only when it
                // subscribed to CMD_TX
                if self
                    .registry
                    .is_subscribed(SubscriptionChannel::Command, device)
                {
                    self.bus.log(format!("ping from {}, sending pong", device));
                    if let Err(e) = self
                        .adapter
                        .notify(device, CMD_TX_UUID, &[Command::Pong.encode()])
                        .await
                    {
                        self.bus.log(format!("pong to {} failed: {}", device, e));
                    }
                } else {
                    self.bus
                        .log(format!("ping from unsubscribed device {}, no pong", device));
                }
            }
            Some(Command::StartTransfer) => {
                if self.config.remote_transfer_control {
                    self.bus.log(format!("remote start-transfer from {}", device));
                    self.start_transfer();
                } else {
                    self.bus
                        .log("remote start-transfer ignored (disabled by config)");
                }
            }
            Some(Command::StopTransfer) => {
                if self.config.remote_transfer_control {
                    self.bus.log(format!("remote stop-transfer from {}", device));
                    self.stop_transfer();
                } else {
                    self.bus
                        .log("remote stop-transfer ignored (disabled by config)");
                }
            }
            Some(Command::Pong) => {
                self.bus.log(format!("unsolicited pong from {}", device));
            }
            None => {
                self.bus.log(format!(
                    "unknown command byte {:02x?} from {}",
                    value.first(),
                    device
                ));
            }
        }
    }

    /// Inbound descriptor write: CCCD subscription changes.
    pub async fn on_descriptor_write(
        &self,
        device: &DeviceId,
        characteristic: Uuid,
        descriptor: Uuid,
        value: &[u8],
        response_needed: bool,
        request_id: u32,
    ) {
        let target = match LinkCharacteristic::from_uuid(characteristic) {
            Some(c @ LinkCharacteristic::CmdTx) => Some((c, SubscriptionChannel::Command)),
            Some(c @ LinkCharacteristic::DataTx) => Some((c, SubscriptionChannel::Data)),
            _ => None,
        };

        match target {
            Some((link_char, channel)) if descriptor == CCCD_UUID => {
                if value == CCCD_ENABLE_NOTIFICATION {
                    self.registry.subscribe(channel, device.clone());
                    self.bus.log(format!("{} subscribed to {}", device, link_char));
                } else {
                    // Any other value counts as unsubscribe
                    self.registry.unsubscribe(channel, device);
                    self.bus.log(format!("{} unsubscribed from {}", device, link_char));
                }
                self.publish_counts();
            }
            _ => {
                self.bus.log(format!(
                    "descriptor write to unexpected target {}/{}",
                    characteristic, descriptor
                ));
            }
        }

        if response_needed {
            if let Err(e) = self
                .adapter
                .send_write_response(device, request_id, true)
                .await
            {
                self.bus.log(format!("descriptor response failed: {}", e));
            }
        }
    }
}

/// Notifies each current DATA_TX subscriber. The subscriber snapshot is
/// taken per block, so late subscribers miss earlier blocks and departed
/// ones are skipped silently.
struct DataNotifySink {
    adapter: Arc<dyn PeripheralAdapter>,
    registry: Arc<DeviceRegistry>,
}

#[async_trait::async_trait]
impl BlockSink for DataNotifySink {
    async fn send_block(&self, _seq: u32, block: Vec<u8>) -> Result<(), String> {
        for device in self.registry.subscribers(SubscriptionChannel::Data) {
            // A notify failure usually means the device just left;
            // not a stream error
            let _ = self.adapter.notify(&device, DATA_TX_UUID, &block).await;
        }
        Ok(())
    }
}
