// GattLink Core — point-to-point BLE GATT application protocol
//
// Two roles over one custom GATT service: a Peripheral (server +
// advertiser) and a Central (scanner + client) exchanging a one-byte
// command protocol and fixed-size streamed data blocks. Everything here
// is platform-free: radio access goes through the adapter traits in
// `platform`, so the whole protocol core runs under test without BLE
// hardware.

pub mod bus;
pub mod central;
pub mod config;
pub mod loopback;
pub mod peripheral;
pub mod platform;
pub mod protocol;
pub mod stream;

pub use bus::{BleNotification, DisconnectEvent, EventBus};
pub use central::{CentralError, CentralSession, ConnectionState, ConnectStep};
pub use config::{ConfigError, LinkConfig};
pub use loopback::{loopback_pair, LoopbackLink, LoopbackPair};
pub use peripheral::{PeripheralError, PeripheralSession, PeripheralState};
pub use platform::{
    AdapterError, AdvertisedDevice, BondState, CentralAdapter, DeviceId, PeripheralAdapter,
    WriteMode,
};
pub use protocol::Command;
pub use stream::{BlockSink, StreamController};
