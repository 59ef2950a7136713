/// GATT schema for the GattLink service
///
/// One primary service with four characteristics: a command pair
/// (write in / notify out) and a data pair (write-no-response in /
/// notify out). Both notify characteristics carry the standard CCCD
/// descriptor. A conformant peripheral exposes exactly these four; a
/// central that cannot resolve all of them after discovery must fail
/// the connection.

use uuid::Uuid;

use crate::platform::{CharacteristicInfo, ServiceInfo};

/// GattLink primary service UUID.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x6a0e_1000_b57d_43c8_9f31_8c64d2e5a001);

/// Command inbound (central writes, with response).
pub const CMD_RX_UUID: Uuid = Uuid::from_u128(0x6a0e_1001_b57d_43c8_9f31_8c64d2e5a001);

/// Command outbound (peripheral notifies).
pub const CMD_TX_UUID: Uuid = Uuid::from_u128(0x6a0e_1002_b57d_43c8_9f31_8c64d2e5a001);

/// Data inbound (central writes, no response).
pub const DATA_RX_UUID: Uuid = Uuid::from_u128(0x6a0e_1003_b57d_43c8_9f31_8c64d2e5a001);

/// Data outbound (peripheral notifies).
pub const DATA_TX_UUID: Uuid = Uuid::from_u128(0x6a0e_1004_b57d_43c8_9f31_8c64d2e5a001);

/// Standard Client Characteristic Configuration Descriptor (0x2902).
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x0000_2902_0000_1000_8000_00805f9b34fb);

/// CCCD value enabling notifications.
pub const CCCD_ENABLE_NOTIFICATION: [u8; 2] = [0x01, 0x00];

/// CCCD value disabling notifications.
pub const CCCD_DISABLE_NOTIFICATION: [u8; 2] = [0x00, 0x00];

/// The four characteristics of the link service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkCharacteristic {
    /// Command in (write with response)
    CmdRx,
    /// Command out (notify)
    CmdTx,
    /// Data in (write without response)
    DataRx,
    /// Data out (notify)
    DataTx,
}

impl LinkCharacteristic {
    /// All four characteristics, discovery-order.
    pub const ALL: [LinkCharacteristic; 4] = [
        LinkCharacteristic::CmdRx,
        LinkCharacteristic::CmdTx,
        LinkCharacteristic::DataRx,
        LinkCharacteristic::DataTx,
    ];

    /// Get the characteristic UUID.
    pub fn uuid(&self) -> Uuid {
        match self {
            LinkCharacteristic::CmdRx => CMD_RX_UUID,
            LinkCharacteristic::CmdTx => CMD_TX_UUID,
            LinkCharacteristic::DataRx => DATA_RX_UUID,
            LinkCharacteristic::DataTx => DATA_TX_UUID,
        }
    }

    /// Resolve a characteristic from its UUID.
    pub fn from_uuid(uuid: Uuid) -> Option<LinkCharacteristic> {
        LinkCharacteristic::ALL.into_iter().find(|c| c.uuid() == uuid)
    }

    /// Whether this characteristic notifies (and therefore carries a CCCD).
    pub fn is_notify(&self) -> bool {
        matches!(self, LinkCharacteristic::CmdTx | LinkCharacteristic::DataTx)
    }
}

impl std::fmt::Display for LinkCharacteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkCharacteristic::CmdRx => write!(f, "CMD_RX"),
            LinkCharacteristic::CmdTx => write!(f, "CMD_TX"),
            LinkCharacteristic::DataRx => write!(f, "DATA_RX"),
            LinkCharacteristic::DataTx => write!(f, "DATA_TX"),
        }
    }
}

/// Platform-facing definition of the link service: registered by the
/// peripheral, matched against discovery results by the central.
pub fn service_definition() -> ServiceInfo {
    ServiceInfo {
        uuid: SERVICE_UUID,
        characteristics: LinkCharacteristic::ALL
            .into_iter()
            .map(|c| CharacteristicInfo {
                uuid: c.uuid(),
                descriptors: if c.is_notify() { vec![CCCD_UUID] } else { Vec::new() },
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_characteristic_uuids_distinct() {
        for i in 0..LinkCharacteristic::ALL.len() {
            for j in (i + 1)..LinkCharacteristic::ALL.len() {
                assert_ne!(
                    LinkCharacteristic::ALL[i].uuid(),
                    LinkCharacteristic::ALL[j].uuid()
                );
            }
        }
    }

    #[test]
    fn test_from_uuid_roundtrip() {
        for c in LinkCharacteristic::ALL {
            assert_eq!(LinkCharacteristic::from_uuid(c.uuid()), Some(c));
        }
        assert_eq!(LinkCharacteristic::from_uuid(SERVICE_UUID), None);
    }

    #[test]
    fn test_notify_characteristics() {
        assert!(LinkCharacteristic::CmdTx.is_notify());
        assert!(LinkCharacteristic::DataTx.is_notify());
        assert!(!LinkCharacteristic::CmdRx.is_notify());
        assert!(!LinkCharacteristic::DataRx.is_notify());
    }

    #[test]
    fn test_service_definition_shape() {
        let service = service_definition();
        assert_eq!(service.uuid, SERVICE_UUID);
        assert_eq!(service.characteristics.len(), 4);

        // Exactly the two notify characteristics carry the CCCD
        let with_cccd: Vec<_> = service
            .characteristics
            .iter()
            .filter(|c| c.descriptors.contains(&CCCD_UUID))
            .collect();
        assert_eq!(with_cccd.len(), 2);
    }

    #[test]
    fn test_cccd_values() {
        assert_eq!(CCCD_ENABLE_NOTIFICATION, [0x01, 0x00]);
        assert_eq!(CCCD_DISABLE_NOTIFICATION, [0x00, 0x00]);
    }
}
