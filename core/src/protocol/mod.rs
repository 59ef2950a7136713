/// Wire protocol for the GattLink service
///
/// - **command**: one-byte command codec (Ping/Pong/StartTransfer/StopTransfer)
/// - **block**: fixed-size stream block layout with LE sequence header
/// - **schema**: the GATT service/characteristic/descriptor identifiers

pub mod block;
pub mod command;
pub mod schema;

pub use block::{
    build_block, is_valid_len, min_mtu_for, sequence_of, ATT_OVERHEAD, DEFAULT_BLOCK_SIZE,
    SEQ_HEADER_SIZE,
};
pub use command::Command;
pub use schema::{
    service_definition, LinkCharacteristic, CCCD_DISABLE_NOTIFICATION, CCCD_ENABLE_NOTIFICATION,
    CCCD_UUID, CMD_RX_UUID, CMD_TX_UUID, DATA_RX_UUID, DATA_TX_UUID, SERVICE_UUID,
};
