// Command codec — one byte per command, unknown bytes are not an error

use serde::{Deserialize, Serialize};

/// Wire byte for `Command::Ping`
pub const CMD_PING: u8 = 0x01;
/// Wire byte for `Command::Pong`
pub const CMD_PONG: u8 = 0x02;
/// Wire byte for `Command::StartTransfer`
pub const CMD_START_TRANSFER: u8 = 0x10;
/// Wire byte for `Command::StopTransfer`
pub const CMD_STOP_TRANSFER: u8 = 0x11;

/// The closed set of control commands exchanged over CMD_RX/CMD_TX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Liveness probe, answered with `Pong`
    Ping,
    /// Answer to `Ping`
    Pong,
    /// Remote trigger: begin the periodic data stream
    StartTransfer,
    /// Remote trigger: end the periodic data stream
    StopTransfer,
}

impl Command {
    /// Encode to the single wire byte. Total: every variant has exactly
    /// one byte.
    pub fn encode(&self) -> u8 {
        match self {
            Command::Ping => CMD_PING,
            Command::Pong => CMD_PONG,
            Command::StartTransfer => CMD_START_TRANSFER,
            Command::StopTransfer => CMD_STOP_TRANSFER,
        }
    }

    /// Decode from an inbound payload. Only the first byte is inspected;
    /// empty payloads and unrecognized bytes yield `None`. Never panics;
    /// an unknown byte is the peer's problem, not ours.
    pub fn decode(bytes: &[u8]) -> Option<Command> {
        match bytes.first()? {
            &CMD_PING => Some(Command::Ping),
            &CMD_PONG => Some(Command::Pong),
            &CMD_START_TRANSFER => Some(Command::StartTransfer),
            &CMD_STOP_TRANSFER => Some(Command::StopTransfer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Ping => write!(f, "Ping"),
            Command::Pong => write!(f, "Pong"),
            Command::StartTransfer => write!(f, "StartTransfer"),
            Command::StopTransfer => write!(f, "StopTransfer"),
        }
    }
}
