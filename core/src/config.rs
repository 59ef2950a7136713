//! Link configuration with validation
//!
//! All tunables of the protocol core live here. Defaults match the
//! reference deployment: 160-byte blocks every 60 ms, 10 s per GATT
//! step, 30 s for bonding.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{min_mtu_for, SEQ_HEADER_SIZE};

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Invalid link configuration: {0}")]
    Invalid(String),
}

/// Configuration shared by both session roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Fixed stream block size in bytes, sequence header included
    pub block_size: usize,
    /// Inter-block period of the streaming loop in milliseconds
    pub block_period_ms: u64,
    /// Timeout for each awaited GATT step (connect, discovery, MTU,
    /// descriptor write) in milliseconds
    pub step_timeout_ms: u64,
    /// Timeout for bonding in milliseconds
    pub bond_timeout_ms: u64,
    /// MTU the central requests after discovery
    pub requested_mtu: u16,
    /// Whether StartTransfer/StopTransfer bytes received on CMD_RX drive
    /// the peripheral's streaming controls. Local calls stay
    /// authoritative either way.
    pub remote_transfer_control: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            block_size: 160,
            block_period_ms: 60,
            step_timeout_ms: 10_000,
            bond_timeout_ms: 30_000,
            requested_mtu: 247,
            remote_transfer_control: true,
        }
    }
}

impl LinkConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size <= SEQ_HEADER_SIZE {
            return Err(ConfigError::Invalid(format!(
                "block_size must exceed the {}-byte sequence header",
                SEQ_HEADER_SIZE
            )));
        }
        if self.block_period_ms == 0 {
            return Err(ConfigError::Invalid("block_period_ms must be > 0".to_string()));
        }
        if self.step_timeout_ms == 0 || self.bond_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be > 0".to_string()));
        }
        if self.requested_mtu < self.min_mtu() {
            return Err(ConfigError::Invalid(format!(
                "requested_mtu {} cannot carry one {}-byte block (need >= {})",
                self.requested_mtu,
                self.block_size,
                self.min_mtu()
            )));
        }
        Ok(())
    }

    /// Smallest MTU that can carry one block plus ATT overhead.
    pub fn min_mtu(&self) -> u16 {
        min_mtu_for(self.block_size)
    }

    pub fn step_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.step_timeout_ms)
    }

    pub fn bond_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.bond_timeout_ms)
    }

    pub fn block_period(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.block_period_ms)
    }
}
