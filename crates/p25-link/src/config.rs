//! Configuration records handed to the links and the bridge
//!
//! These are read once at startup and cloned into each component; nothing
//! mutates them afterwards.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reflector connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReflectorConfig {
    /// Reflector host name or IP address
    #[serde(default)]
    pub address: String,
    /// Reflector UDP port
    #[serde(default = "default_reflector_port")]
    pub port: u16,
    /// Radio id sent in the auth request
    #[serde(default)]
    pub radio_id: u32,
    /// Shared secret sent in the auth request
    #[serde(default)]
    pub password: String,
    /// Station callsign (informational)
    #[serde(default)]
    pub callsign: String,
    /// Seconds between keepalive polls
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,
    /// Socket receive timeout in milliseconds
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
    /// How long to wait for the auth response in milliseconds
    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,
}

fn default_reflector_port() -> u16 {
    41000
}

fn default_keepalive_interval() -> u64 {
    5
}

fn default_receive_timeout_ms() -> u64 {
    100
}

fn default_auth_timeout_ms() -> u64 {
    5000
}

impl Default for ReflectorConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: default_reflector_port(),
            radio_id: 0,
            password: String::new(),
            callsign: String::new(),
            keepalive_interval: default_keepalive_interval(),
            receive_timeout_ms: default_receive_timeout_ms(),
            auth_timeout_ms: default_auth_timeout_ms(),
        }
    }
}

impl ReflectorConfig {
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }
}

/// Modem serial and RF settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModemConfig {
    /// Serial device path
    #[serde(default)]
    pub port: String,
    /// Serial baud rate
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Receive frequency in Hz
    #[serde(default)]
    pub rx_frequency: u32,
    /// Transmit frequency in Hz
    #[serde(default)]
    pub tx_frequency: u32,
    /// Transmit power level (0-255)
    #[serde(default = "default_tx_power")]
    pub tx_power: u32,
    /// Receive frequency correction in Hz
    #[serde(default)]
    pub rx_offset: i32,
    /// Transmit frequency correction in Hz
    #[serde(default)]
    pub tx_offset: i32,
    /// RF output level (0-255)
    #[serde(default = "default_rf_level")]
    pub rf_level: u32,
    /// Send the rx/tx frequency commands during configuration
    #[serde(default = "default_true")]
    pub set_frequencies: bool,
    /// Switch the modem into P25 mode during configuration
    #[serde(default = "default_true")]
    pub set_p25_mode: bool,
    /// How long to wait for a command ACK in milliseconds
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    /// Serial byte timeout in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_baud() -> u32 {
    115_200
}

fn default_tx_power() -> u32 {
    50
}

fn default_rf_level() -> u32 {
    100
}

fn default_ack_timeout_ms() -> u64 {
    1000
}

fn default_read_timeout_ms() -> u64 {
    20
}

fn default_true() -> bool {
    true
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud: default_baud(),
            rx_frequency: 0,
            tx_frequency: 0,
            tx_power: default_tx_power(),
            rx_offset: 0,
            tx_offset: 0,
            rf_level: default_rf_level(),
            set_frequencies: true,
            set_p25_mode: true,
            ack_timeout_ms: default_ack_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl ModemConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// P25 mode settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct P25Config {
    /// Network access code
    #[serde(default = "default_nac")]
    pub nac: u16,
    /// Enable P25 in the modem's mode mask
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Relay trunking control blocks from the network to RF
    #[serde(default = "default_true")]
    pub trunking: bool,
}

fn default_nac() -> u16 {
    0x293
}

impl Default for P25Config {
    fn default() -> Self {
        Self {
            nac: default_nac(),
            enabled: true,
            trunking: true,
        }
    }
}
