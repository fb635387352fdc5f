//! Error types for the modem and reflector links

use thiserror::Error;

/// Errors that can occur on the modem or reflector link
#[derive(Debug, Error)]
pub enum LinkError {
    /// Serial port could not be opened
    #[error("failed to open serial port {port}: {reason}")]
    Open { port: String, reason: String },

    /// I/O error on the serial port or socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reflector host name did not resolve to any address
    #[error("could not resolve reflector address {0}")]
    AddressResolution(String),

    /// Modem did not reply to a command in time
    #[error("no reply to {command} within {timeout_ms}ms")]
    AckTimeout {
        /// Command that was sent
        command: &'static str,
        /// How long we waited (milliseconds)
        timeout_ms: u64,
    },

    /// Modem rejected a command
    #[error("modem rejected {command} (reason {reason})")]
    Nak {
        /// Command that was rejected
        command: &'static str,
        /// Reason code reported by the modem
        reason: u8,
    },

    /// No auth response arrived before the deadline
    #[error("authentication timed out after {timeout_ms}ms")]
    AuthTimeout { timeout_ms: u64 },

    /// Reflector refused the login
    #[error("authentication rejected by reflector")]
    AuthRejected,

    /// Fewer bytes went out than were handed in
    #[error("short write: sent {sent} of {expected} bytes")]
    ShortWrite { sent: usize, expected: usize },

    /// Modem link is not open
    #[error("modem link is not open")]
    NotOpen,

    /// Reflector socket is not connected
    #[error("reflector link is not connected")]
    NotConnected,

    /// Configuration value cannot be applied
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Wire data could not be built or parsed
    #[error("parse error: {0}")]
    Parse(#[from] p25_protocol::ParseError),
}

impl LinkError {
    /// Whether this error came from a missing reply rather than a refusal
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::AckTimeout { .. } | Self::AuthTimeout { .. })
    }
}
