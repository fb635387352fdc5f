//! Error types for modem frame and reflector packet parsing

use thiserror::Error;

/// Errors that can occur while building or parsing wire data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Buffer is incomplete - need more data
    #[error("incomplete data: need {needed} more bytes")]
    Incomplete { needed: usize },

    /// Modem frame length byte outside the accepted range
    #[error("invalid frame length: {0}")]
    InvalidLength(usize),

    /// Packet is shorter than the fields being extracted require
    #[error("packet too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },

    /// Packet type byte does not match the expected packet
    #[error("unexpected packet type: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedType { expected: u8, actual: u8 },
}
