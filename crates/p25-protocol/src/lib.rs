//! P25 Hotspot Protocol Library
//!
//! This crate provides parsing and encoding for the two wire formats a P25
//! hotspot sits between:
//!
//! - **Modem serial**: MMDVM-style `E0 len cmd data...` frames over a raw
//!   serial line, decoded by a streaming, self-resynchronizing codec
//! - **Reflector UDP**: one packet per datagram, `type payload...`, with
//!   authentication, keepalive and voice/trunking frame types
//!
//! Everything here is pure: no state beyond the decode buffer and no I/O.
//! P25 payloads (TSBK opcodes, IMBE voice) are opaque; only the frame type,
//! talkgroup and source id are read.
//!
//! # Example
//!
//! ```rust
//! use p25_protocol::{FrameCodec, ModemCodec, ModemCommand};
//!
//! let mut codec = ModemCodec::new();
//! // Two garbage bytes, then an ACK frame
//! codec.push_bytes(&[0x00, 0x42, 0xE0, 0x03, 0x70]);
//!
//! let frame = codec.next_frame().unwrap();
//! assert_eq!(frame.kind(), Some(ModemCommand::Ack));
//! ```

pub mod error;
pub mod modem;
pub mod reflector;

pub use error::ParseError;
pub use modem::{ModemCodec, ModemCommand, ModemFrame, ModemMode};
pub use reflector::{PacketType, ReflectorPacket};

/// Trait for codecs that reassemble frames from a byte stream
pub trait FrameCodec {
    /// The frame type produced by this codec
    type Frame;

    /// Push raw bytes into the codec's buffer
    fn push_bytes(&mut self, data: &[u8]);

    /// Try to extract the next complete frame from the buffer
    fn next_frame(&mut self) -> Option<Self::Frame>;

    /// Try to extract the next complete frame along with its raw bytes
    fn next_frame_with_bytes(&mut self) -> Option<(Self::Frame, Vec<u8>)>;

    /// Clear the internal buffer
    fn clear(&mut self);
}

/// Trait for frames that can be encoded to bytes
pub trait EncodeFrame {
    /// Encode this frame to its wire format
    fn encode(&self) -> Vec<u8>;
}
