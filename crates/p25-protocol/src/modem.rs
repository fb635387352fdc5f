//! MMDVM Modem Serial Protocol
//!
//! The hotspot modem speaks a length-prefixed binary protocol over a raw
//! 8-N-1 serial line. Every message in either direction is one frame.
//!
//! # Frame Format
//! ```text
//! E0 [len] [cmd] [data...]
//! ```
//!
//! - `E0`: Start marker
//! - `len`: Total frame length, start marker included (3..=250)
//! - `cmd`: Command code
//! - `data`: 0..=247 payload bytes
//!
//! The decoder resynchronizes one byte at a time: a byte that is not the
//! start marker, or a start marker followed by an out-of-range length, is
//! discarded and scanning resumes at the next byte.

use crate::error::ParseError;
use crate::{EncodeFrame, FrameCodec};

/// Start-of-frame marker byte
pub const START_MARKER: u8 = 0xE0;
/// Smallest legal value of the length byte (marker, length, command)
pub const MIN_FRAME_LEN: usize = 3;
/// Largest legal value of the length byte
pub const MAX_FRAME_LEN: usize = 250;
/// Largest payload that fits in a frame
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - MIN_FRAME_LEN;

/// Modem command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModemCommand {
    /// Query firmware version (also the version reply)
    GetVersion = 0x00,
    /// Query modem status (also the status reply)
    GetStatus = 0x01,
    /// Write modem configuration
    SetConfig = 0x02,
    /// Switch operating mode
    SetMode = 0x03,
    /// Set receive frequency (Hz, big-endian u32)
    SetRxFreq = 0x04,
    /// Set transmit frequency (Hz, big-endian u32)
    SetTxFreq = 0x05,
    /// Transmit a CW identification
    SendCwId = 0x0A,
    /// P25 frame, either direction
    P25Data = 0x31,
    /// Modem lost P25 sync
    P25Lost = 0x32,
    /// Positive acknowledgment
    Ack = 0x70,
    /// Negative acknowledgment
    Nak = 0x7F,
}

impl ModemCommand {
    /// Wire value of this command
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Returns a short name for log output
    pub fn name(self) -> &'static str {
        match self {
            Self::GetVersion => "GET_VERSION",
            Self::GetStatus => "GET_STATUS",
            Self::SetConfig => "SET_CONFIG",
            Self::SetMode => "SET_MODE",
            Self::SetRxFreq => "SET_RXFREQ",
            Self::SetTxFreq => "SET_TXFREQ",
            Self::SendCwId => "SEND_CWID",
            Self::P25Data => "P25_DATA",
            Self::P25Lost => "P25_LOST",
            Self::Ack => "ACK",
            Self::Nak => "NAK",
        }
    }
}

impl TryFrom<u8> for ModemCommand {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::GetVersion),
            0x01 => Ok(Self::GetStatus),
            0x02 => Ok(Self::SetConfig),
            0x03 => Ok(Self::SetMode),
            0x04 => Ok(Self::SetRxFreq),
            0x05 => Ok(Self::SetTxFreq),
            0x0A => Ok(Self::SendCwId),
            0x31 => Ok(Self::P25Data),
            0x32 => Ok(Self::P25Lost),
            0x70 => Ok(Self::Ack),
            0x7F => Ok(Self::Nak),
            other => Err(other),
        }
    }
}

/// Modem operating modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemMode {
    Idle = 0,
    P25 = 4,
}

impl ModemMode {
    /// Wire value of this mode
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A single modem frame
///
/// The command is kept as a raw byte so frames with command codes this
/// crate does not know still decode and can be logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemFrame {
    /// Command code
    pub command: u8,
    /// Payload bytes following the command
    pub payload: Vec<u8>,
}

impl ModemFrame {
    /// Create a frame, rejecting payloads that do not fit the length byte
    pub fn new(command: ModemCommand, payload: Vec<u8>) -> Result<Self, ParseError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(ParseError::InvalidLength(payload.len() + MIN_FRAME_LEN));
        }
        Ok(Self {
            command: command.code(),
            payload,
        })
    }

    /// Create a frame with no payload
    pub fn command(command: ModemCommand) -> Self {
        Self {
            command: command.code(),
            payload: Vec::new(),
        }
    }

    /// Create a set-mode frame
    pub fn set_mode(mode: ModemMode) -> Self {
        Self {
            command: ModemCommand::SetMode.code(),
            payload: vec![mode.code()],
        }
    }

    /// Create a set-rx-frequency or set-tx-frequency frame
    pub fn frequency(command: ModemCommand, hz: u32) -> Self {
        Self {
            command: command.code(),
            payload: hz.to_be_bytes().to_vec(),
        }
    }

    /// Decoded command, if the code is known
    pub fn kind(&self) -> Option<ModemCommand> {
        ModemCommand::try_from(self.command).ok()
    }

    /// Value of the length byte for this frame
    pub fn wire_len(&self) -> usize {
        self.payload.len() + MIN_FRAME_LEN
    }

    /// Parse one complete frame
    ///
    /// `frame` must start with the start marker and hold exactly the number
    /// of bytes its length byte declares.
    pub fn parse(frame: &[u8]) -> Result<Self, ParseError> {
        if frame.len() < MIN_FRAME_LEN {
            return Err(ParseError::Incomplete {
                needed: MIN_FRAME_LEN - frame.len(),
            });
        }

        let len = frame[1] as usize;
        if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&len) {
            return Err(ParseError::InvalidLength(len));
        }
        if frame.len() < len {
            return Err(ParseError::Incomplete {
                needed: len - frame.len(),
            });
        }

        Ok(Self {
            command: frame[2],
            payload: frame[MIN_FRAME_LEN..len].to_vec(),
        })
    }
}

impl EncodeFrame for ModemFrame {
    fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.wire_len());
        frame.push(START_MARKER);
        frame.push(self.wire_len() as u8);
        frame.push(self.command);
        frame.extend_from_slice(&self.payload);
        frame
    }
}

/// Streaming modem frame decoder
#[derive(Debug)]
pub struct ModemCodec {
    buffer: Vec<u8>,
    discarded: usize,
}

impl ModemCodec {
    /// Create a new modem codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(512),
            discarded: 0,
        }
    }

    /// Bytes currently buffered and not yet decoded
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes dropped while resynchronizing
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    fn discard_one(&mut self) {
        self.buffer.remove(0);
        self.discarded += 1;
    }
}

impl Default for ModemCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec for ModemCodec {
    type Frame = ModemFrame;

    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    fn next_frame(&mut self) -> Option<Self::Frame> {
        self.next_frame_with_bytes().map(|(frame, _)| frame)
    }

    fn next_frame_with_bytes(&mut self) -> Option<(Self::Frame, Vec<u8>)> {
        while self.buffer.len() >= MIN_FRAME_LEN {
            if self.buffer[0] != START_MARKER {
                self.discard_one();
                continue;
            }

            let len = self.buffer[1] as usize;
            if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&len) {
                tracing::warn!("Invalid modem frame length {}, discarding", len);
                self.discard_one();
                continue;
            }

            if self.buffer.len() < len {
                return None;
            }

            let raw: Vec<u8> = self.buffer.drain(..len).collect();
            match ModemFrame::parse(&raw) {
                Ok(frame) => return Some((frame, raw)),
                Err(e) => {
                    // Length was validated above; the frame is already consumed either way
                    tracing::warn!("Failed to parse modem frame: {}", e);
                }
            }
        }

        None
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{ModemCodec, ModemCommand, ModemFrame, ModemMode, START_MARKER};
    use crate::{EncodeFrame, FrameCodec, ParseError};

    #[test]
    fn test_encode_set_mode() {
        let frame = ModemFrame::set_mode(ModemMode::P25);
        assert_eq!(frame.encode(), vec![0xE0, 0x04, 0x03, 0x04]);
    }

    #[test]
    fn test_encode_empty_command() {
        let frame = ModemFrame::command(ModemCommand::GetVersion);
        assert_eq!(frame.encode(), vec![0xE0, 0x03, 0x00]);
    }

    #[test]
    fn test_encode_frequency_big_endian() {
        let frame = ModemFrame::frequency(ModemCommand::SetRxFreq, 433_000_000);
        assert_eq!(
            frame.encode(),
            vec![0xE0, 0x07, 0x04, 0x19, 0xCF, 0x0E, 0x40]
        );
    }

    #[test]
    fn test_payload_too_large() {
        let result = ModemFrame::new(ModemCommand::P25Data, vec![0; 248]);
        assert_eq!(result, Err(ParseError::InvalidLength(251)));
        assert!(ModemFrame::new(ModemCommand::P25Data, vec![0; 247]).is_ok());
    }

    #[test]
    fn test_parse_ack() {
        let mut codec = ModemCodec::new();
        codec.push_bytes(&[0xE0, 0x04, 0x70, 0x02]);

        let frame = codec.next_frame().unwrap();
        assert_eq!(frame.kind(), Some(ModemCommand::Ack));
        assert_eq!(frame.payload, vec![0x02]);
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn test_streaming_parse() {
        let mut codec = ModemCodec::new();

        codec.push_bytes(&[0xE0, 0x06, 0x31]);
        assert!(codec.next_frame().is_none());

        codec.push_bytes(&[0x62, 0x00]);
        assert!(codec.next_frame().is_none());

        codec.push_bytes(&[0x01]);
        let frame = codec.next_frame().unwrap();
        assert_eq!(frame.kind(), Some(ModemCommand::P25Data));
        assert_eq!(frame.payload, vec![0x62, 0x00, 0x01]);
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut codec = ModemCodec::new();
        codec.push_bytes(&[0x11, 0x22, 0x33]);
        codec.push_bytes(&[0xE0, 0x05, 0x31, 0xAA, 0xBB]);

        let (frame, raw) = codec.next_frame_with_bytes().unwrap();
        assert_eq!(frame.payload, vec![0xAA, 0xBB]);
        assert_eq!(raw, vec![0xE0, 0x05, 0x31, 0xAA, 0xBB]);
        assert_eq!(codec.discarded(), 3);
    }

    #[test]
    fn test_length_too_small_discards_one_byte() {
        let mut codec = ModemCodec::new();
        // Declared length 2 is rejected; the following frame must still decode
        codec.push_bytes(&[START_MARKER, 0x02, START_MARKER, 0x03, 0x70]);

        let frame = codec.next_frame().unwrap();
        assert_eq!(frame.kind(), Some(ModemCommand::Ack));
        assert_eq!(codec.discarded(), 2);
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn test_length_too_large_does_not_stall() {
        let mut codec = ModemCodec::new();
        codec.push_bytes(&[START_MARKER, 251, 0x31, START_MARKER, 0x03, 0x7F]);

        let frame = codec.next_frame().unwrap();
        assert_eq!(frame.kind(), Some(ModemCommand::Nak));
        assert_eq!(codec.discarded(), 3);
    }

    #[test]
    fn test_unknown_command_still_decodes() {
        let mut codec = ModemCodec::new();
        codec.push_bytes(&[0xE0, 0x03, 0x55]);

        let frame = codec.next_frame().unwrap();
        assert_eq!(frame.command, 0x55);
        assert_eq!(frame.kind(), None);
    }

    #[test]
    fn test_back_to_back_frames_in_order() {
        let mut codec = ModemCodec::new();
        codec.push_bytes(&[0xE0, 0x04, 0x31, 0x01, 0xE0, 0x04, 0x31, 0x02]);

        assert_eq!(codec.next_frame().unwrap().payload, vec![0x01]);
        assert_eq!(codec.next_frame().unwrap().payload, vec![0x02]);
        assert!(codec.next_frame().is_none());
    }

    #[test]
    fn test_clear() {
        let mut codec = ModemCodec::new();
        codec.push_bytes(&[0xE0, 0x10, 0x31]);
        codec.clear();
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn test_parse_rejects_short_buffer() {
        assert_eq!(
            ModemFrame::parse(&[0xE0, 0x05, 0x31]),
            Err(ParseError::Incomplete { needed: 2 })
        );
    }
}
