//! P25 Reflector UDP Protocol
//!
//! The reflector exchanges one packet per UDP datagram, so there is no
//! framing or reassembly: the datagram boundary is the packet boundary.
//!
//! # Packet Format
//! ```text
//! [type] [payload...]
//! ```
//!
//! | Type        | Meaning                                   |
//! |-------------|-------------------------------------------|
//! | `F0`        | Poll (keepalive)                          |
//! | `F1`        | Unlink                                    |
//! | `F2`        | Auth request: radio id (BE u32), password, `00` |
//! | `F3`        | Auth response: `01` accepted, else rejected |
//! | `F4` / `F5` | Talkgroup grant / release                 |
//! | `61`        | Trunking control (TSBK)                   |
//! | `62`..`7F`  | Voice (LDU1/LDU2)                         |
//! | `80`        | End of transmission                       |
//!
//! Voice and trunking frames use the same layout whether they arrive from
//! the modem or from the reflector, so the helpers here apply to both.

use crate::error::ParseError;
use crate::EncodeFrame;

/// Poll / keepalive packet type
pub const POLL: u8 = 0xF0;
/// Unlink packet type
pub const UNLINK: u8 = 0xF1;
/// Authentication request packet type
pub const AUTH_REQUEST: u8 = 0xF2;
/// Authentication response packet type
pub const AUTH_RESPONSE: u8 = 0xF3;
/// Talkgroup grant notification
pub const TALKGROUP_GRANT: u8 = 0xF4;
/// Talkgroup release notification
pub const TALKGROUP_RELEASE: u8 = 0xF5;
/// Trunking signalling block
pub const TSBK: u8 = 0x61;
/// First voice frame type (LDU1 part 0)
pub const VOICE_FRAME_MIN: u8 = 0x62;
/// Last value of the voice range; shared with end-of-transmission
pub const VOICE_FRAME_MAX: u8 = 0x80;
/// End of transmission
pub const END_OF_TRANSMISSION: u8 = 0x80;

/// Offset of the 16-bit talkgroup id in a voice frame
const TALKGROUP_OFFSET: usize = 5;
/// Offset of the 24-bit source id in a voice frame
const SOURCE_OFFSET: usize = 7;

/// Classified packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Poll,
    Unlink,
    AuthRequest,
    AuthResponse,
    TalkgroupGrant,
    TalkgroupRelease,
    /// Trunking control block
    Tsbk,
    /// Voice frame, carrying the raw type byte
    Voice(u8),
    EndOfTransmission,
    /// Anything else, carrying the raw type byte
    Unknown(u8),
}

impl PacketType {
    /// Classify a type byte
    ///
    /// End-of-transmission is tested before the voice range, since `0x80`
    /// is the last value of that range.
    pub fn from_byte(value: u8) -> Self {
        match value {
            POLL => Self::Poll,
            UNLINK => Self::Unlink,
            AUTH_REQUEST => Self::AuthRequest,
            AUTH_RESPONSE => Self::AuthResponse,
            TALKGROUP_GRANT => Self::TalkgroupGrant,
            TALKGROUP_RELEASE => Self::TalkgroupRelease,
            TSBK => Self::Tsbk,
            END_OF_TRANSMISSION => Self::EndOfTransmission,
            v if is_voice_frame(v) => Self::Voice(v),
            v => Self::Unknown(v),
        }
    }

    /// Classify a packet by its first byte; `None` for an empty packet
    pub fn of(packet: &[u8]) -> Option<Self> {
        frame_type(packet).map(Self::from_byte)
    }

    /// Returns a short name for log output
    pub fn name(&self) -> &'static str {
        match self {
            Self::Poll => "POLL",
            Self::Unlink => "UNLINK",
            Self::AuthRequest => "AUTH_REQUEST",
            Self::AuthResponse => "AUTH_RESPONSE",
            Self::TalkgroupGrant => "TG_GRANT",
            Self::TalkgroupRelease => "TG_RELEASE",
            Self::Tsbk => "TSBK",
            Self::Voice(_) => "VOICE",
            Self::EndOfTransmission => "EOT",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

/// A reflector packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectorPacket {
    /// Type byte
    pub packet_type: u8,
    /// Bytes after the type byte
    pub payload: Vec<u8>,
}

impl ReflectorPacket {
    /// Split a datagram into type and payload; `None` for an empty datagram
    pub fn from_datagram(data: &[u8]) -> Option<Self> {
        let (&packet_type, payload) = data.split_first()?;
        Some(Self {
            packet_type,
            payload: payload.to_vec(),
        })
    }

    /// Classified type of this packet
    pub fn kind(&self) -> PacketType {
        PacketType::from_byte(self.packet_type)
    }
}

impl EncodeFrame for ReflectorPacket {
    fn encode(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(self.payload.len() + 1);
        packet.push(self.packet_type);
        packet.extend_from_slice(&self.payload);
        packet
    }
}

/// Build an authentication request
///
/// Layout: `F2`, radio id as big-endian u32, password bytes, `00`.
pub fn build_auth_request(radio_id: u32, password: &str) -> Vec<u8> {
    let mut packet = Vec::with_capacity(password.len() + 6);
    packet.push(AUTH_REQUEST);
    packet.extend_from_slice(&radio_id.to_be_bytes());
    packet.extend_from_slice(password.as_bytes());
    packet.push(0x00);
    packet
}

/// Parse an authentication request into radio id and password
///
/// The password runs up to the first zero byte; a missing terminator is
/// tolerated.
pub fn parse_auth_request(data: &[u8]) -> Result<(u32, String), ParseError> {
    if data.len() < 5 {
        return Err(ParseError::TooShort {
            needed: 5,
            actual: data.len(),
        });
    }

    if data[0] != AUTH_REQUEST {
        return Err(ParseError::UnexpectedType {
            expected: AUTH_REQUEST,
            actual: data[0],
        });
    }

    let radio_id = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
    let secret = &data[5..];
    let end = secret.iter().position(|&b| b == 0).unwrap_or(secret.len());
    let password = String::from_utf8_lossy(&secret[..end]).into_owned();

    Ok((radio_id, password))
}

/// Build a poll (keepalive) packet
pub fn build_poll() -> Vec<u8> {
    vec![POLL]
}

/// Build an unlink packet
pub fn build_unlink() -> Vec<u8> {
    vec![UNLINK]
}

/// Parse an authentication response
///
/// Returns whether the reflector accepted the login. Fails on a packet
/// shorter than two bytes or with a type other than auth-response.
pub fn parse_auth_response(data: &[u8]) -> Result<bool, ParseError> {
    if data.len() < 2 {
        return Err(ParseError::TooShort {
            needed: 2,
            actual: data.len(),
        });
    }

    if data[0] != AUTH_RESPONSE {
        return Err(ParseError::UnexpectedType {
            expected: AUTH_RESPONSE,
            actual: data[0],
        });
    }

    Ok(data[1] == 0x01)
}

/// Check whether a type byte falls in the voice range (`0x62..=0x80`)
pub fn is_voice_frame(frame_type: u8) -> bool {
    (VOICE_FRAME_MIN..=VOICE_FRAME_MAX).contains(&frame_type)
}

/// Type byte of a packet; `None` for an empty packet
pub fn frame_type(data: &[u8]) -> Option<u8> {
    data.first().copied()
}

/// Extract the 16-bit talkgroup id (bytes 5-6, big-endian)
///
/// Returns 0 when the frame is shorter than 7 bytes.
pub fn extract_talkgroup(data: &[u8]) -> u32 {
    match data.get(TALKGROUP_OFFSET..TALKGROUP_OFFSET + 2) {
        Some(tg) => u32::from(u16::from_be_bytes([tg[0], tg[1]])),
        None => 0,
    }
}

/// Extract the 24-bit source id (bytes 7-9, big-endian)
///
/// Returns 0 when the frame is shorter than 10 bytes.
pub fn extract_source(data: &[u8]) -> u32 {
    match data.get(SOURCE_OFFSET..SOURCE_OFFSET + 3) {
        Some(src) => u32::from_be_bytes([0, src[0], src[1], src[2]]),
        None => 0,
    }
}
