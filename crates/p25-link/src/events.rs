//! Unified event stream for the gateway
//!
//! Link failures and call activity are reported through one unbounded
//! channel. Sending never blocks, so the I/O threads can emit freely; the
//! receiver is the process supervisor (or a test).

use tokio::sync::mpsc;

/// Sending half of the gateway event channel
pub type EventSender = mpsc::UnboundedSender<GatewayEvent>;

/// Receiving half of the gateway event channel
pub type EventReceiver = mpsc::UnboundedReceiver<GatewayEvent>;

/// Which side of the gateway a frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Received over the air via the modem
    Rf,
    /// Received from the reflector
    Network,
}

/// Events emitted by the links and the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    // -------------------------------------------------------------------------
    // Call activity
    // -------------------------------------------------------------------------
    /// An RF voice transmission started on a talkgroup
    CallStarted {
        /// Talkgroup id
        talkgroup: u32,
        /// Source radio id
        source: u32,
    },

    /// The RF voice transmission ended
    CallEnded {
        /// Talkgroup id of the finished call
        talkgroup: u32,
        /// Source radio id of the finished call
        source: u32,
    },

    /// A trunking control block was processed
    TrunkingControl {
        /// Side the block arrived from
        origin: Origin,
        /// Frame type byte
        frame_type: u8,
        /// Frame length in bytes
        len: usize,
    },

    /// The reflector granted a talkgroup
    TalkgroupGrant {
        /// Packet length in bytes
        len: usize,
    },

    /// The reflector released a talkgroup
    TalkgroupRelease {
        /// Packet length in bytes
        len: usize,
    },

    // -------------------------------------------------------------------------
    // Link failures
    // -------------------------------------------------------------------------
    /// The modem read loop hit a hard I/O error
    ModemLinkLost {
        /// Error description
        reason: String,
    },

    /// The reflector receive loop hit a hard I/O error
    ReflectorLinkLost {
        /// Error description
        reason: String,
    },
}

impl GatewayEvent {
    /// Whether this event means a link is gone
    pub fn is_link_lost(&self) -> bool {
        matches!(
            self,
            Self::ModemLinkLost { .. } | Self::ReflectorLinkLost { .. }
        )
    }
}

/// Send an event if a channel is attached; a closed channel is ignored
pub fn emit(events: Option<&EventSender>, event: GatewayEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

/// Create a new gateway event channel
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
