//! Frame routing between the modem and the reflector
//!
//! The bridge registers itself as the inbound consumer of both links when
//! it is created and routes every frame synchronously on the thread that
//! delivered it. The two links deliver concurrently, so the call state is
//! kept behind a single lock and every transition happens inside it.
//!
//! Handlers capture a weak reference, so the links never keep the bridge
//! alive on their own. `stop()` removes only this bridge's handlers, so a
//! bridge replaced on the same links cannot unhook its successor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use p25_link::events::{emit, EventSender, GatewayEvent, Origin};
use p25_link::{FrameHandler, NetLink, P25Config, PacketHandler, RfLink};
use p25_protocol::reflector::{extract_source, extract_talkgroup};
use p25_protocol::PacketType;
use tracing::{debug, info, trace, warn};

use crate::state::CallState;

/// Shortest trunking block that carries an opcode and arguments
pub const MIN_TSBK_LEN: usize = 12;

/// Routes frames between the RF and network sides
pub struct TrunkingBridge {
    config: P25Config,
    modem: Arc<dyn RfLink>,
    network: Arc<dyn NetLink>,
    call: Mutex<CallState>,
    running: AtomicBool,
    events: Option<EventSender>,
    frame_handler: FrameHandler,
    packet_handler: PacketHandler,
}

impl TrunkingBridge {
    /// Create a bridge and register it with both links
    pub fn new(
        config: P25Config,
        modem: Arc<dyn RfLink>,
        network: Arc<dyn NetLink>,
        events: Option<EventSender>,
    ) -> Arc<Self> {
        let bridge = Arc::new_cyclic(|weak: &Weak<Self>| {
            let rf = weak.clone();
            let frame_handler: FrameHandler = Arc::new(move |frame: &[u8]| {
                if let Some(bridge) = rf.upgrade() {
                    bridge.handle_modem_frame(frame);
                }
            });

            let net = weak.clone();
            let packet_handler: PacketHandler = Arc::new(move |packet: &[u8]| {
                if let Some(bridge) = net.upgrade() {
                    bridge.handle_network_packet(packet);
                }
            });

            Self {
                config,
                modem,
                network,
                call: Mutex::new(CallState::default()),
                running: AtomicBool::new(true),
                events,
                frame_handler,
                packet_handler,
            }
        });

        bridge
            .modem
            .set_frame_handler(Arc::clone(&bridge.frame_handler));
        bridge
            .network
            .set_packet_handler(Arc::clone(&bridge.packet_handler));

        info!(
            "Trunking bridge started (NAC 0x{:03X}, trunking {})",
            bridge.config.nac,
            if bridge.config.trunking { "on" } else { "off" }
        );
        bridge
    }

    /// Unregister from both links; later frames are not routed
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.modem.remove_frame_handler(&self.frame_handler);
        self.network.remove_packet_handler(&self.packet_handler);
        info!("Trunking bridge stopped");
    }

    /// Whether the bridge is routing
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Snapshot of the current call
    pub fn call_state(&self) -> CallState {
        *self.call()
    }

    fn call(&self) -> MutexGuard<'_, CallState> {
        self.call.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route a P25 frame received over RF
    pub fn handle_modem_frame(&self, frame: &[u8]) {
        if !self.is_running() {
            return;
        }
        let Some(kind) = PacketType::of(frame) else {
            return;
        };

        match kind {
            PacketType::Voice(_) => {
                self.track_voice(frame);
                self.forward_to_network(frame);
            }
            PacketType::Tsbk => self.process_tsbk(Origin::Rf, frame),
            PacketType::EndOfTransmission => {
                self.end_call();
                self.forward_to_network(frame);
            }
            other => trace!("Ignoring {} frame from modem", other.name()),
        }
    }

    /// Route a packet received from the reflector
    pub fn handle_network_packet(&self, packet: &[u8]) {
        if !self.is_running() {
            return;
        }
        let Some(kind) = PacketType::of(packet) else {
            return;
        };

        match kind {
            // Session traffic is handled inside the reflector link
            PacketType::AuthRequest | PacketType::AuthResponse | PacketType::Poll => {}
            PacketType::Unlink => debug!("Reflector sent unlink"),
            PacketType::Voice(_) => self.forward_to_modem(packet),
            PacketType::TalkgroupGrant => {
                info!("Talkgroup grant from network ({} bytes)", packet.len());
                emit(
                    self.events.as_ref(),
                    GatewayEvent::TalkgroupGrant { len: packet.len() },
                );
                self.process_tsbk(Origin::Network, packet);
            }
            PacketType::TalkgroupRelease => {
                info!("Talkgroup release from network");
                emit(
                    self.events.as_ref(),
                    GatewayEvent::TalkgroupRelease { len: packet.len() },
                );
            }
            PacketType::Tsbk => {
                self.process_tsbk(Origin::Network, packet);
                if self.config.trunking {
                    self.forward_to_modem(packet);
                }
            }
            PacketType::EndOfTransmission => self.forward_to_modem(packet),
            PacketType::Unknown(value) => {
                trace!("Ignoring unknown packet 0x{:02X} from network", value)
            }
        }
    }

    fn track_voice(&self, frame: &[u8]) {
        let talkgroup = extract_talkgroup(frame);
        let source = extract_source(frame);

        let mut call = self.call();
        if call.start(talkgroup, source) {
            info!("Call started: TG {} from {}", talkgroup, source);
            emit(
                self.events.as_ref(),
                GatewayEvent::CallStarted { talkgroup, source },
            );
        }
    }

    fn end_call(&self) {
        let mut call = self.call();
        if let Some(ended) = call.end() {
            info!("End of transmission on TG {}", ended.talkgroup);
            emit(
                self.events.as_ref(),
                GatewayEvent::CallEnded {
                    talkgroup: ended.talkgroup,
                    source: ended.source,
                },
            );
        }
    }

    fn process_tsbk(&self, origin: Origin, frame: &[u8]) {
        if frame.len() < MIN_TSBK_LEN {
            debug!(
                "Short trunking block from {:?} ({} bytes), skipping",
                origin,
                frame.len()
            );
            return;
        }

        let frame_type = frame[0];
        debug!(
            "Processing trunking block 0x{:02X} from {:?} ({} bytes)",
            frame_type,
            origin,
            frame.len()
        );
        emit(
            self.events.as_ref(),
            GatewayEvent::TrunkingControl {
                origin,
                frame_type,
                len: frame.len(),
            },
        );
    }

    fn forward_to_network(&self, frame: &[u8]) {
        if !self.network.is_authenticated() {
            trace!("Reflector not authenticated, dropping RF frame");
            return;
        }
        if let Err(e) = self.network.send(frame) {
            warn!("Failed to forward frame to reflector: {}", e);
        }
    }

    fn forward_to_modem(&self, frame: &[u8]) {
        if !self.modem.is_open() {
            trace!("Modem not open, dropping network frame");
            return;
        }
        if let Err(e) = self.modem.write_data(frame) {
            warn!("Failed to forward frame to modem: {}", e);
        }
    }
}
