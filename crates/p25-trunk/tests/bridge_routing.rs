//! Routing policy and call tracking with in-memory links

mod common;

use std::sync::Arc;

use p25_link::events::{self, EventReceiver};
use p25_link::{GatewayEvent, Origin, P25Config};
use p25_trunk::{CallState, TrunkingBridge};

use common::{tsbk, voice, MockModem, MockNetwork};

struct Harness {
    modem: Arc<MockModem>,
    network: Arc<MockNetwork>,
    bridge: Arc<TrunkingBridge>,
    events: EventReceiver,
}

impl Harness {
    fn new(modem_open: bool, authenticated: bool, trunking: bool) -> Self {
        let modem = MockModem::new(modem_open);
        let network = MockNetwork::new(authenticated);
        let (tx, events) = events::channel();
        let config = P25Config {
            trunking,
            ..P25Config::default()
        };
        let bridge = TrunkingBridge::new(config, modem.clone(), network.clone(), Some(tx));
        Self {
            modem,
            network,
            bridge,
            events,
        }
    }

    fn events(&mut self) -> Vec<GatewayEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

#[test]
fn test_registers_with_both_links() {
    let h = Harness::new(true, true, true);
    assert!(h.modem.has_handler());
    assert!(h.network.has_handler());
    assert!(h.bridge.is_running());
}

#[test]
fn test_rf_call_lifecycle() {
    let mut h = Harness::new(true, true, true);

    h.modem.deliver(&voice(0x62, 0x1234, 0x010203));
    h.modem.deliver(&voice(0x63, 0x1234, 0x010203));
    assert_eq!(
        h.bridge.call_state(),
        CallState {
            talkgroup: 0x1234,
            source: 0x010203,
            in_call: true
        }
    );

    h.modem.deliver(&[0x80]);
    assert_eq!(h.bridge.call_state(), CallState::default());

    // A second end of transmission changes nothing
    h.modem.deliver(&[0x80]);
    assert_eq!(h.bridge.call_state(), CallState::default());

    assert_eq!(
        h.events(),
        vec![
            GatewayEvent::CallStarted {
                talkgroup: 0x1234,
                source: 0x010203
            },
            GatewayEvent::CallEnded {
                talkgroup: 0x1234,
                source: 0x010203
            },
        ]
    );
}

#[test]
fn test_talkgroup_switch_mid_call_is_not_detected() {
    let mut h = Harness::new(true, true, true);

    h.modem.deliver(&voice(0x62, 100, 1));
    h.modem.deliver(&voice(0x62, 200, 2));
    assert_eq!(h.bridge.call_state().talkgroup, 100);
    assert_eq!(h.events().len(), 1);
}

#[test]
fn test_short_voice_frame_does_not_start_call() {
    let mut h = Harness::new(true, true, true);

    h.modem.deliver(&[0x62, 0x00, 0x00]);
    assert_eq!(h.bridge.call_state(), CallState::default());
    assert!(h.events().is_empty());
    // Still forwarded
    assert_eq!(h.network.sent(), vec![vec![0x62, 0x00, 0x00]]);
}

#[test]
fn test_rf_voice_forwarded_only_when_authenticated() {
    let h = Harness::new(true, false, true);

    let frame = voice(0x62, 10, 20);
    h.modem.deliver(&frame);
    assert!(h.network.sent().is_empty());
    // Call state is tracked regardless of the network
    assert!(h.bridge.call_state().in_call);

    h.network.set_authenticated(true);
    h.modem.deliver(&frame);
    h.modem.deliver(&[0x80]);
    assert_eq!(h.network.sent(), vec![frame, vec![0x80]]);
}

#[test]
fn test_rf_trunking_block_is_processed_not_forwarded() {
    let mut h = Harness::new(true, true, true);

    h.modem.deliver(&tsbk(12));
    assert!(h.network.sent().is_empty());
    assert!(h.modem.written().is_empty());
    assert_eq!(
        h.events(),
        vec![GatewayEvent::TrunkingControl {
            origin: Origin::Rf,
            frame_type: 0x61,
            len: 12
        }]
    );
}

#[test]
fn test_network_voice_forwarded_only_when_modem_open() {
    let h = Harness::new(false, true, true);

    let frame = voice(0x62, 10, 20);
    h.network.deliver(&frame);
    assert!(h.modem.written().is_empty());

    h.modem.set_open(true);
    h.network.deliver(&frame);
    assert_eq!(h.modem.written(), vec![frame]);
}

#[test]
fn test_network_voice_does_not_touch_call_state() {
    let mut h = Harness::new(true, true, true);

    h.network.deliver(&voice(0x62, 10, 20));
    assert_eq!(h.bridge.call_state(), CallState::default());

    h.modem.deliver(&voice(0x62, 30, 40));
    h.network.deliver(&[0x80]);
    // Network end of transmission does not end an RF call
    assert!(h.bridge.call_state().in_call);
    assert_eq!(h.modem.written(), vec![voice(0x62, 10, 20), vec![0x80]]);
    assert_eq!(h.events().len(), 1);
}

#[test]
fn test_network_trunking_forwarding_is_gated() {
    for (open, trunking, forwarded) in [
        (true, true, true),
        (true, false, false),
        (false, true, false),
        (false, false, false),
    ] {
        let mut h = Harness::new(open, true, trunking);
        h.network.deliver(&tsbk(16));

        assert_eq!(
            h.modem.written().len(),
            usize::from(forwarded),
            "open={} trunking={}",
            open,
            trunking
        );
        assert_eq!(
            h.events(),
            vec![GatewayEvent::TrunkingControl {
                origin: Origin::Network,
                frame_type: 0x61,
                len: 16
            }]
        );
    }
}

#[test]
fn test_short_network_trunking_block_still_forwarded() {
    let mut h = Harness::new(true, true, true);

    h.network.deliver(&tsbk(4));
    assert_eq!(h.modem.written(), vec![tsbk(4)]);
    assert!(h.events().is_empty());
}

#[test]
fn test_talkgroup_grant_and_release() {
    let mut h = Harness::new(true, true, true);

    let mut grant = vec![0xF4];
    grant.resize(12, 0x01);
    h.network.deliver(&grant);
    h.network.deliver(&[0xF5, 0x00, 0x10]);

    assert!(h.modem.written().is_empty());
    assert_eq!(h.bridge.call_state(), CallState::default());
    assert_eq!(
        h.events(),
        vec![
            GatewayEvent::TalkgroupGrant { len: 12 },
            GatewayEvent::TrunkingControl {
                origin: Origin::Network,
                frame_type: 0xF4,
                len: 12
            },
            GatewayEvent::TalkgroupRelease { len: 3 },
        ]
    );
}

#[test]
fn test_session_packets_are_ignored() {
    let mut h = Harness::new(true, true, true);

    let packets: [&[u8]; 5] = [&[0xF0], &[0xF1], &[0xF2, 0, 0, 0, 1, 0], &[0xF3, 0x01], &[]];
    for packet in packets {
        h.network.deliver(packet);
    }
    h.modem.deliver(&[0xF0]);
    h.modem.deliver(&[]);

    assert!(h.modem.written().is_empty());
    assert!(h.network.sent().is_empty());
    assert!(h.events().is_empty());
}

#[test]
fn test_stop_unregisters() {
    let mut h = Harness::new(true, true, true);

    h.bridge.stop();
    assert!(!h.bridge.is_running());
    assert!(!h.modem.has_handler());
    assert!(!h.network.has_handler());

    h.bridge.handle_modem_frame(&voice(0x62, 10, 20));
    h.bridge.handle_network_packet(&voice(0x62, 10, 20));
    assert!(h.network.sent().is_empty());
    assert!(h.modem.written().is_empty());
    assert!(h.events().is_empty());

    // Stopping twice is harmless
    h.bridge.stop();
}

#[test]
fn test_stopping_replaced_bridge_keeps_successor_registered() {
    let h = Harness::new(true, true, true);
    let successor = TrunkingBridge::new(
        P25Config::default(),
        h.modem.clone(),
        h.network.clone(),
        None,
    );

    h.bridge.stop();
    assert!(h.modem.has_handler());
    assert!(h.network.has_handler());

    // Frames now reach the successor only
    h.modem.deliver(&voice(0x62, 10, 20));
    assert!(successor.call_state().in_call);
    assert_eq!(h.bridge.call_state(), CallState::default());

    successor.stop();
    assert!(!h.modem.has_handler());
    assert!(!h.network.has_handler());
}

#[test]
fn test_dropped_bridge_is_not_kept_alive_by_links() {
    let h = Harness::new(true, true, true);
    let weak = Arc::downgrade(&h.bridge);
    let Harness {
        modem,
        network,
        bridge,
        ..
    } = h;
    drop(bridge);

    assert!(weak.upgrade().is_none());
    // Handlers still registered but route nowhere
    modem.deliver(&voice(0x62, 10, 20));
    network.deliver(&voice(0x62, 10, 20));
    assert!(network.sent().is_empty());
    assert!(modem.written().is_empty());
}

#[test]
fn test_concurrent_delivery_keeps_call_state_consistent() {
    let h = Harness::new(true, true, true);

    let rf = {
        let modem = h.modem.clone();
        std::thread::spawn(move || {
            for i in 0..500u16 {
                modem.deliver(&voice(0x62, i % 7 + 1, 99));
                modem.deliver(&[0x80]);
            }
        })
    };
    let net = {
        let network = h.network.clone();
        std::thread::spawn(move || {
            for _ in 0..500 {
                network.deliver(&voice(0x64, 5, 6));
                network.deliver(&[0x80]);
            }
        })
    };
    rf.join().unwrap();
    net.join().unwrap();

    assert_eq!(h.bridge.call_state(), CallState::default());
    assert_eq!(h.modem.written().len(), 1000);
    assert_eq!(h.network.sent().len(), 1000);
}
