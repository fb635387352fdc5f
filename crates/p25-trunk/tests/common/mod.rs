//! In-memory links for bridge tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use p25_link::{FrameHandler, LinkError, NetLink, PacketHandler, RfLink};

#[derive(Default)]
pub struct MockModem {
    open: AtomicBool,
    written: Mutex<Vec<Vec<u8>>>,
    handler: Mutex<Option<FrameHandler>>,
}

impl MockModem {
    pub fn new(open: bool) -> Arc<Self> {
        let modem = Self::default();
        modem.open.store(open, Ordering::SeqCst);
        Arc::new(modem)
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    /// Feed a frame as if it came over RF
    pub fn deliver(&self, frame: &[u8]) {
        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(frame);
        }
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }

    pub fn has_handler(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }
}

impl RfLink for MockModem {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn write_data(&self, data: &[u8]) -> Result<(), LinkError> {
        if !self.is_open() {
            return Err(LinkError::NotOpen);
        }
        self.written.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    fn set_frame_handler(&self, handler: FrameHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    fn remove_frame_handler(&self, handler: &FrameHandler) {
        let mut current = self.handler.lock().unwrap();
        if current.as_ref().is_some_and(|h| Arc::ptr_eq(h, handler)) {
            current.take();
        }
    }
}

#[derive(Default)]
pub struct MockNetwork {
    authenticated: AtomicBool,
    sent: Mutex<Vec<Vec<u8>>>,
    handler: Mutex<Option<PacketHandler>>,
}

impl MockNetwork {
    pub fn new(authenticated: bool) -> Arc<Self> {
        let network = Self::default();
        network.authenticated.store(authenticated, Ordering::SeqCst);
        Arc::new(network)
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    /// Feed a packet as if it came from the reflector
    pub fn deliver(&self, packet: &[u8]) {
        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(packet);
        }
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn has_handler(&self) -> bool {
        self.handler.lock().unwrap().is_some()
    }
}

impl NetLink for MockNetwork {
    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    fn send(&self, data: &[u8]) -> Result<(), LinkError> {
        self.sent.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    fn set_packet_handler(&self, handler: PacketHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    fn remove_packet_handler(&self, handler: &PacketHandler) {
        let mut current = self.handler.lock().unwrap();
        if current.as_ref().is_some_and(|h| Arc::ptr_eq(h, handler)) {
            current.take();
        }
    }
}

/// A voice frame carrying the given talkgroup and source
pub fn voice(frame_type: u8, talkgroup: u16, source: u32) -> Vec<u8> {
    let tg = talkgroup.to_be_bytes();
    let src = source.to_be_bytes();
    let mut frame = vec![frame_type, 0x00, 0x00, 0x00, 0x00];
    frame.extend_from_slice(&tg);
    frame.extend_from_slice(&src[1..]);
    frame.extend_from_slice(&[0xAA; 8]);
    frame
}

/// A trunking block of the given length
pub fn tsbk(len: usize) -> Vec<u8> {
    let mut frame = vec![0x61];
    frame.resize(len, 0x55);
    frame
}
