//! P25 Hotspot Links
//!
//! The two transports a hotspot bridges between:
//!
//! - [`ModemLink`]: serial link to an MMDVM modem, with a background read
//!   loop and a blocking command/ACK primitive
//! - [`ReflectorLink`]: UDP session with a reflector, with authentication,
//!   a receive loop and a keepalive loop
//!
//! Each link delivers inbound frames to at most one registered handler,
//! synchronously on its own I/O thread. Link failures are reported on the
//! [`GatewayEvent`] channel.
//!
//! [`RfLink`] and [`NetLink`] are the seams the routing layer programs
//! against, so it can be tested without hardware or a network.

pub mod config;
pub mod error;
pub mod events;
pub mod modem;
pub mod reflector;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use config::{ModemConfig, P25Config, ReflectorConfig};
pub use error::LinkError;
pub use events::{EventReceiver, EventSender, GatewayEvent, Origin};
pub use modem::{FirmwareVersion, ModemLink};
pub use reflector::ReflectorLink;

/// Consumer for P25 frames received from the modem
pub type FrameHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Consumer for datagrams received from the reflector
pub type PacketHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// The RF side of the gateway
pub trait RfLink: Send + Sync {
    /// Whether frames can be written
    fn is_open(&self) -> bool;

    /// Queue a P25 frame for transmission
    fn write_data(&self, data: &[u8]) -> Result<(), LinkError>;

    /// Register the inbound frame consumer
    fn set_frame_handler(&self, handler: FrameHandler);

    /// Remove `handler` if it is still the registered consumer
    fn remove_frame_handler(&self, handler: &FrameHandler);
}

/// The network side of the gateway
pub trait NetLink: Send + Sync {
    /// Whether packets will be accepted by the reflector
    fn is_authenticated(&self) -> bool;

    /// Send a raw packet
    fn send(&self, data: &[u8]) -> Result<(), LinkError>;

    /// Register the inbound packet consumer
    fn set_packet_handler(&self, handler: PacketHandler);

    /// Remove `handler` if it is still the registered consumer
    fn remove_packet_handler(&self, handler: &PacketHandler);
}

impl RfLink for ModemLink {
    fn is_open(&self) -> bool {
        ModemLink::is_open(self)
    }

    fn write_data(&self, data: &[u8]) -> Result<(), LinkError> {
        ModemLink::write_data(self, data)
    }

    fn set_frame_handler(&self, handler: FrameHandler) {
        ModemLink::set_frame_handler(self, handler)
    }

    fn remove_frame_handler(&self, handler: &FrameHandler) {
        ModemLink::remove_frame_handler(self, handler)
    }
}

impl NetLink for ReflectorLink {
    fn is_authenticated(&self) -> bool {
        ReflectorLink::is_authenticated(self)
    }

    fn send(&self, data: &[u8]) -> Result<(), LinkError> {
        ReflectorLink::send(self, data)
    }

    fn set_packet_handler(&self, handler: PacketHandler) {
        ReflectorLink::set_packet_handler(self, handler)
    }

    fn remove_packet_handler(&self, handler: &PacketHandler) {
        ReflectorLink::remove_packet_handler(self, handler)
    }
}

// The guarded values are flags, handles and buffers that stay valid if a
// holder panicked, so poisoning is ignored.

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
