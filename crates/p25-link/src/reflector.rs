//! UDP link to the P25 reflector
//!
//! `start()` resolves and connects the socket, then authenticates before any
//! background work begins. Once authenticated two threads run:
//!
//! - **receive**: blocks on the socket with a short timeout and hands every
//!   datagram to the registered packet handler
//! - **keepalive**: sends a poll each interval while authenticated, waiting
//!   on a stop channel so `stop()` does not sit out the interval
//!
//! A hard receive error clears the connected and authenticated flags and is
//! reported on the event channel.

use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use p25_protocol::reflector::{build_auth_request, build_poll, build_unlink, parse_auth_response};
use p25_protocol::ParseError;
use tracing::{debug, error, info, trace, warn};

use crate::config::ReflectorConfig;
use crate::error::LinkError;
use crate::events::{emit, EventSender, GatewayEvent};
use crate::{lock, read_lock, write_lock, PacketHandler};

/// Largest datagram we expect from the reflector
const MAX_DATAGRAM: usize = 2048;

/// State shared with the background threads
struct Shared {
    running: AtomicBool,
    connected: AtomicBool,
    authenticated: AtomicBool,
    socket: Mutex<Option<UdpSocket>>,
    handler: RwLock<Option<PacketHandler>>,
}

impl Shared {
    fn send(&self, data: &[u8]) -> Result<(), LinkError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(LinkError::NotConnected);
        }

        let socket = lock(&self.socket);
        let socket = socket.as_ref().ok_or(LinkError::NotConnected)?;
        let sent = socket.send(data)?;
        if sent != data.len() {
            return Err(LinkError::ShortWrite {
                sent,
                expected: data.len(),
            });
        }
        trace!("Sent {} bytes to reflector", sent);
        Ok(())
    }

    fn clear_session(&self) {
        self.connected.store(false, Ordering::Release);
        self.authenticated.store(false, Ordering::Release);
    }
}

/// Background threads and the channel that stops them
struct Workers {
    stop_tx: mpsc::Sender<()>,
    receive: JoinHandle<()>,
    keepalive: JoinHandle<()>,
}

/// UDP link to the reflector
pub struct ReflectorLink {
    config: ReflectorConfig,
    shared: Arc<Shared>,
    workers: Mutex<Option<Workers>>,
    events: Option<EventSender>,
}

impl ReflectorLink {
    /// Create a stopped link
    pub fn new(config: ReflectorConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                authenticated: AtomicBool::new(false),
                socket: Mutex::new(None),
                handler: RwLock::new(None),
            }),
            workers: Mutex::new(None),
            events: None,
        }
    }

    /// Attach the gateway event channel
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Connect, authenticate and start the background threads
    ///
    /// Any failure leaves the socket closed and both flags false.
    pub fn start(&self) -> Result<(), LinkError> {
        let mut workers = lock(&self.workers);
        if let Some(stale) = workers.take() {
            if self.is_connected() {
                *workers = Some(stale);
                return Ok(());
            }
            // The receive loop exited on an error; tear the old session down
            debug!("Restarting reflector link after link loss");
            self.shutdown_workers(stale);
        }

        let addr = resolve(&self.config.address, self.config.port)?;
        info!("Connecting to reflector {} ({})", self.config.address, addr);

        let bind_addr: SocketAddr = if addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_read_timeout(Some(self.config.receive_timeout()))?;
        socket.connect(addr)?;
        let receiver = socket.try_clone()?;

        *lock(&self.shared.socket) = Some(socket);
        self.shared.connected.store(true, Ordering::Release);

        if let Err(e) = self.authenticate(&receiver) {
            error!("Reflector authentication failed: {}", e);
            self.shared.clear_session();
            lock(&self.shared.socket).take();
            return Err(e);
        }

        self.shared.running.store(true, Ordering::Release);
        let (stop_tx, stop_rx) = mpsc::channel();

        let shared = Arc::clone(&self.shared);
        let events = self.events.clone();
        let receive = thread::Builder::new()
            .name("reflector-rx".to_string())
            .spawn(move || run_receive_loop(shared, receiver, events));

        let shared = Arc::clone(&self.shared);
        let interval = self.config.keepalive();
        let keepalive = thread::Builder::new()
            .name("reflector-keepalive".to_string())
            .spawn(move || run_keepalive_loop(shared, interval, stop_rx));

        match (receive, keepalive) {
            (Ok(receive), Ok(keepalive)) => {
                *workers = Some(Workers {
                    stop_tx,
                    receive,
                    keepalive,
                });
                info!("Reflector link up");
                Ok(())
            }
            (receive, keepalive) => {
                self.shared.running.store(false, Ordering::Release);
                drop(stop_tx);
                let mut spawn_error = None;
                for spawned in [receive, keepalive] {
                    match spawned {
                        Ok(handle) => {
                            let _ = handle.join();
                        }
                        Err(e) => spawn_error = Some(e),
                    }
                }
                self.shared.clear_session();
                lock(&self.shared.socket).take();
                Err(spawn_error
                    .map(LinkError::Io)
                    .unwrap_or(LinkError::NotConnected))
            }
        }
    }

    fn authenticate(&self, socket: &UdpSocket) -> Result<(), LinkError> {
        info!(
            "Authenticating as {} (radio id {})",
            self.config.callsign, self.config.radio_id
        );
        self.shared
            .send(&build_auth_request(self.config.radio_id, &self.config.password))?;

        let timeout = self.config.auth_timeout();
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; MAX_DATAGRAM];

        while Instant::now() < deadline {
            let n = match socket.recv(&mut buf) {
                Ok(n) => n,
                Err(e) if is_timeout(&e) => continue,
                Err(e) => return Err(LinkError::Io(e)),
            };

            match parse_auth_response(&buf[..n]) {
                Ok(true) => {
                    self.shared.authenticated.store(true, Ordering::Release);
                    info!("Authenticated with reflector");
                    return Ok(());
                }
                Ok(false) => return Err(LinkError::AuthRejected),
                Err(ParseError::UnexpectedType { actual, .. }) => {
                    trace!("Discarding 0x{:02X} packet while authenticating", actual);
                }
                Err(e) => warn!("Malformed auth response: {}", e),
            }
        }

        Err(LinkError::AuthTimeout {
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    /// Unlink, stop the background threads and close the socket
    ///
    /// Does nothing when the link is not running.
    pub fn stop(&self) {
        let Some(workers) = lock(&self.workers).take() else {
            return;
        };

        info!("Disconnecting from reflector");
        if self.is_authenticated() {
            if let Err(e) = self.shared.send(&build_unlink()) {
                warn!("Failed to send unlink: {}", e);
            }
        }

        self.shutdown_workers(workers);
        info!("Reflector link down");
    }

    /// Stop and join both threads, then close the socket
    fn shutdown_workers(&self, workers: Workers) {
        self.shared.running.store(false, Ordering::Release);
        drop(workers.stop_tx);
        if workers.keepalive.join().is_err() {
            error!("Reflector keepalive thread panicked");
        }
        if workers.receive.join().is_err() {
            error!("Reflector receive thread panicked");
        }

        self.shared.clear_session();
        lock(&self.shared.socket).take();
    }

    /// Send a raw packet to the reflector
    pub fn send(&self, data: &[u8]) -> Result<(), LinkError> {
        self.shared.send(data)
    }

    /// Whether the socket is connected
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Whether the reflector accepted our login
    pub fn is_authenticated(&self) -> bool {
        self.shared.authenticated.load(Ordering::Acquire)
    }

    /// Register the consumer for inbound packets, replacing any previous one
    pub fn set_packet_handler(&self, handler: PacketHandler) {
        *write_lock(&self.shared.handler) = Some(handler);
    }

    /// Remove the inbound packet consumer
    pub fn clear_packet_handler(&self) {
        write_lock(&self.shared.handler).take();
    }

    /// Remove `handler` if it is still the registered consumer
    pub fn remove_packet_handler(&self, handler: &PacketHandler) {
        let mut current = write_lock(&self.shared.handler);
        if current.as_ref().is_some_and(|h| Arc::ptr_eq(h, handler)) {
            current.take();
        }
    }
}

impl Drop for ReflectorLink {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Resolve a host name or address; the first result wins
fn resolve(address: &str, port: u16) -> Result<SocketAddr, LinkError> {
    (address, port)
        .to_socket_addrs()
        .map_err(|_| LinkError::AddressResolution(address.to_string()))?
        .next()
        .ok_or_else(|| LinkError::AddressResolution(address.to_string()))
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

fn run_receive_loop(shared: Arc<Shared>, socket: UdpSocket, events: Option<EventSender>) {
    debug!("Reflector receive loop started");
    let mut buf = [0u8; MAX_DATAGRAM];

    while shared.running.load(Ordering::Acquire) {
        match socket.recv(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                trace!("Received {} bytes from reflector", n);
                let handler = read_lock(&shared.handler).clone();
                if let Some(handler) = handler {
                    handler(&buf[..n]);
                }
            }
            Err(e) if is_timeout(&e) => {}
            Err(e) => {
                error!("Reflector receive failed: {}", e);
                shared.clear_session();
                emit(
                    events.as_ref(),
                    GatewayEvent::ReflectorLinkLost {
                        reason: e.to_string(),
                    },
                );
                break;
            }
        }
    }

    debug!("Reflector receive loop stopped");
}

fn run_keepalive_loop(shared: Arc<Shared>, interval: Duration, stop_rx: mpsc::Receiver<()>) {
    debug!("Reflector keepalive loop started ({:?})", interval);

    loop {
        if shared.authenticated.load(Ordering::Acquire) {
            match shared.send(&build_poll()) {
                Ok(()) => debug!("Sent keepalive"),
                Err(e) => warn!("Failed to send keepalive: {}", e),
            }
        }

        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("Reflector keepalive loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_literal_address() {
        let addr = resolve("127.0.0.1", 41000).unwrap();
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 41000)));
    }

    #[test]
    fn test_stopped_link_rejects_sends() {
        let link = ReflectorLink::new(ReflectorConfig::default());
        assert!(!link.is_connected());
        assert!(!link.is_authenticated());
        assert!(matches!(link.send(&[0xF0]), Err(LinkError::NotConnected)));
        link.stop();
    }
}
