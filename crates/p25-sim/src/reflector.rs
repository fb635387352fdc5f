//! Mock P25 reflector
//!
//! Binds a loopback UDP socket and serves one client at a time: the last
//! address that sent a datagram is the peer that [`MockReflector::send_to_client`]
//! talks to.

use std::io::{self, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use p25_protocol::reflector::{parse_auth_request, AUTH_RESPONSE};
use p25_protocol::PacketType;
use tracing::debug;

/// How the mock answers auth requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Reply with success
    Accept,
    /// Send a poll first, then reply with success
    AcceptAfterNoise,
    /// Reply with failure
    Reject,
    /// Never reply
    Ignore,
}

#[derive(Debug, Default)]
struct MockState {
    received: Vec<Vec<u8>>,
    logins: Vec<(u32, String)>,
    peer: Option<SocketAddr>,
}

/// A reflector on a loopback port
pub struct MockReflector {
    socket: Arc<UdpSocket>,
    addr: SocketAddr,
    state: Arc<Mutex<MockState>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MockReflector {
    /// Bind an ephemeral loopback port and start serving
    pub fn start(policy: AuthPolicy) -> io::Result<Self> {
        let socket = UdpSocket::bind(("127.0.0.1", 0))?;
        socket.set_read_timeout(Some(Duration::from_millis(20)))?;
        let addr = socket.local_addr()?;
        let socket = Arc::new(socket);

        let state = Arc::new(Mutex::new(MockState::default()));
        let running = Arc::new(AtomicBool::new(true));

        let thread = {
            let socket = Arc::clone(&socket);
            let state = Arc::clone(&state);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("mock-reflector".to_string())
                .spawn(move || serve(socket, state, running, policy))?
        };

        debug!("Mock reflector listening on {}", addr);
        Ok(Self {
            socket,
            addr,
            state,
            running,
            thread: Some(thread),
        })
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    /// Loopback address the mock listens on
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Port the mock listens on
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every datagram received, in order
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.state().received.clone()
    }

    /// Datagrams received with the given type byte
    pub fn received_of(&self, packet_type: u8) -> Vec<Vec<u8>> {
        self.state()
            .received
            .iter()
            .filter(|d| d.first() == Some(&packet_type))
            .cloned()
            .collect()
    }

    /// Radio id and password of each auth request
    pub fn logins(&self) -> Vec<(u32, String)> {
        self.state().logins.clone()
    }

    /// Send a datagram to the last client heard from
    pub fn send_to_client(&self, data: &[u8]) -> io::Result<()> {
        let peer = self
            .state()
            .peer
            .ok_or_else(|| io::Error::new(ErrorKind::NotConnected, "no client yet"))?;
        self.socket.send_to(data, peer)?;
        Ok(())
    }

    /// Stop serving and release the port
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for MockReflector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn serve(
    socket: Arc<UdpSocket>,
    state: Arc<Mutex<MockState>>,
    running: Arc<AtomicBool>,
    policy: AuthPolicy,
) {
    let mut buf = [0u8; 2048];

    while running.load(Ordering::Acquire) {
        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => continue,
            Err(e) => {
                debug!("Mock reflector receive error: {}", e);
                continue;
            }
        };

        let datagram = buf[..n].to_vec();
        {
            let mut state = lock(&state);
            state.peer = Some(from);
            state.received.push(datagram.clone());
        }

        if PacketType::of(&datagram) != Some(PacketType::AuthRequest) {
            continue;
        }

        match parse_auth_request(&datagram) {
            Ok(login) => lock(&state).logins.push(login),
            Err(e) => debug!("Mock reflector got a bad auth request: {}", e),
        }

        let replies: Vec<Vec<u8>> = match policy {
            AuthPolicy::Accept => vec![vec![AUTH_RESPONSE, 0x01]],
            AuthPolicy::AcceptAfterNoise => vec![vec![0xF0], vec![AUTH_RESPONSE, 0x01]],
            AuthPolicy::Reject => vec![vec![AUTH_RESPONSE, 0x00]],
            AuthPolicy::Ignore => Vec::new(),
        };
        for reply in replies {
            if let Err(e) = socket.send_to(&reply, from) {
                debug!("Mock reflector send error: {}", e);
            }
        }
    }
}
