//! Virtual MMDVM modem
//!
//! The host side gets a [`VirtualPortReader`] / [`VirtualPortWriter`] pair
//! that behaves like the two halves of a serial port. Bytes written by the
//! host are decoded and answered immediately; replies and injected P25
//! frames come back through the reader.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use p25_protocol::{EncodeFrame, FrameCodec, ModemCodec, ModemCommand, ModemFrame};
use tracing::debug;

/// Behavior of a virtual modem
#[derive(Debug, Clone)]
pub struct VirtualModemConfig {
    /// Answer commands with ACK
    pub acknowledge: bool,
    /// Command codes answered with NAK instead of ACK
    pub nak_commands: Vec<u8>,
    /// Send an ACK for this code ahead of every answer, as a late reply to
    /// an earlier command would arrive
    pub stray_ack: Option<u8>,
    /// Answer version queries
    pub answer_version: bool,
    /// Protocol version byte in the version reply
    pub protocol_version: u8,
    /// Description in the version reply
    pub firmware: String,
    /// How long a read blocks before reporting a timeout
    pub read_timeout: Duration,
}

impl Default for VirtualModemConfig {
    fn default() -> Self {
        Self {
            acknowledge: true,
            nak_commands: Vec::new(),
            stray_ack: None,
            answer_version: true,
            protocol_version: 1,
            firmware: "MMDVM_HS 20240101 (virtual)".to_string(),
            read_timeout: Duration::from_millis(20),
        }
    }
}

/// Modem-side state
#[derive(Debug)]
struct ModemState {
    config: VirtualModemConfig,
    codec: ModemCodec,
    received: Vec<ModemFrame>,
    mode: Option<u8>,
    modem_config: Option<Vec<u8>>,
    rx_frequency: Option<u32>,
    tx_frequency: Option<u32>,
    to_host: Option<mpsc::Sender<Vec<u8>>>,
}

impl ModemState {
    fn accept(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.to_host.is_none() {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "virtual modem disconnected"));
        }

        self.codec.push_bytes(bytes);
        while let Some(frame) = self.codec.next_frame() {
            self.handle(frame);
        }
        Ok(())
    }

    fn handle(&mut self, frame: ModemFrame) {
        debug!("Virtual modem got 0x{:02X} ({} bytes)", frame.command, frame.payload.len());
        self.received.push(frame.clone());

        match frame.kind() {
            Some(ModemCommand::GetVersion) => {
                if self.config.answer_version {
                    let mut payload = vec![self.config.protocol_version];
                    payload.extend_from_slice(self.config.firmware.as_bytes());
                    self.reply(ModemCommand::GetVersion, payload);
                }
            }
            Some(ModemCommand::GetStatus) => {
                let mode = self.mode.unwrap_or(0);
                self.reply(ModemCommand::GetStatus, vec![0x00, mode, 0x00, 0x00]);
            }
            Some(ModemCommand::P25Data) => {}
            Some(ModemCommand::SetConfig) => {
                self.modem_config = Some(frame.payload);
                self.acknowledge(ModemCommand::SetConfig.code());
            }
            Some(ModemCommand::SetMode) => {
                self.mode = frame.payload.first().copied();
                self.acknowledge(ModemCommand::SetMode.code());
            }
            Some(command @ (ModemCommand::SetRxFreq | ModemCommand::SetTxFreq)) => {
                let hz = match frame.payload[..] {
                    [a, b, c, d, ..] => Some(u32::from_be_bytes([a, b, c, d])),
                    _ => None,
                };
                if command == ModemCommand::SetRxFreq {
                    self.rx_frequency = hz;
                } else {
                    self.tx_frequency = hz;
                }
                self.acknowledge(command.code());
            }
            _ => self.acknowledge(frame.command),
        }
    }

    fn acknowledge(&mut self, command: u8) {
        if let Some(stray) = self.config.stray_ack {
            self.reply(ModemCommand::Ack, vec![stray]);
        }
        if self.config.nak_commands.contains(&command) {
            self.reply(ModemCommand::Nak, vec![command, 0x01]);
        } else if self.config.acknowledge {
            self.reply(ModemCommand::Ack, vec![command]);
        }
    }

    fn reply(&mut self, command: ModemCommand, payload: Vec<u8>) {
        let frame = ModemFrame {
            command: command.code(),
            payload,
        };
        self.send_raw(frame.encode());
    }

    fn send_raw(&mut self, bytes: Vec<u8>) {
        if let Some(tx) = &self.to_host {
            if tx.send(bytes).is_err() {
                self.to_host = None;
            }
        }
    }
}

/// A simulated modem reachable through in-memory port halves
#[derive(Debug, Clone)]
pub struct VirtualModem {
    state: Arc<Mutex<ModemState>>,
}

impl VirtualModem {
    /// Create a virtual modem
    pub fn new(config: VirtualModemConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(ModemState {
                config,
                codec: ModemCodec::new(),
                received: Vec::new(),
                mode: None,
                modem_config: None,
                rx_frequency: None,
                tx_frequency: None,
                to_host: None,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, ModemState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the host-side port halves, replacing any earlier connection
    pub fn connect(&self) -> (VirtualPortReader, VirtualPortWriter) {
        let (tx, rx) = mpsc::channel();
        let mut state = self.state();
        state.to_host = Some(tx);
        state.codec.clear();

        let reader = VirtualPortReader {
            rx,
            pending: VecDeque::new(),
            timeout: state.config.read_timeout,
        };
        let writer = VirtualPortWriter {
            state: Arc::clone(&self.state),
        };
        (reader, writer)
    }

    /// Drop the connection; the host's next read fails with a broken pipe
    pub fn disconnect(&self) {
        self.state().to_host = None;
    }

    /// Deliver a received P25 frame to the host
    pub fn inject_p25(&self, frame: &[u8]) {
        let frame = ModemFrame {
            command: ModemCommand::P25Data.code(),
            payload: frame.to_vec(),
        };
        self.state().send_raw(frame.encode());
    }

    /// Deliver arbitrary bytes to the host
    pub fn inject_raw(&self, bytes: &[u8]) {
        self.state().send_raw(bytes.to_vec());
    }

    /// Every frame the host has sent, in order
    pub fn received(&self) -> Vec<ModemFrame> {
        self.state().received.clone()
    }

    /// Command codes the host has sent, in order
    pub fn received_commands(&self) -> Vec<u8> {
        self.state().received.iter().map(|f| f.command).collect()
    }

    /// Payloads of the P25 data frames the host has sent
    pub fn p25_frames(&self) -> Vec<Vec<u8>> {
        self.state()
            .received
            .iter()
            .filter(|f| f.kind() == Some(ModemCommand::P25Data))
            .map(|f| f.payload.clone())
            .collect()
    }

    /// Last mode set by the host
    pub fn mode(&self) -> Option<u8> {
        self.state().mode
    }

    /// Last configuration payload written by the host
    pub fn modem_config(&self) -> Option<Vec<u8>> {
        self.state().modem_config.clone()
    }

    /// Last receive frequency set by the host
    pub fn rx_frequency(&self) -> Option<u32> {
        self.state().rx_frequency
    }

    /// Last transmit frequency set by the host
    pub fn tx_frequency(&self) -> Option<u32> {
        self.state().tx_frequency
    }
}

/// Host-side read half
pub struct VirtualPortReader {
    rx: mpsc::Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
    timeout: Duration,
}

impl Read for VirtualPortReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.pending.is_empty() {
            match self.rx.recv_timeout(self.timeout) {
                Ok(bytes) => self.pending.extend(bytes),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(ErrorKind::TimedOut, "no data"));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(io::Error::new(
                        ErrorKind::BrokenPipe,
                        "virtual modem disconnected",
                    ));
                }
            }
        }

        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

/// Host-side write half
pub struct VirtualPortWriter {
    state: Arc<Mutex<ModemState>>,
}

impl Write for VirtualPortWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .accept(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
