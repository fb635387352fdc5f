//! Serial link to the MMDVM modem
//!
//! The link owns the serial transport. A background thread reads bytes,
//! reassembles frames with [`ModemCodec`] and dispatches them: ACK/NAK and
//! version replies wake the caller blocked in a command, P25 data frames go
//! to the registered frame handler on the read thread itself.
//!
//! Commands that expect an ACK are serialized, and a reply only completes
//! the command whose code it echoes, so a late ACK for a command that
//! already timed out is ignored. Plain data writes only take the writer
//! lock and may interleave with a pending command.
//!
//! The transport is any `Read`/`Write` pair, which lets tests substitute a
//! virtual modem for the serial port.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use p25_protocol::{EncodeFrame, FrameCodec, ModemCodec, ModemCommand, ModemFrame, ModemMode};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use tracing::{debug, error, info, trace, warn};

use crate::config::{ModemConfig, P25Config};
use crate::error::LinkError;
use crate::events::{emit, EventSender, GatewayEvent};
use crate::{lock, read_lock, write_lock, FrameHandler};

/// Baud rates the modem firmware accepts
pub const SUPPORTED_BAUD_RATES: [u32; 5] = [9600, 19_200, 38_400, 57_600, 115_200];

/// Baud rate used when the configured one is not supported
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// How long `version()` waits for the firmware reply
const VERSION_TIMEOUT: Duration = Duration::from_millis(250);

/// Pause between read attempts
const READ_LOOP_PAUSE: Duration = Duration::from_millis(5);

/// Read buffer size
const READ_CHUNK: usize = 1024;

/// Firmware version as reported by the modem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareVersion {
    /// Protocol version byte
    pub protocol: u8,
    /// Free-form description, usually firmware name and build date
    pub description: String,
}

impl FirmwareVersion {
    fn from_payload(payload: &[u8]) -> Option<Self> {
        let (&protocol, rest) = payload.split_first()?;
        let description = String::from_utf8_lossy(rest)
            .trim_end_matches('\0')
            .trim()
            .to_string();
        Some(Self {
            protocol,
            description,
        })
    }
}

/// Map a configured baud rate onto one the firmware supports
pub fn supported_baud(requested: u32) -> u32 {
    if SUPPORTED_BAUD_RATES.contains(&requested) {
        requested
    } else {
        warn!(
            "Unsupported baud rate {}, falling back to {}",
            requested, DEFAULT_BAUD_RATE
        );
        DEFAULT_BAUD_RATE
    }
}

/// Build the set-config payload
///
/// Layout: rx-invert, tx-invert, ptt-invert, reserved, debug, then the
/// DMR/YSF/P25/NXDN mode enables, tx power, rf level and two delay bytes.
pub fn config_payload(config: &ModemConfig, p25: &P25Config) -> Result<Vec<u8>, LinkError> {
    let tx_power = u8::try_from(config.tx_power)
        .map_err(|_| LinkError::InvalidConfig(format!("tx_power {}", config.tx_power)))?;
    let rf_level = u8::try_from(config.rf_level)
        .map_err(|_| LinkError::InvalidConfig(format!("rf_level {}", config.rf_level)))?;

    Ok(vec![
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
        u8::from(p25.enabled),
        0x00,
        tx_power,
        rf_level,
        0x00,
        0x00,
    ])
}

/// Apply a signed correction to a frequency
fn offset_frequency(hz: u32, offset: i32) -> Result<u32, LinkError> {
    u32::try_from(i64::from(hz) + i64::from(offset))
        .map_err(|_| LinkError::InvalidConfig(format!("frequency {} with offset {}", hz, offset)))
}

/// Reply slots filled by the read loop
#[derive(Debug, Default)]
struct Replies {
    /// ACK/NAK for the command in flight
    ack: Option<AckReply>,
    /// Payload of the last version reply
    version: Option<Vec<u8>>,
}

/// ACK or NAK, with the command code echoed in its payload if any
#[derive(Debug, Clone, Copy)]
enum AckReply {
    Ack { command: Option<u8> },
    Nak { command: Option<u8>, reason: u8 },
}

impl AckReply {
    /// Whether this reply answers the command `code`
    fn answers(&self, code: u8) -> bool {
        let (Self::Ack { command } | Self::Nak { command, .. }) = *self;
        command.map_or(true, |echoed| echoed == code)
    }
}

/// State shared with the read thread
struct Shared {
    open: AtomicBool,
    running: AtomicBool,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    replies: Mutex<Replies>,
    reply_ready: Condvar,
    handler: RwLock<Option<FrameHandler>>,
}

impl Shared {
    fn write_frame(&self, frame: &ModemFrame) -> Result<(), LinkError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(LinkError::NotOpen);
        }

        let bytes = frame.encode();
        let mut writer = lock(&self.writer);
        let port = writer.as_mut().ok_or(LinkError::NotOpen)?;
        port.write_all(&bytes)?;
        port.flush()?;
        trace!("Wrote {} bytes to modem: {:02X?}", bytes.len(), bytes);
        Ok(())
    }

    fn dispatch(&self, frame: ModemFrame) {
        match frame.kind() {
            Some(ModemCommand::Ack) => {
                let command = frame.payload.first().copied();
                debug!("Modem ACK for {:02X?}", command);
                self.post_ack(AckReply::Ack { command });
            }
            Some(ModemCommand::Nak) => {
                let command = frame.payload.first().copied();
                let reason = frame.payload.get(1).copied().unwrap_or(0);
                warn!("Modem NAK for {:02X?}, reason {}", command, reason);
                self.post_ack(AckReply::Nak { command, reason });
            }
            Some(ModemCommand::P25Data) => {
                let handler = read_lock(&self.handler).clone();
                match handler {
                    Some(handler) => handler(&frame.payload),
                    None => trace!("No frame handler, dropping {} byte frame", frame.payload.len()),
                }
            }
            Some(ModemCommand::GetVersion) => {
                let mut replies = lock(&self.replies);
                replies.version = Some(frame.payload);
                self.reply_ready.notify_all();
            }
            Some(ModemCommand::GetStatus) => {
                debug!("Modem status: {:02X?}", frame.payload);
            }
            Some(ModemCommand::P25Lost) => {
                debug!("Modem lost P25 signal");
            }
            Some(other) => {
                debug!("Ignoring {} frame from modem", other.name());
            }
            None => {
                debug!("Unknown modem command 0x{:02X}", frame.command);
            }
        }
    }

    fn post_ack(&self, reply: AckReply) {
        let mut replies = lock(&self.replies);
        replies.ack = Some(reply);
        self.reply_ready.notify_all();
    }
}

/// Serial link to the modem
pub struct ModemLink {
    config: ModemConfig,
    p25: P25Config,
    shared: Arc<Shared>,
    /// Held across send-and-wait so replies cannot cross
    command_lock: Mutex<()>,
    reader: Mutex<Option<JoinHandle<()>>>,
    events: Option<EventSender>,
}

impl ModemLink {
    /// Create a closed link
    pub fn new(config: ModemConfig, p25: P25Config) -> Self {
        Self {
            config,
            p25,
            shared: Arc::new(Shared {
                open: AtomicBool::new(false),
                running: AtomicBool::new(false),
                writer: Mutex::new(None),
                replies: Mutex::new(Replies::default()),
                reply_ready: Condvar::new(),
                handler: RwLock::new(None),
            }),
            command_lock: Mutex::new(()),
            reader: Mutex::new(None),
            events: None,
        }
    }

    /// Attach the gateway event channel
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Open the configured serial port and configure the modem
    pub fn open(&self) -> Result<(), LinkError> {
        if self.is_open() {
            return Ok(());
        }

        let baud = supported_baud(self.config.baud);
        info!("Opening modem on {} at {} baud", self.config.port, baud);

        let port = serialport::new(&self.config.port, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.config.read_timeout())
            .open()
            .map_err(|e| LinkError::Open {
                port: self.config.port.clone(),
                reason: e.to_string(),
            })?;

        let reader = port.try_clone().map_err(|e| LinkError::Open {
            port: self.config.port.clone(),
            reason: e.to_string(),
        })?;

        self.open_with(reader, port)
    }

    /// Start the link over an already-open transport and configure the modem
    ///
    /// On a configuration failure the link is closed again before the error
    /// is returned.
    pub fn open_with<R, W>(&self, reader: R, writer: W) -> Result<(), LinkError>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let mut reader_slot = lock(&self.reader);
        if let Some(handle) = reader_slot.take() {
            if self.is_open() {
                *reader_slot = Some(handle);
                return Ok(());
            }
            // The read loop already exited on an I/O error; reap it and
            // drop the dead transport before starting over
            debug!("Reopening modem after link loss");
            self.shared.running.store(false, Ordering::Release);
            if handle.join().is_err() {
                error!("Modem read thread panicked");
            }
            lock(&self.shared.writer).take();
        }

        *lock(&self.shared.writer) = Some(Box::new(writer));
        *lock(&self.shared.replies) = Replies::default();
        self.shared.running.store(true, Ordering::Release);
        self.shared.open.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let events = self.events.clone();
        let spawned = thread::Builder::new()
            .name("modem-read".to_string())
            .spawn(move || run_read_loop(shared, reader, events));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.open.store(false, Ordering::Release);
                self.shared.running.store(false, Ordering::Release);
                lock(&self.shared.writer).take();
                return Err(LinkError::Io(e));
            }
        };
        *reader_slot = Some(handle);
        drop(reader_slot);

        if let Err(e) = self.configure() {
            error!("Modem configuration failed: {}", e);
            self.close();
            return Err(e);
        }

        info!("Modem ready");
        Ok(())
    }

    fn configure(&self) -> Result<(), LinkError> {
        match self.version() {
            Ok(version) => info!(
                "Modem firmware: {} (protocol {})",
                version.description, version.protocol
            ),
            Err(e) => warn!("Could not read modem firmware version: {}", e),
        }

        let payload = config_payload(&self.config, &self.p25)?;
        self.command(ModemFrame::new(ModemCommand::SetConfig, payload)?)?;
        debug!("Modem configuration accepted");

        if self.config.set_frequencies {
            let rx = offset_frequency(self.config.rx_frequency, self.config.rx_offset)?;
            let tx = offset_frequency(self.config.tx_frequency, self.config.tx_offset)?;
            self.command(ModemFrame::frequency(ModemCommand::SetRxFreq, rx))?;
            self.command(ModemFrame::frequency(ModemCommand::SetTxFreq, tx))?;
            info!("Modem tuned: rx {} Hz, tx {} Hz", rx, tx);
        } else {
            warn!("Skipping frequency setup (set_frequencies is off)");
        }

        if self.config.set_p25_mode {
            self.set_mode(ModemMode::P25)?;
        } else {
            warn!("Skipping P25 mode switch (set_p25_mode is off)");
        }

        Ok(())
    }

    /// Stop the read loop and release the transport
    ///
    /// Requests idle mode first if the link is still healthy. Does nothing
    /// when the link was never opened or is already closed.
    pub fn close(&self) {
        let Some(handle) = lock(&self.reader).take() else {
            return;
        };

        info!("Closing modem");
        if self.is_open() {
            if let Err(e) = self.set_mode(ModemMode::Idle) {
                warn!("Modem did not accept idle mode: {}", e);
            }
        }

        self.shared.running.store(false, Ordering::Release);
        if handle.join().is_err() {
            error!("Modem read thread panicked");
        }

        self.shared.open.store(false, Ordering::Release);
        lock(&self.shared.writer).take();
        info!("Modem closed");
    }

    /// Whether the transport is open and the read loop healthy
    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    /// Send a P25 frame to the modem for transmission
    pub fn write_data(&self, data: &[u8]) -> Result<(), LinkError> {
        let frame = ModemFrame::new(ModemCommand::P25Data, data.to_vec())?;
        self.shared.write_frame(&frame)
    }

    /// Switch the modem's operating mode
    pub fn set_mode(&self, mode: ModemMode) -> Result<(), LinkError> {
        self.command(ModemFrame::set_mode(mode))?;
        info!("Modem mode set to {:?}", mode);
        Ok(())
    }

    /// Query the firmware version
    pub fn version(&self) -> Result<FirmwareVersion, LinkError> {
        let _txn = lock(&self.command_lock);
        lock(&self.shared.replies).version = None;
        self.shared
            .write_frame(&ModemFrame::command(ModemCommand::GetVersion))?;

        let replies = lock(&self.shared.replies);
        let (mut replies, _) = self
            .shared
            .reply_ready
            .wait_timeout_while(replies, VERSION_TIMEOUT, |r| r.version.is_none())
            .unwrap_or_else(PoisonError::into_inner);

        replies
            .version
            .take()
            .and_then(|payload| FirmwareVersion::from_payload(&payload))
            .ok_or(LinkError::AckTimeout {
                command: ModemCommand::GetVersion.name(),
                timeout_ms: VERSION_TIMEOUT.as_millis() as u64,
            })
    }

    /// Request a status report; the reply is logged by the read loop
    pub fn get_status(&self) -> Result<(), LinkError> {
        self.shared
            .write_frame(&ModemFrame::command(ModemCommand::GetStatus))
    }

    /// Register the consumer for inbound P25 frames, replacing any previous one
    pub fn set_frame_handler(&self, handler: FrameHandler) {
        *write_lock(&self.shared.handler) = Some(handler);
    }

    /// Remove the inbound frame consumer
    pub fn clear_frame_handler(&self) {
        write_lock(&self.shared.handler).take();
    }

    /// Remove `handler` if it is still the registered consumer
    pub fn remove_frame_handler(&self, handler: &FrameHandler) {
        let mut current = write_lock(&self.shared.handler);
        if current.as_ref().is_some_and(|h| Arc::ptr_eq(h, handler)) {
            current.take();
        }
    }

    /// Send a command and wait for the modem to acknowledge it
    fn command(&self, frame: ModemFrame) -> Result<(), LinkError> {
        let code = frame.command;
        let name = frame.kind().map_or("UNKNOWN", ModemCommand::name);
        let timeout = self.config.ack_timeout();

        let _txn = lock(&self.command_lock);
        lock(&self.shared.replies).ack = None;
        self.shared.write_frame(&frame)?;

        let replies = lock(&self.shared.replies);
        let (mut replies, _) = self
            .shared
            .reply_ready
            .wait_timeout_while(replies, timeout, |r| {
                !r.ack.is_some_and(|reply| reply.answers(code))
            })
            .unwrap_or_else(PoisonError::into_inner);

        match replies.ack.take().filter(|reply| reply.answers(code)) {
            Some(AckReply::Ack { .. }) => Ok(()),
            Some(AckReply::Nak { reason, .. }) => Err(LinkError::Nak {
                command: name,
                reason,
            }),
            None => {
                warn!("Timeout waiting for ACK to {}", name);
                Err(LinkError::AckTimeout {
                    command: name,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

impl Drop for ModemLink {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_read_loop<R: Read>(shared: Arc<Shared>, mut reader: R, events: Option<EventSender>) {
    debug!("Modem read loop started");
    let mut codec = ModemCodec::new();
    let mut buf = [0u8; READ_CHUNK];

    while shared.running.load(Ordering::Acquire) {
        match reader.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                trace!("Read {} bytes from modem", n);
                codec.push_bytes(&buf[..n]);
                while let Some(frame) = codec.next_frame() {
                    shared.dispatch(frame);
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                error!("Modem read failed: {}", e);
                shared.open.store(false, Ordering::Release);
                emit(
                    events.as_ref(),
                    GatewayEvent::ModemLinkLost {
                        reason: e.to_string(),
                    },
                );
                break;
            }
        }
        thread::sleep(READ_LOOP_PAUSE);
    }

    // Anyone still waiting on a reply sees the timeout sooner
    shared.reply_ready.notify_all();
    debug!("Modem read loop stopped");
}
