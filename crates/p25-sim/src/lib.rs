//! P25 Hotspot Simulation Library
//!
//! Stand-ins for the two ends of a hotspot, for tests that should not need
//! a modem on a serial port or a reflector on the network:
//!
//! - **VirtualModem**: speaks the modem side of the MMDVM serial protocol
//!   over in-memory channels, acknowledging commands and recording frames
//! - **MockReflector**: a loopback UDP reflector that answers logins and
//!   records what the hotspot sends
//!
//! # Example
//!
//! ```rust
//! use std::io::{Read, Write};
//! use p25_protocol::{EncodeFrame, ModemCommand, ModemFrame, ModemMode};
//! use p25_sim::{VirtualModem, VirtualModemConfig};
//!
//! let modem = VirtualModem::new(VirtualModemConfig::default());
//! let (mut reader, mut writer) = modem.connect();
//!
//! writer.write_all(&ModemFrame::set_mode(ModemMode::P25).encode()).unwrap();
//!
//! // The modem answers with an ACK frame
//! let mut buf = [0u8; 16];
//! let n = reader.read(&mut buf).unwrap();
//! assert_eq!(&buf[..n], &[0xE0, 0x04, 0x70, 0x03]);
//! assert_eq!(modem.mode(), Some(ModemMode::P25.code()));
//! ```

pub mod modem;
pub mod reflector;

use std::time::{Duration, Instant};

pub use modem::{VirtualModem, VirtualModemConfig, VirtualPortReader, VirtualPortWriter};
pub use reflector::{AuthPolicy, MockReflector};

/// Poll `condition` until it holds or `timeout` passes
///
/// Returns whether the condition held.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}
