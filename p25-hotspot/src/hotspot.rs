//! Gateway lifecycle: bring the links up in order and tear them down in reverse

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use p25_link::{EventSender, LinkError, ModemLink, ReflectorLink};
use p25_trunk::TrunkingBridge;
use tracing::{error, info, warn};

use crate::config::Config;

/// How many times authentication is checked after the reflector starts
const AUTH_CHECKS: u32 = 10;
const AUTH_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// A running gateway
pub struct Hotspot {
    modem: Arc<ModemLink>,
    reflector: Arc<ReflectorLink>,
    bridge: Arc<TrunkingBridge>,
}

impl Hotspot {
    /// Open the serial modem named in the configuration and start the gateway
    pub fn start(config: &Config, events: EventSender) -> Result<Self, LinkError> {
        Self::start_with(config, events, |modem| modem.open())
    }

    /// Start the gateway, opening the modem with `open_modem`
    pub fn start_with<F>(config: &Config, events: EventSender, open_modem: F) -> Result<Self, LinkError>
    where
        F: FnOnce(&ModemLink) -> Result<(), LinkError>,
    {
        let modem = Arc::new(
            ModemLink::new(config.modem.clone(), config.p25.clone()).with_events(events.clone()),
        );
        if let Err(e) = open_modem(&modem) {
            error!("Failed to open modem on {}: {}", config.modem.port, e);
            return Err(e);
        }

        let reflector =
            Arc::new(ReflectorLink::new(config.reflector.clone()).with_events(events.clone()));
        if let Err(e) = reflector.start() {
            error!(
                "Failed to start reflector link to {}:{}: {}",
                config.reflector.address, config.reflector.port, e
            );
            modem.close();
            return Err(e);
        }

        if !wait_authenticated(&reflector) {
            error!("Reflector did not authenticate");
            reflector.stop();
            modem.close();
            return Err(LinkError::AuthTimeout {
                timeout_ms: AUTH_CHECK_INTERVAL.as_millis() as u64 * u64::from(AUTH_CHECKS),
            });
        }

        let bridge = TrunkingBridge::new(
            config.p25.clone(),
            modem.clone(),
            reflector.clone(),
            Some(events),
        );

        info!(
            "Hotspot running: modem {} <-> reflector {}:{}",
            config.modem.port, config.reflector.address, config.reflector.port
        );
        Ok(Self {
            modem,
            reflector,
            bridge,
        })
    }

    /// Both links are still up
    pub fn is_healthy(&self) -> bool {
        self.modem.is_open() && self.reflector.is_connected()
    }

    /// Stop the bridge, then the reflector, then the modem
    pub fn shutdown(self) {
        info!("Shutting down");
        self.bridge.stop();
        self.reflector.stop();
        self.modem.close();
        info!("Shutdown complete");
    }
}

fn wait_authenticated(reflector: &ReflectorLink) -> bool {
    for attempt in 1..=AUTH_CHECKS {
        if reflector.is_authenticated() {
            return true;
        }
        warn!("Waiting for reflector authentication ({}/{})", attempt, AUTH_CHECKS);
        thread::sleep(AUTH_CHECK_INTERVAL);
    }
    reflector.is_authenticated()
}

#[cfg(test)]
mod tests {
    use p25_link::{events, GatewayEvent};
    use p25_sim::{wait_until, AuthPolicy, MockReflector, VirtualModem, VirtualModemConfig};

    use super::*;

    const UNLINK: u8 = 0xF1;

    fn config(reflector_port: u16) -> Config {
        let mut config = Config::default();
        config.reflector.address = "127.0.0.1".to_string();
        config.reflector.port = reflector_port;
        config.reflector.radio_id = 3_112_345;
        config.reflector.auth_timeout_ms = 500;
        config.modem.port = "virtual".to_string();
        config.modem.ack_timeout_ms = 200;
        config
    }

    fn open_virtual(modem: &VirtualModem) -> impl FnOnce(&ModemLink) -> Result<(), LinkError> + '_ {
        move |link| {
            let (reader, writer) = modem.connect();
            link.open_with(reader, writer)
        }
    }

    #[test]
    fn test_start_and_route() {
        let reflector = MockReflector::start(AuthPolicy::Accept).unwrap();
        let modem = VirtualModem::new(VirtualModemConfig::default());
        let (tx, mut rx) = events::channel();

        let hotspot =
            Hotspot::start_with(&config(reflector.port()), tx, open_virtual(&modem)).unwrap();
        assert!(hotspot.is_healthy());

        let mut frame = vec![0x62, 0, 0, 0, 0, 0x00, 0x2A, 0x00, 0x00, 0x07];
        frame.extend_from_slice(&[0x11; 8]);
        modem.inject_p25(&frame);
        assert!(wait_until(Duration::from_secs(2), || {
            !reflector.received_of(0x62).is_empty()
        }));
        assert_eq!(
            rx.try_recv().unwrap(),
            GatewayEvent::CallStarted {
                talkgroup: 42,
                source: 7
            }
        );

        hotspot.shutdown();
        assert!(wait_until(Duration::from_secs(2), || {
            !reflector.received_of(UNLINK).is_empty()
        }));
        assert!(!modem.received_commands().is_empty());
    }

    #[test]
    fn test_rejected_login_closes_modem() {
        let reflector = MockReflector::start(AuthPolicy::Reject).unwrap();
        let modem = VirtualModem::new(VirtualModemConfig::default());
        let (tx, _rx) = events::channel();

        let result = Hotspot::start_with(&config(reflector.port()), tx, open_virtual(&modem));
        assert!(matches!(result, Err(LinkError::AuthRejected)));
        // The modem was returned to idle as part of closing
        assert_eq!(modem.mode(), Some(0));
    }

    #[test]
    fn test_modem_failure_stops_startup() {
        let reflector = MockReflector::start(AuthPolicy::Accept).unwrap();
        let modem = VirtualModem::new(VirtualModemConfig {
            acknowledge: false,
            ..VirtualModemConfig::default()
        });
        let (tx, _rx) = events::channel();

        let result = Hotspot::start_with(&config(reflector.port()), tx, open_virtual(&modem));
        assert!(matches!(result, Err(LinkError::AckTimeout { .. })));
        assert!(reflector.logins().is_empty());
    }
}
