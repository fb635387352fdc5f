//! RF call state

/// The call currently heard on RF
///
/// `in_call` implies a nonzero talkgroup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallState {
    /// Talkgroup id, 0 when idle
    pub talkgroup: u32,
    /// Source radio id, 0 when idle
    pub source: u32,
    /// Whether a call is active
    pub in_call: bool,
}

impl CallState {
    /// Start a call unless one is already active
    ///
    /// A zero talkgroup never starts a call. Returns whether the state
    /// changed.
    pub fn start(&mut self, talkgroup: u32, source: u32) -> bool {
        if self.in_call || talkgroup == 0 {
            return false;
        }
        *self = Self {
            talkgroup,
            source,
            in_call: true,
        };
        true
    }

    /// End the active call, returning it; `None` when idle
    pub fn end(&mut self) -> Option<CallState> {
        if !self.in_call {
            return None;
        }
        Some(std::mem::take(self))
    }

    /// Whether no call is active
    pub fn is_idle(&self) -> bool {
        !self.in_call
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_end() {
        let mut call = CallState::default();
        assert!(call.is_idle());

        assert!(call.start(0x1234, 0x010203));
        assert_eq!(
            call,
            CallState {
                talkgroup: 0x1234,
                source: 0x010203,
                in_call: true
            }
        );

        let ended = call.end().unwrap();
        assert_eq!(ended.talkgroup, 0x1234);
        assert_eq!(call, CallState::default());
    }

    #[test]
    fn test_zero_talkgroup_does_not_start() {
        let mut call = CallState::default();
        assert!(!call.start(0, 42));
        assert!(call.is_idle());
    }

    #[test]
    fn test_no_restart_mid_call() {
        let mut call = CallState::default();
        assert!(call.start(100, 1));
        assert!(!call.start(200, 2));
        assert_eq!(call.talkgroup, 100);
        assert_eq!(call.source, 1);
    }

    #[test]
    fn test_end_when_idle_is_noop() {
        let mut call = CallState::default();
        assert_eq!(call.end(), None);
        assert_eq!(call, CallState::default());
    }
}
