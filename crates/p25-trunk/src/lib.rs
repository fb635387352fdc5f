//! P25 Trunking Bridge
//!
//! Routes frames between the modem and the reflector and keeps track of the
//! RF call in progress.
//!
//! | From      | Frame              | Action                                         |
//! |-----------|--------------------|------------------------------------------------|
//! | modem     | voice              | update call state, forward if authenticated    |
//! | modem     | TSBK               | process locally                                |
//! | modem     | end of transmission| end the call, forward if authenticated         |
//! | reflector | voice              | forward if the modem is open                   |
//! | reflector | TSBK               | process, forward if open and trunking enabled  |
//! | reflector | talkgroup grant    | process                                        |
//! | reflector | talkgroup release  | report                                         |
//! | reflector | end of transmission| forward if the modem is open                   |
//! | reflector | auth / poll        | ignored                                        |

pub mod bridge;
pub mod state;

pub use bridge::TrunkingBridge;
pub use state::CallState;
