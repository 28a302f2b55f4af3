//! Enumeration types shared between the relay and its consumers.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Lifecycle of a single subscriber connection.
///
/// A connection moves strictly forward:
/// `Connecting -> Open -> Closing -> Closed`. `Closing` may be skipped
/// when the transport disappears without a close handshake. There is no
/// reconnect state on the relay side; a reconnecting client starts a
/// brand new `Connecting` session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ConnectionState {
    /// The upgrade handshake completed but the session is not registered yet.
    Connecting,
    /// Registered with the relay and receiving measurements.
    Open,
    /// A close was initiated by either side; no further frames are sent.
    Closing,
    /// Unregistered. Terminal.
    Closed,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Open | Self::Closed)
                | (Self::Open, Self::Closing | Self::Closed)
                | (Self::Closing, Self::Closed)
        )
    }

    /// Whether frames may still be delivered in this state.
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl core::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_are_legal() {
        assert!(ConnectionState::Connecting.can_transition_to(ConnectionState::Open));
        assert!(ConnectionState::Open.can_transition_to(ConnectionState::Closing));
        assert!(ConnectionState::Open.can_transition_to(ConnectionState::Closed));
        assert!(ConnectionState::Closing.can_transition_to(ConnectionState::Closed));
    }

    #[test]
    fn closed_is_terminal() {
        for next in [
            ConnectionState::Connecting,
            ConnectionState::Open,
            ConnectionState::Closing,
            ConnectionState::Closed,
        ] {
            assert!(!ConnectionState::Closed.can_transition_to(next));
        }
    }

    #[test]
    fn no_reopen_after_closing() {
        assert!(!ConnectionState::Closing.can_transition_to(ConnectionState::Open));
    }

    #[test]
    fn only_open_is_live() {
        assert!(ConnectionState::Open.is_live());
        assert!(!ConnectionState::Connecting.is_live());
        assert!(!ConnectionState::Closing.is_live());
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&ConnectionState::Closing).unwrap();
        assert_eq!(json, "\"closing\"");
    }
}
