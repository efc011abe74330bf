//! Session lifecycle states.
//!
//! ```text
//! Init -> Connecting -> Handshaking -> Open -> Closing -> Closed
//!                                                          |
//!             Connecting <------ (reconnect enabled) ------+
//! ```

/// Lifecycle state of a session.
///
/// A single value replaces the separate "active", "opened" and "closed"
/// flags, so impossible combinations cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ConnectionState {
    /// Constructed, never connected.
    #[default]
    Init,
    /// Opening the transport.
    Connecting,
    /// Transport open, upgrade handshake in progress.
    Handshaking,
    /// Handshake accepted, messages flow both ways.
    Open,
    /// Close frame sent, waiting for the peer.
    Closing,
    /// Transport released.
    Closed,
}

impl ConnectionState {
    /// A session is active from the start of connecting until it closes.
    #[must_use]
    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::Handshaking
                | ConnectionState::Open
                | ConnectionState::Closing
        )
    }

    /// Check if sending data is allowed in this state.
    ///
    /// Returns `true` only for `Open` state.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Check if receiving data is allowed in this state.
    ///
    /// Returns `true` for `Open` or `Closing` states.
    #[must_use]
    #[inline]
    pub const fn can_receive(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Closing)
    }

    /// `connect()` may start from this state.
    #[must_use]
    #[inline]
    pub const fn can_connect(&self) -> bool {
        matches!(self, ConnectionState::Init | ConnectionState::Closed)
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    #[must_use]
    pub const fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::{Closed, Closing, Connecting, Handshaking, Init, Open};
        matches!(
            (*self, next),
            (Init | Closed, Connecting)
                | (Connecting, Handshaking)
                | (Handshaking, Open)
                | (Open, Closing)
                | (Connecting | Handshaking | Open | Closing, Closed)
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Init => write!(f, "Init"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Handshaking => write!(f, "Handshaking"),
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Closing => write!(f, "Closing"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}
