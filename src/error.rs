//! Error types for WebSocket client sessions.
//!
//! Every failure the session manager can observe is expressed as an [`Error`].
//! [`Error::kind`] folds the detailed variants into the handful of categories
//! the lifecycle code reacts to.

use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during WebSocket client operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Server responded with a non-conformant upgrade response.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Handshake header data exceeded the configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes received so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Handshake did not complete before the configured deadline.
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// A header value would inject CR or LF into the upgrade request.
    #[error("Invalid header value for {header}: {reason}")]
    InvalidHeaderValue {
        /// Header name.
        header: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Protocol version negotiated by the handshake is not supported.
    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// A frame carried an opcode this client does not understand.
    #[error("Unrecognized message type: {0:#x}")]
    UnrecognizedMessageType(u8),

    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Invalid UTF-8 in text frame.
    #[error("Invalid UTF-8 in text frame")]
    InvalidUtf8,

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Frame length does not fit in this platform's address space.
    #[error("Payload too large for platform: {size} bytes (max: {max})")]
    PayloadTooLargeForPlatform {
        /// Declared payload size.
        size: u64,
        /// Largest addressable size.
        max: u64,
    },

    /// Message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("Too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// Invalid opcode value.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Control frame fragmented (RFC violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Masked server frame (security violation).
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Reserved bits set without extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Invalid close code.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// The peer refused the transport connection.
    #[error("Connection refused: {0}")]
    TransportRefused(String),

    /// I/O error occurred on the transport.
    #[error("I/O error: {message}")]
    Io {
        /// Underlying I/O error kind.
        kind: std::io::ErrorKind,
        /// Rendered I/O error.
        message: String,
    },

    /// TLS setup or negotiation failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Connection has been closed.
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// `connect()` was called while a session is already established.
    #[error("Connection already established")]
    AlreadyConnected,

    /// Configuration rejected before connecting.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A registered callback panicked while being dispatched.
    #[error("Callback `{0}` panicked")]
    CallbackPanicked(&'static str),

    /// The reconnect policy gave up.
    #[error("Reconnect abandoned after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of attempts made.
        attempts: u32,
    },
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The upgrade handshake failed.
    HandshakeInvalid,
    /// Malformed framing or an unsolicited control frame.
    ProtocolViolation,
    /// A frame type this client does not handle.
    UnrecognizedMessageType,
    /// The transport was refused at connect time.
    TransportRefused,
    /// The transport broke, ended, or could not be used.
    TransportFailure,
    /// A user callback panicked. Dispatch carries on.
    CallbackFailure,
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidHandshake(_)
            | Error::HandshakeTooLarge { .. }
            | Error::HandshakeTimeout
            | Error::InvalidHeaderValue { .. }
            | Error::UnsupportedVersion(_) => ErrorKind::HandshakeInvalid,
            Error::UnrecognizedMessageType(_) => ErrorKind::UnrecognizedMessageType,
            Error::TransportRefused(_) => ErrorKind::TransportRefused,
            Error::Io { .. }
            | Error::Tls(_)
            | Error::ConnectionClosed(_)
            | Error::AlreadyConnected
            | Error::InvalidConfig(_)
            | Error::ReconnectExhausted { .. } => ErrorKind::TransportFailure,
            Error::ProtocolViolation(_)
            | Error::InvalidFrame(_)
            | Error::InvalidUtf8
            | Error::FrameTooLarge { .. }
            | Error::PayloadTooLargeForPlatform { .. }
            | Error::MessageTooLarge { .. }
            | Error::TooManyFragments { .. }
            | Error::InvalidOpcode(_)
            | Error::ReservedOpcode(_)
            | Error::FragmentedControlFrame
            | Error::ControlFrameTooLarge(_)
            | Error::MaskedServerFrame
            | Error::ReservedBitsSet
            | Error::IncompleteFrame { .. }
            | Error::InvalidCloseCode(_) => ErrorKind::ProtocolViolation,
            Error::CallbackPanicked(_) => ErrorKind::CallbackFailure,
        }
    }

    /// Returns `true` if the peer has gone away underneath a write.
    #[must_use]
    pub fn is_broken_pipe(&self) -> bool {
        matches!(
            self,
            Error::Io {
                kind: std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted,
                ..
            }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::ConnectionRefused => Error::TransportRefused(err.to_string()),
            kind => Error::Io {
                kind,
                message: err.to_string(),
            },
        }
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}
