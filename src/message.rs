//! Messages exchanged over a session, and close status codes.

use std::fmt;

/// Close status code carried in a close message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CloseCode {
    /// Normal closure (1000).
    #[default]
    Normal,
    /// Endpoint is going away (1001), e.g. server shutdown.
    GoingAway,
    /// Protocol error (1002).
    ProtocolError,
    /// Received data of a type the endpoint cannot accept (1003).
    UnsupportedData,
    /// Message payload was inconsistent with its type (1007).
    InvalidPayload,
    /// Policy violation (1008).
    PolicyViolation,
    /// Message too big to process (1009).
    MessageTooBig,
    /// Server did not negotiate a required extension (1010).
    MandatoryExtension,
    /// Server hit an unexpected condition (1011).
    InternalError,
    /// Any other code.
    Other(u16),
}

impl CloseCode {
    /// Create a `CloseCode` from its numeric value.
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1007 => CloseCode::InvalidPayload,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1010 => CloseCode::MandatoryExtension,
            1011 => CloseCode::InternalError,
            other => CloseCode::Other(other),
        }
    }

    /// Numeric value of this close code.
    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::InvalidPayload => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::MandatoryExtension => 1010,
            CloseCode::InternalError => 1011,
            CloseCode::Other(code) => *code,
        }
    }

    /// Reserved codes (1004-1006, 1015) must never appear in a close frame we send.
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self.as_u16(), 1004..=1006 | 1015)
    }
}

/// Status code and reason of a close message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// The close status code.
    pub code: CloseCode,
    /// Human-readable reason for closing.
    pub reason: String,
}

impl CloseFrame {
    /// Create a new close frame with the given code and reason.
    #[must_use]
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Decode a close payload: a big-endian status code followed by a UTF-8 reason.
    ///
    /// An empty payload carries no status. A one-byte payload or a reason that is
    /// not UTF-8 is reported as a protocol-level close rather than rejected.
    #[must_use]
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            [] => None,
            [_] => Some(CloseFrame::new(CloseCode::ProtocolError, "Invalid close frame")),
            [hi, lo, reason @ ..] => {
                let code = CloseCode::from_u16(u16::from_be_bytes([*hi, *lo]));
                match std::str::from_utf8(reason) {
                    Ok(reason) => Some(CloseFrame::new(code, reason)),
                    Err(_) => Some(CloseFrame::new(CloseCode::InvalidPayload, "")),
                }
            }
        }
    }

    /// Encode as a close payload.
    #[must_use]
    pub fn to_payload(&self) -> Vec<u8> {
        let mut data = self.code.as_u16().to_be_bytes().to_vec();
        data.extend_from_slice(self.reason.as_bytes());
        data
    }
}

impl fmt::Display for CloseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code.as_u16(), self.reason)
    }
}

/// Classification of a decoded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// UTF-8 text.
    Text,
    /// Arbitrary bytes.
    Binary,
    /// Keepalive probe from the peer.
    Ping,
    /// Keepalive answer.
    Pong,
    /// Session termination.
    Close,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Text => "text",
            MessageType::Binary => "binary",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
            MessageType::Close => "close",
        };
        f.write_str(name)
    }
}

/// A complete message, either decoded from the peer or about to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Message {
    /// A text message.
    Text(String),
    /// A binary message.
    Binary(Vec<u8>),
    /// A ping (payload <= 125 bytes).
    Ping(Vec<u8>),
    /// A pong (payload <= 125 bytes).
    Pong(Vec<u8>),
    /// A close message with optional status.
    Close(Option<CloseFrame>),
}

impl Message {
    /// Create a text message.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    /// Create a binary message.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Message::Binary(data.into())
    }

    /// Create a ping message.
    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Message::Ping(data.into())
    }

    /// Create a pong message.
    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Message::Pong(data.into())
    }

    /// Create a close message with status code and reason.
    #[must_use]
    pub fn close(code: CloseCode, reason: impl Into<String>) -> Self {
        Message::Close(Some(CloseFrame::new(code, reason)))
    }

    /// The type tag of this message.
    #[must_use]
    pub const fn message_type(&self) -> MessageType {
        match self {
            Message::Text(_) => MessageType::Text,
            Message::Binary(_) => MessageType::Binary,
            Message::Ping(_) => MessageType::Ping,
            Message::Pong(_) => MessageType::Pong,
            Message::Close(_) => MessageType::Close,
        }
    }

    /// Returns `true` for text and binary messages.
    #[must_use]
    pub const fn is_data(&self) -> bool {
        matches!(self, Message::Text(_) | Message::Binary(_))
    }

    /// Payload bytes as they travel on the wire.
    ///
    /// Close messages are encoded with [`CloseFrame::to_payload`], so this
    /// allocates only for them.
    #[must_use]
    pub fn payload(&self) -> std::borrow::Cow<'_, [u8]> {
        use std::borrow::Cow;
        match self {
            Message::Text(s) => Cow::Borrowed(s.as_bytes()),
            Message::Binary(data) | Message::Ping(data) | Message::Pong(data) => {
                Cow::Borrowed(data)
            }
            Message::Close(Some(frame)) => Cow::Owned(frame.to_payload()),
            Message::Close(None) => Cow::Borrowed(&[]),
        }
    }

    /// Borrow the text content, if this is a text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Consume and return the text content, if this is a text message.
    #[must_use]
    pub fn into_text(self) -> Option<String> {
        match self {
            Message::Text(s) => Some(s),
            _ => None,
        }
    }
}
