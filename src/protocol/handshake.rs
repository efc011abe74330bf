//! Client side of the HTTP upgrade handshake (RFC 6455 Section 4).
//!
//! [`ClientHandshake`] builds the upgrade request, accumulates the server's
//! response headers as they arrive and decides whether the upgrade succeeded.
//! It performs no I/O itself.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};
use std::collections::HashMap;

use crate::config::Target;
use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version this client speaks.
pub const PROTOCOL_VERSION: u8 = 13;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Parse header lines into a map keyed by lowercase name.
fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }
    headers
}

/// Reject values that would inject CR or LF into the request.
fn validate_header_value(header_name: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::InvalidHeaderValue {
            header: header_name.to_string(),
            reason: "contains CR or LF characters".to_string(),
        });
    }
    Ok(())
}

/// Computes the Sec-WebSocket-Accept value for a Sec-WebSocket-Key.
///
/// The accept key is Base64(SHA-1(key + GUID)).
///
/// ```
/// use wsession::protocol::handshake::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a random 16-byte Sec-WebSocket-Key.
///
/// # Errors
///
/// Returns `Error::Io` if the OS random source is unavailable.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce).map_err(|e| Error::Io {
        kind: std::io::ErrorKind::Other,
        message: e.to_string(),
    })?;
    Ok(BASE64.encode(nonce))
}

/// Server response to the upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The Sec-WebSocket-Accept value.
    pub accept: String,
    /// The selected Sec-WebSocket-Protocol, if any.
    pub protocol: Option<String>,
    /// Extensions the server listed, if any.
    pub extensions: Vec<String>,
}

impl HandshakeResponse {
    /// Parse a response from raw header bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if:
    /// - The data is not valid UTF-8.
    /// - The status is not `101 Switching Protocols`.
    /// - `Upgrade`, `Connection` or `Sec-WebSocket-Accept` is missing or wrong.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;

        let mut lines = text.lines();
        let status_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;

        let mut status = status_line.split_whitespace();
        if !status.next().is_some_and(|v| v.starts_with("HTTP/1.1")) || status.next() != Some("101")
        {
            return Err(Error::InvalidHandshake(format!(
                "Expected 101 status, got: {status_line}"
            )));
        }

        let headers = parse_headers(lines);

        let upgrade = headers
            .get("upgrade")
            .ok_or_else(|| Error::InvalidHandshake("Missing Upgrade header in response".into()))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Upgrade header: {upgrade}"
            )));
        }

        let connection = headers.get("connection").ok_or_else(|| {
            Error::InvalidHandshake("Missing Connection header in response".into())
        })?;
        if !connection.to_lowercase().contains("upgrade") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Connection header: {connection}"
            )));
        }

        let accept = headers
            .get("sec-websocket-accept")
            .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Accept header".into()))?
            .clone();

        let protocol = headers.get("sec-websocket-protocol").cloned();
        let extensions = headers
            .get("sec-websocket-extensions")
            .map(|e| e.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();

        Ok(Self {
            accept,
            protocol,
            extensions,
        })
    }
}

/// State of one upgrade negotiation.
///
/// Feed it response bytes with [`feed`](Self::feed) until
/// [`is_finished`](Self::is_finished) reports `true`, then inspect
/// [`is_valid`](Self::is_valid).
#[derive(Debug)]
pub struct ClientHandshake {
    key: String,
    request: Vec<u8>,
    buffer: Vec<u8>,
    max_size: usize,
    outcome: Option<Result<HandshakeResponse>>,
}

impl ClientHandshake {
    /// Prepare a handshake for `target` with a freshly generated key.
    ///
    /// # Errors
    ///
    /// Fails if the key cannot be generated or a target field contains CR/LF.
    pub fn new(target: &Target, max_size: usize) -> Result<Self> {
        Self::with_key(target, generate_key()?, max_size)
    }

    /// Prepare a handshake using a caller-supplied key.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHeaderValue` if a target field contains CR/LF.
    pub fn with_key(target: &Target, key: String, max_size: usize) -> Result<Self> {
        validate_header_value("Host", &target.host)?;
        validate_header_value("path", &target.path)?;
        validate_header_value("query", &target.query)?;

        let request = format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: {}\r\n\
             \r\n",
            target.request_uri(),
            target.host_header(),
            key,
            PROTOCOL_VERSION,
        );

        Ok(Self {
            key,
            request: request.into_bytes(),
            buffer: Vec::new(),
            max_size,
            outcome: None,
        })
    }

    /// Request bytes to write to the transport.
    #[must_use]
    pub fn request(&self) -> &[u8] {
        &self.request
    }

    /// The Sec-WebSocket-Key sent with the request.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Accumulate response bytes.
    ///
    /// Returns how many bytes of `data` belong to the handshake. Anything past
    /// the blank line that ends the headers is not consumed; it is the start
    /// of the framed stream.
    pub fn feed(&mut self, data: &[u8]) -> usize {
        if self.outcome.is_some() {
            return 0;
        }

        let search_from = self.buffer.len().saturating_sub(HEADER_TERMINATOR.len() - 1);
        self.buffer.extend_from_slice(data);

        let Some(pos) = self.buffer[search_from..]
            .windows(HEADER_TERMINATOR.len())
            .position(|w| w == HEADER_TERMINATOR)
        else {
            if let Err(e) = check_size(self.buffer.len(), self.max_size) {
                self.outcome = Some(Err(e));
            }
            return data.len();
        };

        let end = search_from + pos + HEADER_TERMINATOR.len();
        let surplus = self.buffer.len() - end;
        self.buffer.truncate(end);

        let outcome = check_size(end, self.max_size)
            .and_then(|()| HandshakeResponse::parse(&self.buffer))
            .and_then(|response| {
                if response.accept == compute_accept_key(&self.key) {
                    Ok(response)
                } else {
                    Err(Error::InvalidHandshake(
                        "Sec-WebSocket-Accept does not match key".into(),
                    ))
                }
            });
        self.outcome = Some(outcome);

        data.len() - surplus
    }

    /// The complete header block has been seen (or the size limit was hit).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// The handshake finished and the server accepted the upgrade.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self.outcome, Some(Ok(_)))
    }

    /// Negotiated protocol version, once the handshake is valid.
    #[must_use]
    pub fn version(&self) -> Option<u8> {
        self.is_valid().then_some(PROTOCOL_VERSION)
    }

    /// Parsed server response, once the handshake is valid.
    #[must_use]
    pub fn response(&self) -> Option<&HandshakeResponse> {
        self.outcome.as_ref().and_then(|o| o.as_ref().ok())
    }

    /// Why the handshake failed, once it has finished invalid.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        self.outcome.as_ref().and_then(|o| o.as_ref().err())
    }
}

fn check_size(size: usize, max: usize) -> Result<()> {
    if size > max {
        return Err(Error::HandshakeTooLarge { size, max });
    }
    Ok(())
}
