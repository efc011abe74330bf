//! Encoding of client-to-server messages into masked wire frames.

use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::frame::{Frame, MAX_CONTROL_FRAME_PAYLOAD};
use crate::protocol::handshake::PROTOCOL_VERSION;
use crate::protocol::mask::MaskGenerator;
use crate::protocol::OpCode;

/// Iterator that splits a data payload into frames of at most `fragment_size`
/// bytes. The first frame carries the message opcode, later ones are
/// continuations.
struct Fragments<'a> {
    payload: &'a [u8],
    opcode: OpCode,
    fragment_size: usize,
    offset: usize,
    is_first: bool,
}

impl<'a> Fragments<'a> {
    fn new(payload: &'a [u8], opcode: OpCode, fragment_size: usize) -> Self {
        Self {
            payload,
            opcode,
            fragment_size: fragment_size.max(1),
            offset: 0,
            is_first: true,
        }
    }
}

impl Iterator for Fragments<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.payload.len() {
            // an empty message is still one frame
            if self.is_first {
                self.is_first = false;
                return Some(Frame::new(true, self.opcode, Vec::new()));
            }
            return None;
        }

        let chunk_size = (self.payload.len() - self.offset).min(self.fragment_size);
        let chunk = self.payload[self.offset..self.offset + chunk_size].to_vec();
        self.offset += chunk_size;
        let fin = self.offset >= self.payload.len();

        let opcode = if self.is_first {
            self.is_first = false;
            self.opcode
        } else {
            OpCode::Continuation
        };

        Some(Frame::new(fin, opcode, chunk))
    }
}

/// Produces masked wire bytes for outgoing messages at a negotiated version.
#[derive(Debug)]
pub struct FrameEncoder {
    version: u8,
    fragment_size: usize,
    masks: MaskGenerator,
}

impl FrameEncoder {
    /// Create an encoder for `version`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedVersion` for anything but version 13.
    pub fn new(version: u8, fragment_size: usize) -> Result<Self> {
        if version != PROTOCOL_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        Ok(Self {
            version,
            fragment_size,
            masks: MaskGenerator::new(),
        })
    }

    /// Protocol version this encoder writes.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Encode `message` into a fresh buffer.
    ///
    /// # Errors
    ///
    /// See [`encode_into`](Self::encode_into).
    pub fn encode(&mut self, message: &Message) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_into(message, &mut out)?;
        Ok(out)
    }

    /// Append the wire bytes for `message` to `out`.
    ///
    /// Text and binary payloads larger than the fragment size are split into
    /// continuation frames. Every frame gets its own masking key.
    ///
    /// # Errors
    ///
    /// - `Error::ControlFrameTooLarge` for a ping, pong or close over 125 bytes
    /// - `Error::InvalidCloseCode` for a reserved close status
    pub fn encode_into(&mut self, message: &Message, out: &mut Vec<u8>) -> Result<()> {
        let opcode = OpCode::from(message.message_type());
        let payload = message.payload();

        if opcode.is_control() {
            if payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(payload.len()));
            }
            if let Message::Close(Some(frame)) = message {
                if frame.code.is_reserved() {
                    return Err(Error::InvalidCloseCode(frame.code.as_u16()));
                }
            }
            Frame::new(true, opcode, payload.into_owned()).write_to(out, Some(self.masks.next_mask()));
            return Ok(());
        }

        for frame in Fragments::new(&payload, opcode, self.fragment_size) {
            frame.write_to(out, Some(self.masks.next_mask()));
        }
        Ok(())
    }
}
