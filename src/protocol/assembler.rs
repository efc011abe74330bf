//! Reassembly of fragmented data messages.

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::{Frame, OpCode};

/// Reassembles fragmented text and binary messages.
///
/// Control frames never pass through here; the decoder handles them between
/// fragments.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    fragment_count: usize,
    opcode: Option<OpCode>,
    limits: Limits,
}

impl MessageAssembler {
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            fragment_count: 0,
            opcode: None,
            limits,
        }
    }

    /// Add a data frame to the message being assembled.
    /// Returns `Some(message)` when FIN=1, `None` otherwise.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for an out-of-order continuation
    /// - `Error::TooManyFragments` / `Error::MessageTooLarge` past the limits
    /// - `Error::InvalidUtf8` if a completed text message is not UTF-8
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>> {
        let opcode = match (frame.opcode, self.opcode) {
            (OpCode::Continuation, None) => {
                return Err(Error::ProtocolViolation(
                    "Unexpected continuation frame".into(),
                ));
            }
            (OpCode::Continuation, Some(current)) => current,
            (_, Some(_)) => {
                return Err(Error::ProtocolViolation(
                    "Expected continuation frame".into(),
                ));
            }
            (OpCode::Text | OpCode::Binary, None) => frame.opcode,
            (other, None) => {
                return Err(Error::ProtocolViolation(format!(
                    "Control opcode {:#x} in data path",
                    other.as_u8()
                )));
            }
        };
        self.opcode = Some(opcode);

        self.limits
            .check_fragment_count(self.fragment_count + 1)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;

        self.buffer.extend_from_slice(frame.payload());
        self.fragment_count += 1;

        if !frame.fin {
            return Ok(None);
        }

        let payload = self.buffer.split().to_vec();
        self.fragment_count = 0;
        self.opcode = None;

        let message = if opcode == OpCode::Text {
            Message::Text(String::from_utf8(payload).map_err(|_| Error::InvalidUtf8)?)
        } else {
            Message::Binary(payload)
        };
        Ok(Some(message))
    }

    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.fragment_count = 0;
        self.opcode = None;
    }
}
