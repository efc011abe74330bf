//! Incremental decoding of server-to-client frames into messages.

use bytes::{Buf, BytesMut};

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::message::{CloseFrame, Message};
use crate::protocol::assembler::MessageAssembler;
use crate::protocol::frame::{Frame, FrameHeader};
use crate::protocol::OpCode;

/// Turns raw bytes read from the socket into complete [`Message`]s.
///
/// Push bytes with [`push`](Self::push) as they arrive and drain with
/// [`next_message`](Self::next_message) until it returns `Ok(None)`.
///
/// After an error the decoder stays usable: a frame with a reserved opcode is
/// skipped, any other error drops everything buffered so far.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    assembler: MessageAssembler,
    limits: Limits,
}

impl FrameDecoder {
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            assembler: MessageAssembler::new(limits.clone()),
            limits,
        }
    }

    /// Append bytes read from the transport.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes buffered but not yet decoded.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Decode the next complete message, if enough bytes are buffered.
    ///
    /// Control frames interleaved with a fragmented message are returned as
    /// soon as they arrive.
    ///
    /// # Errors
    ///
    /// - `Error::UnrecognizedMessageType` for a reserved opcode
    /// - `Error::MaskedServerFrame`, `Error::ReservedBitsSet` and the
    ///   other framing errors for malformed input
    /// - limit and UTF-8 errors from reassembly
    pub fn next_message(&mut self) -> Result<Option<Message>> {
        loop {
            let Some(frame) = self.next_frame()? else {
                return Ok(None);
            };
            tracing::trace!(opcode = ?frame.opcode, fin = frame.fin, len = frame.payload().len(), "frame received");

            let message = match frame.opcode {
                OpCode::Close => Message::Close(CloseFrame::from_payload(frame.payload())),
                OpCode::Ping => Message::Ping(frame.into_payload()),
                OpCode::Pong => Message::Pong(frame.into_payload()),
                OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                    match self.assembler.push(frame) {
                        Ok(Some(message)) => message,
                        Ok(None) => continue,
                        Err(e) => {
                            self.reset();
                            return Err(e);
                        }
                    }
                }
            };
            return Ok(Some(message));
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let header = match FrameHeader::parse(&self.buffer) {
            Ok(header) => header,
            Err(Error::IncompleteFrame { .. }) => return Ok(None),
            Err(e) => return Err(self.fail(e)),
        };

        if header.mask.is_some() {
            return Err(self.fail(Error::MaskedServerFrame));
        }
        if let Err(e) = self.limits.check_frame_size(header.payload_len) {
            return Err(self.fail(e));
        }

        let total = match header.frame_len() {
            Ok(total) => total,
            Err(e) => return Err(self.fail(e)),
        };
        if self.buffer.len() < total {
            return Ok(None);
        }

        match Frame::parse(&self.buffer[..total]) {
            Ok((frame, consumed)) => {
                self.buffer.advance(consumed);
                if let Err(e) = frame.validate() {
                    return Err(self.fail(e));
                }
                Ok(Some(frame))
            }
            Err(Error::ReservedOpcode(opcode)) => {
                self.buffer.advance(total);
                Err(Error::UnrecognizedMessageType(opcode))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn fail(&mut self, error: Error) -> Error {
        self.reset();
        error
    }

    /// Drop all buffered bytes and any partially assembled message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.assembler.reset();
    }
}
