//! Background read loop: socket bytes to decoded messages to callbacks.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, ReadHalf};
use tokio::task::JoinHandle;

use crate::connection::ConnectionState;
use crate::connection::connection::Shared;
use crate::error::Error;
use crate::message::{CloseFrame, Message};
use crate::protocol::FrameDecoder;
use crate::transport::Connector;

/// Start the read loop for `session` on its own task.
pub(crate) fn spawn_reader<C: Connector>(
    shared: Arc<Shared<C>>,
    reader: ReadHalf<C::Stream>,
    leftover: Vec<u8>,
    session: u64,
) -> JoinHandle<()> {
    tokio::spawn(read_loop(shared, reader, leftover, session))
}

/// Reads while the session is open or closing.
///
/// Exits when the state leaves `Open`/`Closing`, when a close frame arrives,
/// or when the transport ends or fails. The last two run the close
/// transition.
async fn read_loop<C: Connector>(
    shared: Arc<Shared<C>>,
    mut reader: ReadHalf<C::Stream>,
    leftover: Vec<u8>,
    session: u64,
) {
    let mut decoder = FrameDecoder::new(shared.config.limits.clone());
    let mut state = shared.subscribe();
    let mut buf = vec![0u8; shared.config.read_chunk_size];

    decoder.push(&leftover);
    if !drain(&shared, &mut decoder, session).await {
        return;
    }

    loop {
        let read = tokio::select! {
            read = reader.read(&mut buf) => read,
            _ = state.wait_for(|s| !s.can_receive() || shared.current_session() != session) => break,
        };

        match read {
            Ok(0) => {
                // after our close frame, the peer dropping the transport is the expected end
                if shared.state() != ConnectionState::Closing {
                    shared.events.fire_error(&Error::Io {
                        kind: std::io::ErrorKind::UnexpectedEof,
                        message: "transport closed by peer".into(),
                    });
                }
                shared.finish(Some(session), None).await;
                break;
            }
            Ok(n) => {
                tracing::trace!(bytes = n, "transport read");
                decoder.push(&buf[..n]);
                if !drain(&shared, &mut decoder, session).await {
                    break;
                }
            }
            Err(e) => {
                shared.events.fire_error(&Error::from(e));
                shared.finish(Some(session), None).await;
                break;
            }
        }
    }
    tracing::debug!(session, "read loop finished");
}

/// Dispatch every message the decoder can produce. Returns `false` once the
/// loop should stop.
async fn drain<C: Connector>(
    shared: &Arc<Shared<C>>,
    decoder: &mut FrameDecoder,
    session: u64,
) -> bool {
    loop {
        match decoder.next_message() {
            Ok(Some(message)) => {
                if !dispatch(shared, message, session).await {
                    return false;
                }
            }
            Ok(None) => return true,
            Err(e) => {
                tracing::debug!(error = %e, "decode error");
                shared.events.fire_error(&e);
            }
        }
    }
}

async fn dispatch<C: Connector>(shared: &Arc<Shared<C>>, message: Message, session: u64) -> bool {
    match message {
        Message::Text(_) | Message::Binary(_) => shared.events.fire_message(&message),
        Message::Ping(payload) => {
            if shared.config.auto_pong {
                let pong = Message::Pong(payload.clone());
                if let Err(e) = shared.send_reporting(&pong, Some(session)).await {
                    tracing::debug!(error = %e, "auto pong failed");
                }
            }
            shared.events.fire_ping(&payload);
        }
        Message::Pong(_) => {
            shared
                .events
                .fire_error(&Error::ProtocolViolation("unexpected pong".into()));
        }
        Message::Close(frame) => {
            if shared.state() == ConnectionState::Open {
                let echo = frame
                    .as_ref()
                    .filter(|f| !f.code.is_reserved())
                    .map(|f| CloseFrame::new(f.code, ""));
                if let Err(e) = shared.write(&Message::Close(echo), Some(session)).await {
                    tracing::debug!(error = %e, "close echo failed");
                }
            }
            shared.finish(Some(session), frame).await;
            return false;
        }
    }
    shared.state().can_receive() && shared.current_session() == session
}
