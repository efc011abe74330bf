//! # wsession - long-lived WebSocket client sessions
//!
//! `wsession` keeps a WebSocket client session alive: it opens the transport,
//! negotiates the RFC 6455 upgrade, reads and decodes frames in the
//! background, hands messages to your callbacks and reconnects after the
//! server drops the connection.
//!
//! ## Features
//!
//! - **Callback API**: `on_open`, `on_close`, `on_ping`, `on_error` and
//!   `on_message`, replaceable at any time
//! - **Automatic reconnect** with a configurable retry policy
//! - **Automatic pong** replies to server pings
//! - **TLS** for `wss://` through rustls (feature `tls-rustls`)
//! - **Resource limits** on frames, messages and handshake size
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wsession::{Config, Connection};
//!
//! # async fn run() -> wsession::Result<()> {
//! let config = Config::from_url("wss://stream.example.com/ws")?.with_reconnect(true);
//! let conn = Connection::open(config).await?;
//! conn.on_message(|msg| println!("{msg:?}"));
//! conn.join().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod protocol;
pub mod transport;

#[cfg(feature = "tls-rustls")]
pub mod tls;

pub use config::{Config, Limits, RetryPolicy, Target};
pub use connection::{Connection, ConnectionState};
pub use error::{Error, ErrorKind, Result};
pub use message::{CloseCode, CloseFrame, Message, MessageType};
pub use protocol::{FrameDecoder, FrameEncoder, PROTOCOL_VERSION, compute_accept_key};
pub use transport::{Connector, MaybeTlsStream, TcpConnector, Transport};

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn test_public_types_are_send() {
        assert_send::<Error>();
        assert_send::<Config>();
        assert_send::<Limits>();
        assert_send::<Message>();
        assert_send::<CloseCode>();
        assert_send::<CloseFrame>();
        assert_send::<ConnectionState>();
        assert_send::<Connection>();
    }

    #[test]
    fn test_public_types_are_sync() {
        assert_sync::<Error>();
        assert_sync::<Config>();
        assert_sync::<Limits>();
        assert_sync::<Message>();
        assert_sync::<CloseCode>();
        assert_sync::<CloseFrame>();
        assert_sync::<ConnectionState>();
        assert_sync::<Connection>();
    }
}
