//! Session lifecycle: connect, read, dispatch, send, close, reconnect.
//!
//! ## Lifecycle
//!
//! 1. **Connecting** - the transport is being opened
//! 2. **Handshaking** - upgrade request sent, waiting for the response
//! 3. **Open** - read loop running, messages flow both ways
//! 4. **Closing** - close frame sent, waiting for the peer
//! 5. **Closed** - transport released; with reconnect enabled a session
//!    that dropped while open is re-established in the background
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsession::{CloseCode, Config, Connection};
//!
//! # async fn run() -> wsession::Result<()> {
//! let config = Config::new("example.com").with_path("/feed").with_reconnect(true);
//! let conn = Connection::new(config);
//! conn.on_open(|| println!("open"));
//! conn.on_message(|msg| println!("received: {msg:?}"));
//! conn.on_close(|frame| println!("closed: {frame:?}"));
//! conn.connect().await?;
//!
//! conn.send_text("subscribe").await?;
//! conn.close(CloseCode::Normal, "done").await?;
//! conn.join().await;
//! # Ok(())
//! # }
//! ```

mod events;
mod negotiator;
mod reader;
mod state;
mod supervisor;

pub use events::EventDispatcher;
pub use state::ConnectionState;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::Connection;
