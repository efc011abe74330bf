//! Test harness for session lifecycle tests.
//!
//! An in-memory connector that follows a script of refusals and accepted
//! streams, a fake server that speaks raw frames on the other end, and a
//! recorder that captures every callback a session fires.

#![allow(dead_code)]

mod connector;
mod recorder;
mod server;

use std::time::Duration;

pub use connector::ScriptedConnector;
pub use recorder::{Event, Recorder};
pub use server::FakeServer;

use tokio::io::{AsyncRead, AsyncWrite};
use wsession::{Config, Connection, ConnectionState, Connector};

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(10);

/// Configuration pointing at a host the scripted connector ignores.
pub fn config() -> Config {
    Config::new("test.invalid").with_path("/stream")
}

/// Connect `conn` while `server` answers the upgrade.
pub async fn connect<C, S>(conn: &Connection<C>, server: &mut FakeServer<S>)
where
    C: Connector,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (result, _) = tokio::join!(conn.connect(), server.accept());
    result.expect("connect failed");
}

/// Wait until the session reaches `state`.
pub async fn wait_state<C: Connector>(conn: &Connection<C>, state: ConnectionState) {
    let mut rx = conn.subscribe_state();
    tokio::time::timeout(WAIT, rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {state}, still {}", conn.state()))
        .expect("state channel closed");
}
