//! Long-lived client session example.
//!
//! Connects to the given URL, prints everything the server sends, and keeps
//! the session alive across server restarts.
//!
//! Run: cargo run --example client -- ws://127.0.0.1:9001/feed "subscribe trades"

use std::time::Duration;

use tracing_subscriber::EnvFilter;
use wsession::{CloseCode, Config, Connection, Message, RetryPolicy};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .unwrap_or_else(|| "ws://127.0.0.1:9001/".to_string());
    let greeting = args.next();

    let config = Config::from_url(&url)?
        .with_reconnect(true)
        .with_retry(RetryPolicy::exponential(
            Duration::from_secs(1),
            2.0,
            Duration::from_secs(30),
        ));

    let conn = Connection::new(config);
    conn.on_open(|| tracing::info!("session open"));
    conn.on_close(|frame| tracing::info!(?frame, "session closed"));
    conn.on_error(|error| tracing::warn!(%error, "session error"));
    conn.on_ping(|payload| tracing::debug!(len = payload.len(), "ping"));
    conn.on_message(|message| match message {
        Message::Text(text) => println!("{text}"),
        Message::Binary(data) => println!("<{} bytes>", data.len()),
        _ => {}
    });

    conn.connect().await?;
    if let Some(greeting) = greeting {
        conn.send_text(greeting).await?;
    }

    let closer = conn.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if let Err(e) = closer.close(CloseCode::Normal, "bye").await {
                tracing::warn!(error = %e, "close failed");
            }
        }
    });

    conn.join().await;
    Ok(())
}
