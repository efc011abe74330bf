//! Sessions against a real WebSocket server (axum) over TCP.

mod harness;

use std::net::SocketAddr;

use axum::Router;
use axum::extract::ws::{self, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use harness::{Recorder, wait_state};
use tokio::net::TcpListener;
use wsession::{CloseCode, Config, Connection, ConnectionState, ErrorKind, Message};

async fn echo_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(echo)
}

async fn echo(mut socket: WebSocket) {
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            ws::Message::Text(_) | ws::Message::Binary(_) => {
                if socket.send(message).await.is_err() {
                    break;
                }
            }
            ws::Message::Close(_) => break,
            ws::Message::Ping(_) | ws::Message::Pong(_) => {}
        }
    }
}

async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/echo", get(echo_handler));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn open(addr: SocketAddr, config: impl FnOnce(Config) -> Config) -> (Connection, Recorder) {
    let base = Config::new(addr.ip().to_string())
        .with_port(addr.port())
        .with_path("/echo");
    let conn = Connection::new(config(base));
    let recorder = Recorder::attach(&conn);
    conn.connect().await.unwrap();
    (conn, recorder)
}

#[tokio::test]
async fn test_echo_text_and_binary() {
    let addr = spawn_echo_server().await;
    let (conn, recorder) = open(addr, |c| c).await;

    assert_eq!(conn.peer_addr(), Some(addr));
    assert_eq!(conn.protocol_version(), Some(13));

    conn.send_text("hello").await.unwrap();
    conn.send_binary(vec![0u8, 1, 2, 255]).await.unwrap();
    recorder.wait_for(|r| r.messages().len() == 2).await;

    assert_eq!(
        recorder.messages(),
        vec![Message::text("hello"), Message::binary(vec![0u8, 1, 2, 255])]
    );
    assert!(recorder.errors().is_empty());
}

#[tokio::test]
async fn test_echo_fragmented_message() {
    let addr = spawn_echo_server().await;
    let (conn, recorder) = open(addr, |c| c.with_fragment_size(4096)).await;

    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    conn.send_binary(payload.clone()).await.unwrap();
    recorder.wait_for(|r| r.messages().len() == 1).await;

    assert_eq!(recorder.messages(), vec![Message::binary(payload)]);
}

#[tokio::test]
async fn test_server_pong_reply_is_reported() {
    let addr = spawn_echo_server().await;
    let (conn, recorder) = open(addr, |c| c).await;

    conn.ping(b"are you there".to_vec()).await.unwrap();
    recorder.wait_for(|r| !r.errors().is_empty()).await;

    assert_eq!(recorder.errors()[0].kind(), ErrorKind::ProtocolViolation);
    assert_eq!(conn.state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_close_handshake_with_real_server() {
    let addr = spawn_echo_server().await;
    let (conn, recorder) = open(addr, |c| c.with_reconnect(true)).await;

    conn.close(CloseCode::Normal, "bye").await.unwrap();
    wait_state(&conn, ConnectionState::Closed).await;
    conn.join().await;

    assert_eq!(recorder.closes().len(), 1);
    assert_eq!(recorder.opens(), 1);
    assert!(recorder.errors().is_empty());
}
