//! Server side of a scripted session, speaking raw frames.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use wsession::Error;
use wsession::protocol::compute_accept_key;
use wsession::protocol::frame::{Frame, FrameHeader};

pub struct FakeServer<S = DuplexStream> {
    stream: S,
    buf: Vec<u8>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FakeServer<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    async fn fill(&mut self) -> bool {
        let mut chunk = [0u8; 4096];
        let n = self.stream.read(&mut chunk).await.unwrap_or(0);
        self.buf.extend_from_slice(&chunk[..n]);
        n > 0
    }

    /// Read the client's upgrade request.
    pub async fn read_request(&mut self) -> String {
        loop {
            if let Some(pos) = self.buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let request: Vec<u8> = self.buf.drain(..pos + 4).collect();
                return String::from_utf8(request).unwrap();
            }
            assert!(self.fill().await, "client went away during handshake");
        }
    }

    /// Complete the upgrade. Returns the request that was answered.
    pub async fn accept(&mut self) -> String {
        let request = self.read_request().await;
        let key = request
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("sec-websocket-key")
                    .then(|| value.trim().to_string())
            })
            .expect("request without Sec-WebSocket-Key");
        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            compute_accept_key(&key)
        );
        self.send_raw(response.as_bytes()).await;
        request
    }

    /// Answer the upgrade request with `response` verbatim.
    pub async fn reject(&mut self, response: &str) {
        self.read_request().await;
        self.send_raw(response.as_bytes()).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    /// Send a frame unmasked, as a server does.
    pub async fn send_frame(&mut self, frame: Frame) {
        let mut out = Vec::new();
        frame.write_to(&mut out, None);
        self.send_raw(&out).await;
    }

    pub async fn send_text(&mut self, text: &str) {
        self.send_frame(Frame::text(text)).await;
    }

    pub async fn send_ping(&mut self, payload: &[u8]) {
        self.send_frame(Frame::ping(payload)).await;
    }

    pub async fn send_pong(&mut self, payload: &[u8]) {
        self.send_frame(Frame::pong(payload)).await;
    }

    pub async fn send_close(&mut self, code: u16, reason: &str) {
        self.send_frame(Frame::close(Some(code), reason)).await;
    }

    /// Next frame from the client, or `None` once it has closed the stream.
    pub async fn read_frame(&mut self) -> Option<Frame> {
        loop {
            match FrameHeader::parse(&self.buf) {
                Ok(header) => {
                    assert!(header.mask.is_some(), "client frame was not masked");
                    if self.buf.len() >= header.frame_len().unwrap() {
                        let (frame, consumed) = Frame::parse(&self.buf).unwrap();
                        self.buf.drain(..consumed);
                        return Some(frame);
                    }
                }
                Err(Error::IncompleteFrame { .. }) => {}
                Err(e) => panic!("malformed client frame: {e}"),
            }
            if !self.fill().await {
                return None;
            }
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}
