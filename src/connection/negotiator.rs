//! Drives the upgrade handshake over a freshly opened transport.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::{Limits, Target};
use crate::error::{Error, Result};
use crate::protocol::ClientHandshake;

/// Outcome of a successful upgrade.
#[derive(Debug)]
pub(crate) struct Negotiated {
    /// Protocol version the server accepted.
    pub version: u8,
    /// Bytes that arrived after the response headers. They belong to the
    /// framed stream.
    pub leftover: Vec<u8>,
}

/// Send the upgrade request and read the response until the handshake
/// finishes.
///
/// Reads wait on socket readiness; each read pulls at most `chunk_size` bytes.
pub(crate) async fn negotiate<S>(
    stream: &mut S,
    target: &Target,
    limits: &Limits,
    chunk_size: usize,
) -> Result<Negotiated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut handshake = ClientHandshake::new(target, limits.max_handshake_size)?;
    stream.write_all(handshake.request()).await?;
    stream.flush().await?;
    tracing::debug!(host = %target.host, uri = %target.request_uri(), "upgrade request sent");

    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::InvalidHandshake(
                "connection closed before handshake completed".into(),
            ));
        }

        let consumed = handshake.feed(&buf[..n]);
        if !handshake.is_finished() {
            continue;
        }

        return match handshake.version() {
            Some(version) => {
                tracing::debug!(version, "handshake accepted");
                Ok(Negotiated {
                    version,
                    leftover: buf[consumed..n].to_vec(),
                })
            }
            None => Err(handshake
                .error()
                .cloned()
                .unwrap_or_else(|| Error::InvalidHandshake("handshake rejected".into()))),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::compute_accept_key;

    fn target() -> Target {
        Target {
            host: "localhost".into(),
            port: 80,
            secure: false,
            path: "/ws".into(),
            query: String::new(),
        }
    }

    /// Read the request headers and pull out the client key.
    async fn read_key(server: &mut tokio::io::DuplexStream) -> String {
        let mut request = Vec::new();
        let mut byte = [0u8; 1];
        while !request.ends_with(b"\r\n\r\n") {
            server.read_exact(&mut byte).await.unwrap();
            request.push(byte[0]);
        }
        let text = String::from_utf8(request).unwrap();
        text.lines()
            .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_negotiate_success_keeps_leftover() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let server_task = tokio::spawn(async move {
            let key = read_key(&mut server).await;
            let response = format!(
                "HTTP/1.1 101 Switching Protocols\r\n\
                 Upgrade: websocket\r\n\
                 Connection: Upgrade\r\n\
                 Sec-WebSocket-Accept: {}\r\n\r\n",
                compute_accept_key(&key)
            );
            let mut bytes = response.into_bytes();
            bytes.extend_from_slice(&[0x81, 0x02, b'h', b'i']);
            server.write_all(&bytes).await.unwrap();
            server
        });

        let negotiated = negotiate(&mut client, &target(), &Limits::default(), 2048)
            .await
            .unwrap();
        assert_eq!(negotiated.version, 13);
        assert_eq!(negotiated.leftover, vec![0x81, 0x02, b'h', b'i']);
        drop(server_task.await.unwrap());
    }

    #[tokio::test]
    async fn test_negotiate_rejects_bad_status() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let server_task = tokio::spawn(async move {
            read_key(&mut server).await;
            server
                .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n")
                .await
                .unwrap();
            server
        });

        let result = negotiate(&mut client, &target(), &Limits::default(), 1).await;
        assert!(matches!(result, Err(Error::InvalidHandshake(_))));
        drop(server_task.await.unwrap());
    }

    #[tokio::test]
    async fn test_negotiate_eof_before_headers() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let server_task = tokio::spawn(async move {
            read_key(&mut server).await;
            server.write_all(b"HTTP/1.1 101 Switching").await.unwrap();
        });

        let result = negotiate(&mut client, &target(), &Limits::default(), 2048).await;
        server_task.await.unwrap();
        assert!(matches!(result, Err(Error::InvalidHandshake(msg)) if msg.contains("closed")));
    }
}
