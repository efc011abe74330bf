//! Transport connections: plain TCP, TLS, and the seam tests plug into.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::net::TcpStream;

use crate::config::Target;
use crate::error::Result;
#[cfg(feature = "tls-rustls")]
use crate::tls::{TlsConnector, TlsStream, client_config_with_webpki_roots};

/// Information about an established byte stream.
pub trait Transport {
    /// Address of the remote end, when the stream has one.
    fn peer_addr(&self) -> Option<SocketAddr>;
}

impl Transport for TcpStream {
    fn peer_addr(&self) -> Option<SocketAddr> {
        TcpStream::peer_addr(self).ok()
    }
}

#[cfg(feature = "tls-rustls")]
impl<S: Transport> Transport for TlsStream<S> {
    fn peer_addr(&self) -> Option<SocketAddr> {
        self.get_ref().0.peer_addr()
    }
}

impl Transport for DuplexStream {
    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// Opens the byte stream a session runs over.
///
/// The default [`TcpConnector`] dials TCP and adds TLS for secure targets.
/// Other implementations can supply in-memory or proxied streams.
pub trait Connector: Send + Sync + 'static {
    /// Stream produced by a successful connect.
    type Stream: AsyncRead + AsyncWrite + Transport + Unpin + Send + 'static;

    /// Open a stream to `target`.
    ///
    /// A refused connection should surface as `Error::TransportRefused` so the
    /// reconnect supervisor can retry it quietly.
    fn connect(&self, target: &Target) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// A TCP stream, optionally wrapped in TLS.
#[derive(Debug)]
pub enum MaybeTlsStream {
    Plain(TcpStream),
    #[cfg(feature = "tls-rustls")]
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport for MaybeTlsStream {
    fn peer_addr(&self) -> Option<SocketAddr> {
        match self {
            MaybeTlsStream::Plain(s) => Transport::peer_addr(s),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Transport::peer_addr(s.as_ref()),
        }
    }
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_flush(cx),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Dials TCP and, for secure targets, negotiates TLS with rustls.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    #[cfg(feature = "tls-rustls")]
    tls: Option<std::sync::Arc<rustls::ClientConfig>>,
}

impl TcpConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` instead of the web PKI roots for secure targets.
    #[cfg(feature = "tls-rustls")]
    #[must_use]
    pub fn with_tls_config(mut self, config: std::sync::Arc<rustls::ClientConfig>) -> Self {
        self.tls = Some(config);
        self
    }

    #[cfg(feature = "tls-rustls")]
    async fn secure(&self, host: &str, stream: TcpStream) -> Result<MaybeTlsStream> {
        let config = self
            .tls
            .clone()
            .unwrap_or_else(client_config_with_webpki_roots);
        let stream = TlsConnector::new(config).connect(host, stream).await?;
        Ok(MaybeTlsStream::Tls(Box::new(stream)))
    }

    #[cfg(not(feature = "tls-rustls"))]
    async fn secure(&self, _host: &str, _stream: TcpStream) -> Result<MaybeTlsStream> {
        Err(crate::error::Error::Tls(
            "secure transport requires the `tls-rustls` feature".into(),
        ))
    }
}

impl Connector for TcpConnector {
    type Stream = MaybeTlsStream;

    async fn connect(&self, target: &Target) -> Result<Self::Stream> {
        let (host, port) = target.authority();
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        tracing::debug!(host, port, secure = target.secure, "transport connected");

        if target.secure {
            self.secure(host, stream).await
        } else {
            Ok(MaybeTlsStream::Plain(stream))
        }
    }
}
