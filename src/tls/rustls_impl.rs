use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, ServerName};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

use crate::error::Error;

/// Client TLS stream over `S`.
pub type TlsStream<S> = tokio_rustls::client::TlsStream<S>;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("TLS I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TLS configuration error: {0}")]
    Configuration(String),
    #[error("no certificates found in file")]
    NoCertificatesFound,
    #[error("invalid DNS name: {0}")]
    InvalidDnsName(String),
}

impl From<TlsError> for Error {
    fn from(err: TlsError) -> Self {
        match err {
            // refusals and resets keep their transport classification
            TlsError::Io(e) => Error::from(e),
            other => Error::Tls(other.to_string()),
        }
    }
}

/// Wraps an established stream in a client TLS session.
#[derive(Clone)]
pub struct TlsConnector {
    inner: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self {
            inner: tokio_rustls::TlsConnector::from(config),
        }
    }

    pub async fn connect<S>(&self, domain: &str, stream: S) -> Result<TlsStream<S>, TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|_| TlsError::InvalidDnsName(domain.to_string()))?;

        self.inner
            .connect(server_name, stream)
            .await
            .map_err(TlsError::Io)
    }
}

/// Client configuration that trusts exactly `certs`.
///
/// Useful for private deployments and self-signed test servers.
pub fn client_config_with_roots(
    certs: Vec<CertificateDer<'static>>,
) -> Result<Arc<ClientConfig>, TlsError> {
    if certs.is_empty() {
        return Err(TlsError::NoCertificatesFound);
    }
    let mut root_store = RootCertStore::empty();
    for cert in certs {
        root_store
            .add(cert)
            .map_err(|e| TlsError::Configuration(e.to_string()))?;
    }

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

pub fn load_certs_from_file(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificatesFound);
    }

    Ok(certs)
}
