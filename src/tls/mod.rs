//! TLS support for `wss://` sessions.
//!
//! Backed by rustls (feature `tls-rustls`, on by default). Without a custom
//! [`ClientConfig`](rustls::ClientConfig) the bundled web PKI roots are trusted.

#[cfg(feature = "tls-rustls")]
mod rustls_impl;

#[cfg(feature = "tls-rustls")]
pub use rustls_impl::{
    TlsConnector, TlsError, TlsStream, client_config_with_roots, load_certs_from_file,
};

#[cfg(feature = "tls-rustls")]
use std::sync::Arc;
#[cfg(feature = "tls-rustls")]
use tokio_rustls::rustls::ClientConfig;

/// Client configuration trusting the Mozilla root set shipped in `webpki-roots`.
#[cfg(feature = "tls-rustls")]
pub fn client_config_with_webpki_roots() -> Arc<ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}
