//! Configuration, limits and retry policy for client sessions.

use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use url::Url;

use crate::error::{Error, Result};

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(60);
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration limits for incoming data.
///
/// These limits prevent resource exhaustion and ensure
/// bounded memory usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a single frame in bytes.
    ///
    /// Default: 16 MB (16 * 1024 * 1024)
    pub max_frame_size: usize,

    /// Maximum size of a complete message in bytes.
    ///
    /// This applies to the total size after reassembling all fragments.
    ///
    /// Default: 64 MB (64 * 1024 * 1024)
    pub max_message_size: usize,

    /// Maximum number of fragments in a single message.
    ///
    /// Default: 128
    pub max_fragment_count: usize,

    /// Maximum size of the handshake response headers in bytes.
    ///
    /// Default: 8 KB (8192)
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,   // 16 MB
            max_message_size: 64 * 1024 * 1024, // 64 MB
            max_fragment_count: 128,
            max_handshake_size: 8192,
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_fragment_count: usize,
        max_handshake_size: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_fragment_count,
            max_handshake_size,
        }
    }

    /// Validate that message size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<()> {
        if size > self.max_message_size {
            Err(Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that frame size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: usize) -> Result<()> {
        if size > self.max_frame_size {
            Err(Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that fragment count is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TooManyFragments`] if `count` exceeds the configured maximum.
    pub const fn check_fragment_count(&self, count: usize) -> Result<()> {
        if count > self.max_fragment_count {
            Err(Error::TooManyFragments {
                count,
                max: self.max_fragment_count,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that handshake size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeTooLarge`] if `size` exceeds the configured maximum.
    pub const fn check_handshake_size(&self, size: usize) -> Result<()> {
        if size > self.max_handshake_size {
            Err(Error::HandshakeTooLarge {
                size,
                max: self.max_handshake_size,
            })
        } else {
            Ok(())
        }
    }
}

/// How the reconnect supervisor paces and bounds its attempts.
///
/// The default retries forever at a fixed one second interval.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub delay: Duration,
    /// Upper bound for the delay once the multiplier has grown it.
    pub max_delay: Duration,
    /// Growth factor applied after each failed attempt. `1.0` keeps the delay fixed.
    pub multiplier: f64,
    /// Maximum number of attempts before giving up. `None` means unbounded.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RETRY_DELAY,
            max_delay: DEFAULT_MAX_RETRY_DELAY,
            multiplier: 1.0,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Fixed-interval retries with no attempt cap.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_delay: delay,
            ..Self::default()
        }
    }

    /// Exponentially growing retries capped at `max_delay`.
    #[must_use]
    pub fn exponential(delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            delay,
            max_delay,
            multiplier,
            max_attempts: None,
        }
    }

    /// Stop after `attempts` failed attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Returns `true` once `attempts` has used up the budget.
    #[must_use]
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

impl From<&RetryPolicy> for ExponentialBackoff {
    fn from(policy: &RetryPolicy) -> Self {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(policy.delay)
            .with_max_interval(policy.max_delay.max(policy.delay))
            .with_multiplier(policy.multiplier)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None) // attempts are bounded by `max_attempts`
            .build()
    }
}

/// Where a session dials and what it requests once connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Remote host name or address.
    pub host: String,
    /// Port actually dialled.
    pub port: u16,
    /// Wrap the stream in TLS.
    pub secure: bool,
    /// Request path. Empty means `/`.
    pub path: String,
    /// Query string without the leading `?`.
    pub query: String,
}

impl Target {
    /// Request URI sent in the upgrade request line.
    #[must_use]
    pub fn request_uri(&self) -> String {
        let mut uri = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        if !self.query.is_empty() {
            uri.push('?');
            uri.push_str(&self.query);
        }
        uri
    }

    /// Value of the `Host` header. The port is omitted when it is the scheme default.
    #[must_use]
    pub fn host_header(&self) -> String {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let default_port = if self.secure { 443 } else { 80 };
        if self.port == default_port {
            host
        } else {
            format!("{host}:{}", self.port)
        }
    }

    /// `host:port` pair for socket resolution.
    #[must_use]
    pub fn authority(&self) -> (&str, u16) {
        (self.host.trim_start_matches('[').trim_end_matches(']'), self.port)
    }
}

/// Client session configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote host name or address.
    pub host: String,

    /// Request path. Empty means `/`.
    pub path: String,

    /// Query string without the leading `?`, e.g. `a=b&c=d`.
    pub query: String,

    /// Use an encrypted transport (`wss://`).
    pub secure: bool,

    /// Remote port. Defaults to 443 when `secure`, 80 otherwise.
    pub port: Option<u16>,

    /// Re-establish the session after an unexpected close.
    ///
    /// Default: false
    pub reconnect: bool,

    /// Pacing and bounds for reconnect attempts.
    pub retry: RetryPolicy,

    /// Maximum bytes pulled from the socket per read.
    ///
    /// Default: 2048
    pub read_chunk_size: usize,

    /// Answer every ping with a pong carrying the same payload.
    ///
    /// Default: true
    pub auto_pong: bool,

    /// Deadline for the upgrade handshake. `None` waits indefinitely.
    ///
    /// Default: 30 seconds
    pub handshake_timeout: Option<Duration>,

    /// Fragment size for outgoing messages (in bytes).
    ///
    /// Default: 16 KB (16 * 1024)
    pub fragment_size: usize,

    /// Resource limits.
    pub limits: Limits,

    /// TLS client configuration used when `secure` is set.
    ///
    /// `None` trusts the bundled web PKI roots.
    #[cfg(feature = "tls-rustls")]
    pub tls: Option<std::sync::Arc<rustls::ClientConfig>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: String::new(),
            path: String::new(),
            query: String::new(),
            secure: false,
            port: None,
            reconnect: false,
            retry: RetryPolicy::default(),
            read_chunk_size: 2048,
            auto_pong: true,
            handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            fragment_size: 16 * 1024,
            limits: Limits::default(),
            #[cfg(feature = "tls-rustls")]
            tls: None,
        }
    }
}

impl Config {
    /// Create a configuration for `host` with default options.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Build a configuration from a `ws://` or `wss://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the URL does not parse, uses another
    /// scheme, or has no host.
    pub fn from_url(input: &str) -> Result<Self> {
        let url = Url::parse(input).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let secure = match url.scheme() {
            "ws" => false,
            "wss" => true,
            other => {
                return Err(Error::InvalidConfig(format!(
                    "unsupported scheme: {other}"
                )));
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidConfig("missing host".into()))?;

        Ok(Self {
            host: host.to_string(),
            path: url.path().to_string(),
            query: url.query().unwrap_or_default().to_string(),
            secure,
            port: url.port(),
            ..Default::default()
        })
    }

    /// Set the request path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the query string.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Select the encrypted transport.
    #[must_use]
    pub const fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set an explicit port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Enable or disable automatic reconnect.
    #[must_use]
    pub const fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the reconnect retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Shorthand for a fixed retry delay.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry = RetryPolicy {
            max_attempts: self.retry.max_attempts,
            ..RetryPolicy::fixed(delay)
        };
        self
    }

    /// Set the socket read chunk size.
    #[must_use]
    pub const fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    /// Enable or disable automatic pong replies.
    #[must_use]
    pub const fn with_auto_pong(mut self, auto_pong: bool) -> Self {
        self.auto_pong = auto_pong;
        self
    }

    /// Set or clear the handshake deadline.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set fragment size for outgoing messages.
    #[must_use]
    pub const fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = size;
        self
    }

    /// Set custom limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Use a custom rustls client configuration for `wss://`.
    #[cfg(feature = "tls-rustls")]
    #[must_use]
    pub fn with_tls_config(mut self, tls: std::sync::Arc<rustls::ClientConfig>) -> Self {
        self.tls = Some(tls);
        self
    }

    /// The port actually dialled.
    #[must_use]
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(if self.secure { 443 } else { 80 })
    }

    /// The dial and request target described by this configuration.
    #[must_use]
    pub fn target(&self) -> Target {
        Target {
            host: self.host.clone(),
            port: self.effective_port(),
            secure: self.secure,
            path: self.path.clone(),
            query: self.query.clone(),
        }
    }

    /// Check the configuration before connecting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an empty host or zero-sized buffers.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfig("host is required".into()));
        }
        if self.read_chunk_size == 0 {
            return Err(Error::InvalidConfig(
                "read_chunk_size must be non-zero".into(),
            ));
        }
        if self.fragment_size == 0 {
            return Err(Error::InvalidConfig("fragment_size must be non-zero".into()));
        }
        Ok(())
    }
}
