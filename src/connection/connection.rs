use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::connection::ConnectionState;
use crate::connection::events::EventDispatcher;
use crate::connection::negotiator::negotiate;
use crate::connection::reader::spawn_reader;
use crate::connection::supervisor::spawn_supervisor;
use crate::error::{Error, ErrorKind, Result};
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::FrameEncoder;
use crate::transport::{Connector, TcpConnector, Transport};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Write side of an open session. Only one writer exists at a time, so frames
/// never interleave on the wire.
pub(crate) struct Writer<S> {
    half: WriteHalf<S>,
    encoder: FrameEncoder,
    session: u64,
}

/// State shared between the public handle, the read loop and the reconnect
/// supervisor.
pub(crate) struct Shared<C: Connector> {
    pub(crate) config: Config,
    connector: C,
    pub(crate) events: EventDispatcher,
    state: watch::Sender<ConnectionState>,
    writer: tokio::sync::Mutex<Option<Writer<C::Stream>>>,
    /// Incremented every time a handshake succeeds.
    session: AtomicU64,
    version: AtomicU8,
    peer: Mutex<Option<SocketAddr>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pub(crate) reconnecting: AtomicBool,
    stop_reconnect: AtomicBool,
    pub(crate) wake: Notify,
}

impl<C: Connector> Shared<C> {
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub(crate) fn current_session(&self) -> u64 {
        self.session.load(Ordering::Acquire)
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_reconnect.load(Ordering::Acquire)
    }

    /// Move to `next` if the lifecycle allows it.
    fn advance(&self, next: ConnectionState) -> bool {
        let mut from = None;
        self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                from = Some(*state);
                *state = next;
                true
            } else {
                false
            }
        });
        if let Some(from) = from {
            tracing::debug!(%from, to = %next, "state transition");
        }
        from.is_some()
    }

    /// Spawn the next background worker and record its handle.
    ///
    /// The slot stays locked across the spawn, so a worker that immediately
    /// hands over to its successor cannot be overwritten by its own handle.
    fn spawn_worker(&self, spawn: impl FnOnce() -> JoinHandle<()>) {
        let mut slot = lock(&self.worker);
        *slot = Some(spawn());
    }

    /// Hand the session to the reconnect supervisor.
    fn start_reconnect(self: &Arc<Self>) {
        self.reconnecting.store(true, Ordering::Release);
        self.spawn_worker(|| spawn_supervisor(Arc::clone(self)));
    }

    /// Open the transport, negotiate, and start reading.
    ///
    /// On failure the state is left `Closed` and no event has fired; the
    /// caller decides what to report.
    pub(crate) async fn establish(self: &Arc<Self>) -> Result<()> {
        if !self.advance(ConnectionState::Connecting) {
            return Err(Error::AlreadyConnected);
        }
        let result = self.open_session().await;
        if result.is_err() {
            self.advance(ConnectionState::Closed);
        }
        result
    }

    async fn open_session(self: &Arc<Self>) -> Result<()> {
        let target = self.config.target();
        let mut stream = self.connector.connect(&target).await?;
        self.advance(ConnectionState::Handshaking);

        let negotiating = negotiate(
            &mut stream,
            &target,
            &self.config.limits,
            self.config.read_chunk_size,
        );
        let negotiated = match self.config.handshake_timeout {
            Some(limit) => tokio::time::timeout(limit, negotiating)
                .await
                .map_err(|_| Error::HandshakeTimeout)??,
            None => negotiating.await?,
        };
        let encoder = FrameEncoder::new(negotiated.version, self.config.fragment_size)?;

        let peer = stream.peer_addr();
        let (read_half, write_half) = tokio::io::split(stream);
        let session = self.session.fetch_add(1, Ordering::AcqRel) + 1;
        *self.writer.lock().await = Some(Writer {
            half: write_half,
            encoder,
            session,
        });
        self.version.store(negotiated.version, Ordering::Release);
        *lock(&self.peer) = peer;

        if !self.advance(ConnectionState::Open) {
            self.writer.lock().await.take();
            return Err(Error::ConnectionClosed(None));
        }
        self.reconnecting.store(false, Ordering::Release);
        tracing::debug!(session, ?peer, "session open");

        self.events.fire_open();
        self.spawn_worker(|| {
            spawn_reader(Arc::clone(self), read_half, negotiated.leftover, session)
        });
        Ok(())
    }

    /// Encode and write one message.
    ///
    /// With `session` set, the write only goes out if that session still owns
    /// the writer.
    pub(crate) async fn write(&self, message: &Message, session: Option<u64>) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = match guard.as_mut() {
            Some(writer) if session.is_none_or(|id| id == writer.session) => writer,
            _ => return Err(Error::ConnectionClosed(None)),
        };

        let bytes = writer.encoder.encode(message)?;
        writer.half.write_all(&bytes).await?;
        writer.half.flush().await?;
        tracing::trace!(kind = %message.message_type(), len = bytes.len(), "message written");
        Ok(())
    }

    /// Write and report failures through the callbacks. A broken pipe also
    /// closes the session.
    pub(crate) async fn send_reporting(
        self: &Arc<Self>,
        message: &Message,
        session: Option<u64>,
    ) -> Result<()> {
        match self.write(message, session).await {
            Ok(()) => Ok(()),
            Err(e @ Error::ConnectionClosed(_)) => Err(e),
            Err(e) => {
                self.events.fire_error(&e);
                if e.is_broken_pipe() {
                    self.finish(session, None).await;
                }
                Err(e)
            }
        }
    }

    /// Transition to `Closed`, release the transport and fire `close`.
    ///
    /// Idempotent: only the call that performs the transition has any effect.
    /// A session that was `Open` hands over to the reconnect supervisor when
    /// reconnect is enabled.
    pub(crate) async fn finish(self: &Arc<Self>, session: Option<u64>, frame: Option<CloseFrame>) {
        if session.is_some_and(|id| id != self.current_session()) {
            return;
        }
        let mut previous = None;
        self.state.send_if_modified(|state| {
            if state.can_transition_to(ConnectionState::Closed) {
                previous = Some(*state);
                *state = ConnectionState::Closed;
                true
            } else {
                false
            }
        });
        let Some(previous) = previous else {
            return;
        };
        tracing::debug!(from = %previous, close = ?frame, "session closed");

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.half.shutdown().await {
                tracing::trace!(error = %e, "transport shutdown failed");
            }
        }

        self.events.fire_close(frame);

        if previous == ConnectionState::Open && self.config.reconnect && !self.stop_requested() {
            self.start_reconnect();
        }
    }

    /// Begin a client-initiated close.
    pub(crate) async fn close(self: &Arc<Self>, frame: CloseFrame) -> Result<()> {
        if frame.code.is_reserved() {
            return Err(Error::InvalidCloseCode(frame.code.as_u16()));
        }
        self.stop_reconnect.store(true, Ordering::Release);
        self.wake.notify_waiters();

        if !self.advance(ConnectionState::Closing) {
            return Ok(());
        }
        let session = self.current_session();
        if let Err(e) = self.write(&Message::Close(Some(frame)), Some(session)).await {
            self.events.fire_error(&e);
            self.finish(Some(session), None).await;
            return Err(e);
        }
        Ok(())
    }
}

/// A long-lived client session.
///
/// `Connection` is a cheap handle: clones share the same session. The
/// handshake runs on the task that calls [`connect`](Self::connect); incoming
/// messages are read by a background task and delivered to the registered
/// callbacks.
///
/// ```no_run
/// use wsession::{Config, Connection, Message};
///
/// # async fn run() -> wsession::Result<()> {
/// let conn = Connection::new(Config::from_url("ws://localhost:9001/feed")?);
/// conn.on_message(|msg: &Message| println!("{msg:?}"));
/// conn.connect().await?;
/// conn.send_text("hello").await?;
/// conn.join().await;
/// # Ok(())
/// # }
/// ```
pub struct Connection<C: Connector = TcpConnector> {
    shared: Arc<Shared<C>>,
}

impl<C: Connector> Clone for Connection<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Connector> std::fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.shared.config.host)
            .field("state", &self.state())
            .field("events", &self.shared.events)
            .finish_non_exhaustive()
    }
}

impl Connection<TcpConnector> {
    /// Create an unconnected session that dials TCP (and TLS for `wss`).
    #[must_use]
    pub fn new(config: Config) -> Self {
        #[cfg(feature = "tls-rustls")]
        let connector = match &config.tls {
            Some(tls) => TcpConnector::new().with_tls_config(Arc::clone(tls)),
            None => TcpConnector::new(),
        };
        #[cfg(not(feature = "tls-rustls"))]
        let connector = TcpConnector::new();
        Self::with_connector(config, connector)
    }

    /// Create a session and connect it.
    ///
    /// Callbacks registered afterwards still see the open event, because
    /// registering `on_open` on an open session runs it immediately.
    ///
    /// # Errors
    ///
    /// Whatever [`connect`](Self::connect) returns.
    pub async fn open(config: Config) -> Result<Self> {
        let conn = Self::new(config);
        conn.connect().await?;
        Ok(conn)
    }
}

impl<C: Connector> Connection<C> {
    /// Create an unconnected session using a custom transport connector.
    pub fn with_connector(config: Config, connector: C) -> Self {
        let (state, _) = watch::channel(ConnectionState::Init);
        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                events: EventDispatcher::new(),
                state,
                writer: tokio::sync::Mutex::new(None),
                session: AtomicU64::new(0),
                version: AtomicU8::new(0),
                peer: Mutex::new(None),
                worker: Mutex::new(None),
                reconnecting: AtomicBool::new(false),
                stop_reconnect: AtomicBool::new(false),
                wake: Notify::new(),
            }),
        }
    }

    /// Open the transport and perform the handshake.
    ///
    /// Returns once the session is open or has failed. On success `open`
    /// fires and the read loop starts. On failure `error` then `close` fire
    /// and the session is `Closed`. A rejected or timed out handshake then
    /// hands over to the reconnect supervisor when reconnect is enabled; a
    /// refused or broken transport does not.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidConfig` if the configuration is unusable
    /// - `Error::AlreadyConnected` while a session is active or reconnecting
    /// - transport, TLS and handshake errors
    pub async fn connect(&self) -> Result<()> {
        let shared = &self.shared;
        shared.config.validate()?;
        if shared.reconnecting.load(Ordering::Acquire) || !shared.state().can_connect() {
            return Err(Error::AlreadyConnected);
        }
        shared.stop_reconnect.store(false, Ordering::Release);

        match shared.establish().await {
            Ok(()) => Ok(()),
            Err(Error::AlreadyConnected) => Err(Error::AlreadyConnected),
            Err(e) => {
                tracing::debug!(error = %e, "connect failed");
                shared.events.fire_error(&e);
                shared.events.fire_close(None);
                if e.kind() == ErrorKind::HandshakeInvalid
                    && shared.config.reconnect
                    && !shared.stop_requested()
                {
                    shared.start_reconnect();
                }
                Err(e)
            }
        }
    }

    /// Close the session with `code` and `reason`.
    ///
    /// Sends a close frame and moves to `Closing`; the read loop finishes the
    /// transition when the peer answers. Also cancels any pending reconnect.
    /// Does nothing if the session is not open.
    ///
    /// # Errors
    ///
    /// `Error::InvalidCloseCode` for reserved codes, or the write error.
    pub async fn close(&self, code: CloseCode, reason: &str) -> Result<()> {
        self.shared.close(CloseFrame::new(code, reason)).await
    }

    /// Send a message.
    ///
    /// # Errors
    ///
    /// `Error::ConnectionClosed` unless the session is open, otherwise any
    /// encoding or write error (which is also reported through `on_error`).
    pub async fn send(&self, message: Message) -> Result<()> {
        if !self.state().can_send() {
            return Err(Error::ConnectionClosed(None));
        }
        self.shared.send_reporting(&message, None).await
    }

    /// Send a text message.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Message::text(text)).await
    }

    /// Send a binary message.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Message::binary(data)).await
    }

    /// Send a ping.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn ping(&self, payload: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Message::ping(payload)).await
    }

    /// Called each time the session opens. Runs immediately if already open.
    pub fn on_open<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.events.set_on_open(Arc::new(callback));
    }

    /// Called each time the session closes, with the peer's close frame if
    /// there was one. Runs immediately if already closed.
    pub fn on_close<F>(&self, callback: F)
    where
        F: Fn(Option<&CloseFrame>) + Send + Sync + 'static,
    {
        self.shared.events.set_on_close(Arc::new(callback));
    }

    /// Called with the payload of every ping the server sends.
    pub fn on_ping<F>(&self, callback: F)
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.shared.events.set_on_ping(Arc::new(callback));
    }

    /// Called for every reported failure.
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.shared.events.set_on_error(Arc::new(callback));
    }

    /// Called for every text or binary message.
    pub fn on_message<F>(&self, callback: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.shared.events.set_on_message(Arc::new(callback));
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// `true` from the start of a connect until the session closes.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Protocol version of the most recent successful handshake.
    #[must_use]
    pub fn protocol_version(&self) -> Option<u8> {
        match self.shared.version.load(Ordering::Acquire) {
            0 => None,
            version => Some(version),
        }
    }

    /// Remote address of the most recent session's transport.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        *lock(&self.shared.peer)
    }

    /// Watch state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.subscribe()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Wait for the background worker to finish.
    ///
    /// Follows the session across reconnects and returns once nothing is
    /// reading or reconnecting.
    pub async fn join(&self) {
        loop {
            let handle = lock(&self.shared.worker).take();
            let Some(handle) = handle else {
                break;
            };
            if let Err(e) = handle.await {
                if e.is_panic() {
                    tracing::warn!("background worker panicked");
                }
            }
        }
    }
}
