//! Callback registry and dispatch.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Error;
use crate::message::{CloseFrame, Message};

type OpenCallback = Arc<dyn Fn() + Send + Sync>;
type CloseCallback = Arc<dyn Fn(Option<&CloseFrame>) + Send + Sync>;
type PingCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;
type MessageCallback = Arc<dyn Fn(&Message) + Send + Sync>;

/// Last lifecycle event, replayed to a late-registered open or close callback.
#[derive(Debug, Default)]
enum Replay {
    #[default]
    None,
    Open,
    Closed(Option<CloseFrame>),
}

#[derive(Default)]
struct Slots {
    open: Option<OpenCallback>,
    close: Option<CloseCallback>,
    ping: Option<PingCallback>,
    error: Option<ErrorCallback>,
    message: Option<MessageCallback>,
    replay: Replay,
}

/// Five independently replaceable callback slots.
///
/// Callbacks are always invoked with the registry unlocked, so a callback may
/// replace any slot, including its own. A panicking callback is caught and
/// reported through the error slot as [`Error::CallbackPanicked`].
#[derive(Default)]
pub struct EventDispatcher {
    slots: Mutex<Slots>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.lock();
        f.debug_struct("EventDispatcher")
            .field("open", &slots.open.is_some())
            .field("close", &slots.close.is_some())
            .field("ping", &slots.ping.is_some())
            .field("error", &slots.error.is_some())
            .field("message", &slots.message.is_some())
            .field("replay", &slots.replay)
            .finish()
    }
}

impl EventDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the open callback. Runs it at once if the session is open.
    pub fn set_on_open(&self, callback: OpenCallback) {
        let replay = {
            let mut slots = self.lock();
            slots.open = Some(Arc::clone(&callback));
            matches!(slots.replay, Replay::Open)
        };
        if replay {
            self.guarded("open", || callback());
        }
    }

    /// Replace the close callback. Runs it at once, with the last close
    /// frame, if the session has closed.
    pub fn set_on_close(&self, callback: CloseCallback) {
        let replay = {
            let mut slots = self.lock();
            slots.close = Some(Arc::clone(&callback));
            match &slots.replay {
                Replay::Closed(frame) => Some(frame.clone()),
                _ => None,
            }
        };
        if let Some(frame) = replay {
            self.guarded("close", || callback(frame.as_ref()));
        }
    }

    pub fn set_on_ping(&self, callback: PingCallback) {
        self.lock().ping = Some(callback);
    }

    pub fn set_on_error(&self, callback: ErrorCallback) {
        self.lock().error = Some(callback);
    }

    pub fn set_on_message(&self, callback: MessageCallback) {
        self.lock().message = Some(callback);
    }

    pub(crate) fn fire_open(&self) {
        let callback = {
            let mut slots = self.lock();
            slots.replay = Replay::Open;
            slots.open.clone()
        };
        if let Some(callback) = callback {
            self.guarded("open", || callback());
        }
    }

    pub(crate) fn fire_close(&self, frame: Option<CloseFrame>) {
        let callback = {
            let mut slots = self.lock();
            slots.replay = Replay::Closed(frame.clone());
            slots.close.clone()
        };
        if let Some(callback) = callback {
            self.guarded("close", || callback(frame.as_ref()));
        }
    }

    pub(crate) fn fire_ping(&self, payload: &[u8]) {
        let callback = self.lock().ping.clone();
        if let Some(callback) = callback {
            self.guarded("ping", || callback(payload));
        }
    }

    pub(crate) fn fire_message(&self, message: &Message) {
        let callback = self.lock().message.clone();
        if let Some(callback) = callback {
            self.guarded("message", || callback(message));
        }
    }

    pub(crate) fn fire_error(&self, error: &Error) {
        let callback = self.lock().error.clone();
        let Some(callback) = callback else {
            tracing::debug!(%error, "no error callback registered");
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| callback(error))).is_err() {
            tracing::error!(%error, "error callback panicked");
        }
    }

    fn guarded(&self, slot: &'static str, f: impl FnOnce()) {
        if catch_unwind(AssertUnwindSafe(f)).is_err() {
            tracing::warn!(slot, "callback panicked");
            self.fire_error(&Error::CallbackPanicked(slot));
        }
    }
}
