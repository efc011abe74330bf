use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use wsession::{CloseFrame, Connection, Connector, Error, Message};

use super::WAIT;

/// One callback invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Open,
    Close(Option<CloseFrame>),
    Ping(Vec<u8>),
    Error(Error),
    Message(Message),
}

#[derive(Default)]
struct Inner {
    events: Mutex<Vec<Event>>,
    changed: Notify,
}

/// Records every callback a session fires, in order.
#[derive(Clone, Default)]
pub struct Recorder {
    inner: Arc<Inner>,
}

impl Recorder {
    /// Register on all five callback slots of `conn`.
    pub fn attach<C: Connector>(conn: &Connection<C>) -> Self {
        let recorder = Self::default();

        let r = recorder.clone();
        conn.on_open(move || r.push(Event::Open));
        let r = recorder.clone();
        conn.on_close(move |frame| r.push(Event::Close(frame.cloned())));
        let r = recorder.clone();
        conn.on_ping(move |payload| r.push(Event::Ping(payload.to_vec())));
        let r = recorder.clone();
        conn.on_error(move |error| r.push(Event::Error(error.clone())));
        let r = recorder.clone();
        conn.on_message(move |message| r.push(Event::Message(message.clone())));

        recorder
    }

    pub fn push(&self, event: Event) {
        self.inner.events.lock().unwrap().push(event);
        self.inner.changed.notify_waiters();
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.inner.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    pub fn opens(&self) -> usize {
        self.count(|e| matches!(e, Event::Open))
    }

    pub fn closes(&self) -> Vec<Option<CloseFrame>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Close(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<Error> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Error(error) => Some(error),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Message(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn pings(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Ping(payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    /// Wait until `pred` holds for the recorded events.
    pub async fn wait_for(&self, pred: impl Fn(&Recorder) -> bool) {
        let waiting = async {
            loop {
                let changed = self.inner.changed.notified();
                if pred(self) {
                    return;
                }
                changed.await;
            }
        };
        if tokio::time::timeout(WAIT, waiting).await.is_err() {
            panic!("timed out waiting for events, have {:?}", self.events());
        }
    }
}
