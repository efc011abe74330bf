use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::io::DuplexStream;
use tokio::sync::oneshot;
use tokio::time::Instant;
use wsession::{Connector, Error, Result, Target};

use super::FakeServer;

enum Step {
    Refuse,
    Accept(DuplexStream),
    RefuseWhen(oneshot::Receiver<()>),
}

#[derive(Default)]
struct Inner {
    steps: Mutex<VecDeque<Step>>,
    attempts: Mutex<Vec<Instant>>,
}

/// Connector that plays back a queue of outcomes, one per connect attempt.
///
/// Once the queue is empty every attempt is refused.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    inner: Arc<Inner>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a refused attempt.
    pub fn refuse(&self) {
        self.inner.steps.lock().unwrap().push_back(Step::Refuse);
    }

    /// Queue an attempt that stays in flight until the returned sender fires
    /// (or is dropped), then is refused.
    pub fn refuse_later(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        self.inner
            .steps
            .lock()
            .unwrap()
            .push_back(Step::RefuseWhen(gate));
        release
    }

    /// Queue an accepted attempt and return the server end of its stream.
    pub fn server(&self) -> FakeServer {
        let (client, server) = tokio::io::duplex(64 * 1024);
        self.inner
            .steps
            .lock()
            .unwrap()
            .push_back(Step::Accept(client));
        FakeServer::new(server)
    }

    /// When each connect attempt happened.
    pub fn attempts(&self) -> Vec<Instant> {
        self.inner.attempts.lock().unwrap().clone()
    }
}

impl Connector for ScriptedConnector {
    type Stream = DuplexStream;

    async fn connect(&self, _target: &Target) -> Result<DuplexStream> {
        self.inner.attempts.lock().unwrap().push(Instant::now());
        let step = self.inner.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Accept(stream)) => Ok(stream),
            Some(Step::RefuseWhen(gate)) => {
                let _ = gate.await;
                Err(Error::TransportRefused("scripted refusal".into()))
            }
            Some(Step::Refuse) | None => Err(Error::TransportRefused("scripted refusal".into())),
        }
    }
}
