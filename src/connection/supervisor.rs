//! Reconnect supervisor: re-establishes a session after it drops.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff as _;
use tokio::task::JoinHandle;

use crate::connection::connection::Shared;
use crate::error::{Error, ErrorKind};
use crate::message::{CloseCode, CloseFrame};
use crate::transport::Connector;

pub(crate) fn spawn_supervisor<C: Connector>(shared: Arc<Shared<C>>) -> JoinHandle<()> {
    tokio::spawn(supervise(shared))
}

/// Retry until a session opens, the policy gives up, or a client close
/// cancels reconnecting.
///
/// Refused connections are only logged. Every other failure is reported
/// through `on_error`, and a failed handshake also fires `close`, since the
/// attempt got as far as the upgrade. Each failed attempt waits for the next
/// backoff delay.
async fn supervise<C: Connector>(shared: Arc<Shared<C>>) {
    let policy = &shared.config.retry;
    let mut backoff: ExponentialBackoff = policy.into();
    let mut attempts: u32 = 0;

    loop {
        if shared.stop_requested() {
            tracing::debug!(attempts, "reconnect cancelled");
            break;
        }

        attempts = attempts.saturating_add(1);
        match shared.establish().await {
            Ok(()) => {
                tracing::debug!(attempts, "reconnected");
                if shared.stop_requested() {
                    // a close arrived while the handshake was in flight
                    if let Err(e) = shared.close(CloseFrame::new(CloseCode::Normal, "")).await {
                        tracing::debug!(error = %e, "close after reconnect failed");
                    }
                }
                return;
            }
            Err(Error::TransportRefused(reason)) => {
                tracing::warn!(attempts, %reason, "reconnect refused");
            }
            Err(e) => {
                tracing::warn!(attempts, error = %e, "reconnect failed");
                shared.events.fire_error(&e);
                if e.kind() == ErrorKind::HandshakeInvalid {
                    shared.events.fire_close(None);
                }
            }
        }

        if policy.exhausted(attempts) {
            tracing::warn!(attempts, "reconnect attempts exhausted");
            shared.events.fire_error(&Error::ReconnectExhausted { attempts });
            break;
        }

        // register for the wake-up before checking, so a close that lands in
        // between still interrupts the sleep
        let woken = shared.wake.notified();
        tokio::pin!(woken);
        woken.as_mut().enable();
        if shared.stop_requested() {
            tracing::debug!(attempts, "reconnect cancelled");
            break;
        }

        let delay = backoff.next_backoff().unwrap_or(policy.max_delay);
        tracing::debug!(?delay, "waiting before next reconnect attempt");
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = &mut woken => {}
        }
    }
    shared.reconnecting.store(false, Ordering::Release);
}
