//! Correlation bridge: turns a fire-and-forget publish on the bus into an
//! awaitable call.
//!
//! Each forwarded call gets a fresh token and a `oneshot` slot in the pending
//! map. Whoever removes the slot first (a matching reply, `cancel`, the
//! timeout, or the caller dropping its future) decides the outcome; everyone
//! else finds nothing and does nothing.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use {
    dashmap::DashMap,
    tokio::sync::{broadcast, mpsc, oneshot},
    tracing::{debug, info, warn},
};

use tether_protocol::{BusMessage, BusReply, ForwardPayload, Response};

use crate::error::{Error, Result};

// ── Transport ────────────────────────────────────────────────────────────────

/// Request channel towards the owning component.
pub trait Transport: Send + Sync {
    /// Publish one message. Returns how many subscribers will see it, or
    /// [`Error::OwnerUnavailable`] when nobody is listening.
    fn publish(&self, message: BusMessage) -> Result<usize>;
}

/// In-process request channel. Owners (in-process or attached over the owner
/// link) subscribe; every subscriber sees every message.
#[derive(Debug, Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<BusMessage>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Transport for LocalBus {
    fn publish(&self, message: BusMessage) -> Result<usize> {
        self.tx.send(message).map_err(|_| Error::OwnerUnavailable)
    }
}

// ── Bridge ───────────────────────────────────────────────────────────────────

enum Outcome {
    Reply(Response),
    Cancelled,
}

struct PendingCall {
    method: String,
    created_at: Instant,
    tx: oneshot::Sender<Outcome>,
}

pub struct Bridge {
    transport: Arc<dyn Transport>,
    pending: DashMap<String, PendingCall>,
    timeout: Duration,
}

/// Removes the pending entry when the awaiting future goes away, whatever the
/// reason. A no-op once the entry has been claimed.
struct PendingGuard<'a> {
    pending: &'a DashMap<String, PendingCall>,
    token: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some((token, call)) = self.pending.remove(self.token) {
            debug!(token = %token, method = %call.method, "forwarded call abandoned");
        }
    }
}

impl Bridge {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            transport,
            pending: DashMap::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Forward `payload` to the owner and wait for its reply.
    ///
    /// Fails with [`Error::OwnerUnavailable`] right away when nobody is
    /// subscribed, [`Error::ForwardTimeout`] when no reply arrives in time and
    /// [`Error::ForwardCancelled`] when [`Bridge::cancel`] claimed the call.
    pub async fn send(&self, payload: ForwardPayload) -> Result<Response> {
        let token = uuid::Uuid::new_v4().to_string();
        let method = payload.method.clone();
        let (tx, rx) = oneshot::channel();

        self.pending.insert(token.clone(), PendingCall {
            method: method.clone(),
            created_at: Instant::now(),
            tx,
        });
        let _guard = PendingGuard {
            pending: &self.pending,
            token: &token,
        };

        let subscribers = match self.transport.publish(BusMessage::Request {
            token: token.clone(),
            payload,
        }) {
            Ok(n) => n,
            Err(e) => {
                warn!(method, token = %token, error = %e, "forward failed");
                return Err(e);
            },
        };
        debug!(method, token = %token, subscribers, "forwarded call published");

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Outcome::Reply(response))) => Ok(response),
            Ok(Ok(Outcome::Cancelled)) | Ok(Err(_)) => Err(Error::ForwardCancelled),
            Err(_) => {
                warn!(
                    method,
                    token = %token,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "forwarded call timed out"
                );
                Err(Error::ForwardTimeout(self.timeout))
            },
        }
    }

    /// Resolve the call waiting on `reply.token`. Returns `false` for unknown,
    /// late or duplicate tokens, which are dropped.
    pub fn on_reply(&self, reply: BusReply) -> bool {
        let Some((token, call)) = self.pending.remove(&reply.token) else {
            debug!(token = %reply.token, "reply for unknown token dropped");
            return false;
        };
        debug!(
            token = %token,
            method = %call.method,
            elapsed_ms = call.created_at.elapsed().as_millis() as u64,
            ok = reply.response.is_ok(),
            "reply matched"
        );
        // The caller may have gone away between the remove and here.
        let _ = call.tx.send(Outcome::Reply(reply.response));
        true
    }

    /// Cancel the call waiting on `token`. Returns `false` if it was already
    /// resolved or never existed.
    pub fn cancel(&self, token: &str) -> bool {
        let Some((token, call)) = self.pending.remove(token) else {
            return false;
        };
        info!(token = %token, method = %call.method, "forwarded call cancelled");
        let _ = call.tx.send(Outcome::Cancelled);
        true
    }

    /// Publish a fire-and-forget signal. Nobody listening is not an error.
    pub fn signal(&self, name: &str) {
        match self.transport.publish(BusMessage::Signal {
            signal: name.to_string(),
        }) {
            Ok(subscribers) => debug!(signal = name, subscribers, "signal published"),
            Err(_) => debug!(signal = name, "signal dropped, no owner attached"),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Response channel for in-process owners: replies sent on the returned
    /// sender are fed to [`Bridge::on_reply`] until every sender is dropped.
    pub fn reply_channel(self: &Arc<Self>) -> mpsc::UnboundedSender<BusReply> {
        let (tx, mut rx) = mpsc::unbounded_channel::<BusReply>();
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(reply) = rx.recv().await {
                bridge.on_reply(reply);
            }
            debug!("reply channel closed");
        });
        tx
    }
}
