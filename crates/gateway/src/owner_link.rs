//! WebSocket link for an owning component running out of process.
//!
//! The owner receives every bus message as a JSON text frame and answers with
//! `reply` frames. It also reports its input/recording readiness, which the
//! link holds on its behalf and clears when the last owner disconnects.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, stream::StreamExt},
    tokio::sync::broadcast::error::RecvError,
    tracing::{debug, info, warn},
};

use {
    tether_common::{Capability, ReadinessHandle, ReadinessOwner},
    tether_protocol::{MAX_BODY_BYTES, OwnerFrame},
};

use crate::state::GatewayState;

pub struct OwnerLink {
    input: ReadinessOwner,
    recording: ReadinessOwner,
    attached: AtomicUsize,
}

impl Default for OwnerLink {
    fn default() -> Self {
        Self::new()
    }
}

impl OwnerLink {
    pub fn new() -> Self {
        Self {
            input: ReadinessOwner::new(Capability::Input),
            recording: ReadinessOwner::new(Capability::Recording),
            attached: AtomicUsize::new(0),
        }
    }

    pub fn input(&self) -> ReadinessHandle {
        self.input.handle()
    }

    pub fn recording(&self) -> ReadinessHandle {
        self.recording.handle()
    }

    pub fn attached(&self) -> usize {
        self.attached.load(Ordering::SeqCst)
    }

    /// Apply a readiness report. Absent fields leave the flag unchanged.
    pub fn apply_readiness(&self, input: Option<bool>, recording: Option<bool>) {
        if let Some(ready) = input {
            self.input.set(ready);
        }
        if let Some(ready) = recording {
            self.recording.set(ready);
        }
    }

    fn attach(&self) -> usize {
        self.attached.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn detach(&self) {
        if self.attached.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.input.set(false);
            self.recording.set(false);
        }
    }
}

/// Serve one owner connection until either side closes it.
pub async fn handle_owner_socket(socket: WebSocket, state: Arc<GatewayState>, remote: SocketAddr) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    // Subscribe before announcing, so nothing published after attach is missed.
    let mut bus_rx = state.bus.subscribe();
    let owners = state.owner_link.attach();
    info!(conn_id = %conn_id, remote = %remote, owners, "owner: attached");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Write loop: bus → socket.
    let write_conn_id = conn_id.clone();
    let write_handle = tokio::spawn(async move {
        loop {
            let message = match bus_rx.recv().await {
                Ok(m) => m,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(conn_id = %write_conn_id, skipped, "owner: bus lagged, messages dropped");
                    continue;
                },
                Err(RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&message) {
                Ok(t) => t,
                Err(e) => {
                    warn!(conn_id = %write_conn_id, error = %e, "owner: failed to encode bus message");
                    continue;
                },
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                debug!(conn_id = %write_conn_id, "owner: write loop closed");
                break;
            }
        }
    });

    // Read loop: socket → bridge / readiness.
    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "owner: read error");
                break;
            },
        };
        if text.len() > MAX_BODY_BYTES {
            warn!(conn_id = %conn_id, size = text.len(), "owner: frame too large, dropped");
            continue;
        }

        let frame: OwnerFrame = match serde_json::from_str(text.as_str()) {
            Ok(f) => f,
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "owner: invalid frame");
                continue;
            },
        };
        match frame {
            OwnerFrame::Readiness { input, recording } => {
                debug!(conn_id = %conn_id, ?input, ?recording, "owner: readiness report");
                state.owner_link.apply_readiness(input, recording);
            },
            reply @ OwnerFrame::Reply { .. } => match reply.into_reply() {
                Some(Ok(reply)) => {
                    state.bridge.on_reply(reply);
                },
                Some(Err(e)) => warn!(conn_id = %conn_id, error = %e, "owner: rejected reply"),
                None => {},
            },
        }
    }

    write_handle.abort();
    state.owner_link.detach();
    info!(conn_id = %conn_id, remaining = state.owner_link.attached(), "owner: detached");
}
