// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The progress hub — WebSocket fan-out with a drop policy.
//
// Broadcasts are best-effort, at-most-once per subscriber. Each subscriber
// owns a bounded send buffer; when it fills, the subscriber is evicted so a
// slow client can never stall the pipeline. Order within one subscriber
// matches enqueue order; nothing is promised across subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use scanwerk_core::types::ProgressUpdate;

use crate::state::AppState;

/// Per-subscriber send buffer.
const CLIENT_BUFFER: usize = 256;

/// Hub-wide broadcast buffer; overflow drops the update.
const BROADCAST_BUFFER: usize = 256;

/// Fan-out hub for progress updates.
pub struct ProgressHub {
    clients: RwLock<HashMap<u64, mpsc::Sender<String>>>,
    next_id: AtomicU64,
    broadcast_tx: mpsc::Sender<ProgressUpdate>,
    broadcast_rx: Mutex<Option<mpsc::Receiver<ProgressUpdate>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_BUFFER);
        Self {
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            broadcast_tx,
            broadcast_rx: Mutex::new(Some(broadcast_rx)),
        }
    }

    /// Queue an update for fan-out. Fire-and-forget; a full hub buffer
    /// drops the update.
    pub fn broadcast(&self, update: ProgressUpdate) {
        if self.broadcast_tx.try_send(update).is_err() {
            warn!("progress broadcast channel full, dropping update");
        }
    }

    /// Register a subscriber; returns its id and the stream of marshalled
    /// updates for the connection's write pump.
    pub fn register(&self) -> (u64, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.write().unwrap().insert(id, tx);
        debug!(clients = self.client_count(), "websocket client connected");
        (id, rx)
    }

    pub fn unregister(&self, id: u64) {
        self.clients.write().unwrap().remove(&id);
        debug!(clients = self.client_count(), "websocket client disconnected");
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    /// The hub's run loop: marshal each update once, then attempt a
    /// non-blocking send to every subscriber. A subscriber with a full
    /// buffer is closed and evicted.
    pub async fn run(&self) {
        let mut rx = match self.broadcast_rx.lock().unwrap().take() {
            Some(rx) => rx,
            None => return,
        };

        while let Some(update) = rx.recv().await {
            let payload = match serde_json::to_string(&update) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "failed to marshal progress update");
                    continue;
                }
            };

            let mut clients = self.clients.write().unwrap();
            clients.retain(|id, tx| match tx.try_send(payload.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(client = *id, "subscriber buffer full, evicting");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
        }
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

/// GET /api/v1/ws — upgrade and attach the connection to the hub.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one connection: a write pump draining the subscriber buffer into
/// text frames, and a read pump observing client-initiated close. Either
/// side failing tears the subscriber down cleanly.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (id, mut rx) = state.hub.register();
    let (mut sink, mut stream) = socket.split();

    let write_pump = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sink.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    state.hub.unregister(id);
    write_pump.abort();
}
