// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WebSocket subscriber session.
//!
//! A session is bound to one topic for its whole life. It forwards every
//! payload published to that topic as a text frame and ignores whatever the
//! viewer sends, apart from close frames.

use crate::broadcast::Membership;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A connected viewer.
pub struct SubscriberSession {
    membership: Membership,
    /// Session ID for logging
    session_id: String,
}

impl SubscriberSession {
    pub fn new(membership: Membership) -> Self {
        let session_id = Uuid::new_v4().to_string()[..8].to_string();
        info!(
            "[{}] Subscribed to '{}' (subscriber {})",
            session_id,
            membership.key(),
            membership.id()
        );

        Self {
            membership,
            session_id,
        }
    }

    /// Pump payloads to the socket until either side goes away.
    ///
    /// The membership is released when this returns, whatever the reason.
    pub async fn run(mut self, socket: WebSocket) {
        let (mut ws_tx, mut ws_rx) = socket.split();

        loop {
            tokio::select! {
                payload = self.membership.recv() => match payload {
                    Some(payload) => {
                        if ws_tx.send(Message::Text(payload.to_string())).await.is_err() {
                            debug!("[{}] WebSocket send failed, closing", self.session_id);
                            break;
                        }
                    }
                    None => {
                        warn!("[{}] Dropped by broadcaster (queue overflow)", self.session_id);
                        break;
                    }
                },
                incoming = ws_rx.next() => match incoming {
                    Some(Ok(Message::Close(_))) | None => {
                        info!("[{}] Client closed connection", self.session_id);
                        break;
                    }
                    Some(Ok(Message::Text(_))) | Some(Ok(Message::Binary(_))) => {
                        debug!("[{}] Ignoring client message", self.session_id);
                    }
                    Some(Ok(_)) => {
                        // Ping/pong handled by axum
                    }
                    Some(Err(e)) => {
                        warn!("[{}] WebSocket error: {}", self.session_id, e);
                        break;
                    }
                },
            }
        }

        let _ = ws_tx.close().await;
        info!("[{}] Session ended", self.session_id);
    }
}
