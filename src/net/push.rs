//! Push channel listener.
//!
//! The listener owns one websocket connection to the room backend at a
//! time. Wire messages are JSON text frames `{"event": ..., "data": ...}`.
//! Server-initiated `state_update` and `reveal_votes` events carry a full
//! snapshot; the only client-emitted event is `join_room`, sent right after
//! every (re)connect so the server can address this session.
//!
//! ERROR HANDLING
//! ==============
//! Nothing here fails the caller. Transport errors are logged and followed
//! by a reconnect with exponential backoff; malformed or unknown events are
//! logged and skipped.
//!
//! A connection only resets the backoff once it has proven itself: it
//! delivered a frame, or stayed open for [`STABLE_AFTER`]. A backend that
//! accepts the upgrade and hangs up straight away counts as a failed attempt.

#[cfg(test)]
#[path = "push_test.rs"]
mod push_test;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::types::RoomSnapshot;
use crate::config::ReconnectPolicy;
use crate::error::ClientError;
use crate::notify::Notifier;
use crate::sync::{Reconciler, SnapshotSource};

pub const EVENT_STATE_UPDATE: &str = "state_update";
pub const EVENT_REVEAL_VOTES: &str = "reveal_votes";
pub const EVENT_JOIN_ROOM: &str = "join_room";

/// A silent connection that stays open this long still counts as healthy.
pub const STABLE_AFTER: Duration = Duration::from_secs(30);

/// One text frame on the push channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PushEvent {
    StateUpdate(RoomSnapshot),
    RevealVotes(RoomSnapshot),
    /// Any event this client does not consume.
    Other(String),
}

/// Decode one text frame.
///
/// # Errors
///
/// Returns a JSON error for a malformed envelope or snapshot payload.
pub fn parse_event(text: &str) -> Result<PushEvent, ClientError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    match envelope.event.as_str() {
        EVENT_STATE_UPDATE => Ok(PushEvent::StateUpdate(serde_json::from_value(envelope.data)?)),
        EVENT_REVEAL_VOTES => Ok(PushEvent::RevealVotes(serde_json::from_value(envelope.data)?)),
        _ => Ok(PushEvent::Other(envelope.event)),
    }
}

/// Build the `join_room` announcement.
///
/// # Errors
///
/// Returns a JSON error if serialization fails.
pub fn join_room_message(room_id: &str, user_id: &str) -> Result<String, ClientError> {
    let envelope = Envelope {
        event: EVENT_JOIN_ROOM.to_owned(),
        data: serde_json::json!({ "room_id": room_id, "user_id": user_id }),
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Long-lived push subscription for one room.
pub struct PushListener {
    ws_url: String,
    room_id: String,
    user_id: String,
    policy: ReconnectPolicy,
    reconciler: Reconciler,
    notifier: Notifier,
}

impl PushListener {
    #[must_use]
    pub fn new(
        ws_url: String,
        room_id: String,
        user_id: String,
        policy: ReconnectPolicy,
        reconciler: Reconciler,
        notifier: Notifier,
    ) -> Self {
        Self { ws_url, room_id, user_id, policy, reconciler, notifier }
    }

    /// Connect, listen, and reconnect until the reconciler closes or the
    /// reconnect policy gives up.
    pub async fn run(self) {
        let mut failures: u32 = 0;

        while self.reconciler.is_alive() {
            match connect_async(self.ws_url.as_str()).await {
                Ok((stream, _)) => {
                    tracing::info!(room_id = %self.room_id, "push channel connected");
                    self.reconciler.set_connected(true);
                    let connected_at = Instant::now();
                    let mut frames: u64 = 0;

                    match self.listen(stream, &mut frames).await {
                        Ok(()) => tracing::info!(room_id = %self.room_id, frames, "push channel closed"),
                        Err(e) => tracing::warn!(room_id = %self.room_id, frames, error = %e, "push channel error"),
                    }

                    self.reconciler.set_connected(false);
                    if !self.reconciler.is_alive() {
                        break;
                    }
                    if frames > 0 || connected_at.elapsed() >= STABLE_AFTER {
                        failures = 0;
                    } else {
                        failures += 1;
                        tracing::warn!(room_id = %self.room_id, attempt = failures, "push channel dropped before any frame");
                        if self.gave_up(failures) {
                            break;
                        }
                    }
                    tokio::time::sleep(self.policy.delay_for(failures.saturating_sub(1))).await;
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(room_id = %self.room_id, attempt = failures, error = %e, "push connect_error");
                    self.notifier.error("Connection error. Retrying...");
                    if self.gave_up(failures) {
                        break;
                    }
                    tokio::time::sleep(self.policy.delay_for(failures - 1)).await;
                }
            }
        }
    }

    fn gave_up(&self, failures: u32) -> bool {
        let exhausted = self.policy.exhausted(failures);
        if exhausted {
            tracing::warn!(room_id = %self.room_id, "push reconnect attempts exhausted; polling only");
        }
        exhausted
    }

    /// Announce ourselves, then dispatch frames until the socket closes.
    /// `frames` counts the text frames received.
    async fn listen(
        &self,
        stream: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        frames: &mut u64,
    ) -> Result<(), ClientError> {
        let (mut write, mut read) = stream.split();
        let join = join_room_message(&self.room_id, &self.user_id)?;
        write.send(Message::Text(join.into())).await?;

        while let Some(msg) = read.next().await {
            match msg? {
                Message::Text(text) => {
                    *frames += 1;
                    self.dispatch_text(text.as_str());
                }
                Message::Close(_) => return Ok(()),
                _ => {}
            }
            if !self.reconciler.is_alive() {
                break;
            }
        }
        Ok(())
    }

    fn dispatch_text(&self, text: &str) {
        match parse_event(text) {
            Ok(PushEvent::StateUpdate(snapshot)) => {
                self.reconciler.apply(snapshot, SnapshotSource::Push);
            }
            Ok(PushEvent::RevealVotes(snapshot)) => {
                if self.reconciler.apply(snapshot, SnapshotSource::Reveal) {
                    self.notifier.success("Cards revealed!");
                }
            }
            Ok(PushEvent::Other(event)) => {
                tracing::debug!(%event, "ignoring push event");
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed push frame");
            }
        }
    }
}
