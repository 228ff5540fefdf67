//! Entry flows: create a room, join a room, leave.
//!
//! A successful create or join ends with `SessionStore::start_session`, which
//! persists the identity. Nothing here touches the room snapshot; the room
//! view fills it once `RoomSync` starts.

#[cfg(test)]
#[path = "lobby_test.rs"]
mod lobby_test;

use std::sync::Arc;

use crate::error::ClientError;
use crate::net::api::RoomBackend;
use crate::net::types::JoinResponse;
use crate::notify::Notifier;
use crate::state::session::{SharedSession, lock};
use crate::sync::RoomSync;

const FILL_ALL_FIELDS: &str = "Please fill in all fields";

pub struct Lobby {
    backend: Arc<dyn RoomBackend>,
    session: SharedSession,
    notifier: Notifier,
}

impl Lobby {
    #[must_use]
    pub fn new(backend: Arc<dyn RoomBackend>, session: SharedSession, notifier: Notifier) -> Self {
        Self { backend, session, notifier }
    }

    /// Create a room named `room_name` and join it as its first member.
    ///
    /// # Errors
    ///
    /// `Validation` for blank inputs; otherwise the backend error.
    pub async fn create_room(
        &self,
        room_name: &str,
        display_name: &str,
        is_spectator: bool,
    ) -> Result<JoinResponse, ClientError> {
        let (room_name, display_name) = self.required(room_name, display_name)?;

        let result = async {
            let room = self.backend.create_room(room_name).await?;
            tracing::info!(room_id = %room.id, "room created");
            self.backend.join_room(&room.id, display_name, is_spectator).await
        }
        .await;

        match result {
            Ok(joined) => {
                self.enter(&joined);
                self.notifier.success("Room created successfully!");
                Ok(joined)
            }
            Err(e) => {
                tracing::warn!(error = %e, "create room failed");
                self.notifier.error("Failed to create room");
                Err(e)
            }
        }
    }

    /// Join an existing room. The id is matched case-insensitively.
    ///
    /// # Errors
    ///
    /// `Validation` for blank inputs, `NotFound` for an unknown room,
    /// otherwise the backend error.
    pub async fn join_room(
        &self,
        room_id: &str,
        display_name: &str,
        is_spectator: bool,
    ) -> Result<JoinResponse, ClientError> {
        let (room_id, display_name) = self.required(room_id, display_name)?;
        let room_id = room_id.to_uppercase();

        match self.backend.join_room(&room_id, display_name, is_spectator).await {
            Ok(joined) => {
                self.enter(&joined);
                self.notifier.success("Joined room successfully!");
                Ok(joined)
            }
            Err(e @ ClientError::NotFound { .. }) => {
                tracing::info!(%room_id, "room not found");
                self.notifier.error("Room not found");
                Err(e)
            }
            Err(e) => {
                tracing::warn!(%room_id, error = %e, "join room failed");
                self.notifier.error("Failed to join room");
                Err(e)
            }
        }
    }

    /// Stop syncing (if running) and forget the session, persisted identity
    /// included.
    pub async fn leave(&self, sync: Option<RoomSync>) {
        if let Some(sync) = sync {
            sync.shutdown().await;
        }
        lock(&self.session).leave_room();
        tracing::info!("left room");
    }

    fn required<'a>(&self, first: &'a str, second: &'a str) -> Result<(&'a str, &'a str), ClientError> {
        let (first, second) = (first.trim(), second.trim());
        if first.is_empty() || second.is_empty() {
            self.notifier.error(FILL_ALL_FIELDS);
            return Err(ClientError::Validation(FILL_ALL_FIELDS.to_owned()));
        }
        Ok((first, second))
    }

    fn enter(&self, joined: &JoinResponse) {
        tracing::info!(room_id = %joined.room.id, user_id = %joined.user.id, "session started");
        lock(&self.session).start_session(joined.user.clone(), joined.room.clone());
    }
}
