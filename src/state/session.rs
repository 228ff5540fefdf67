//! Local session store.
//!
//! SYSTEM CONTEXT
//! ==============
//! Two slices with different lifecycles:
//! - `Identity` (who am I, which room): persisted, rehydrated at startup,
//!   removed only by `leave_room`.
//! - `RoomSlice` (snapshot, selection, connection flag): never persisted,
//!   always starts empty and is refilled by the first fetch or push.
//!
//! The snapshot has a single writer, `apply_snapshot`, which runs the pure
//! reconciler. Everything else here is plain get/set plus derived queries.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use super::persist::BlobStore;
use super::reconcile::{ClearReason, reconcile};
use crate::net::types::{Card, Participant, RoomInfo, RoomSnapshot};

/// Blob key for the persisted identity.
pub const STORAGE_KEY: &str = "planpoker-storage";

/// Store shared between the sync tasks and the dispatcher. Never hold the
/// guard across an `.await`.
pub type SharedSession = Arc<Mutex<SessionStore>>;

/// Lock the shared store, recovering the data from a poisoned lock.
pub fn lock(session: &SharedSession) -> MutexGuard<'_, SessionStore> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Persisted slice.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub user: Option<Participant>,
    pub room: Option<RoomInfo>,
}

impl Identity {
    /// `(room_id, user_id)` when a room has been joined.
    #[must_use]
    pub fn ids(&self) -> Option<(&str, &str)> {
        match (&self.room, &self.user) {
            (Some(room), Some(user)) => Some((room.id.as_str(), user.id.as_str())),
            _ => None,
        }
    }
}

/// Ephemeral slice.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoomSlice {
    pub snapshot: RoomSnapshot,
    pub selected_card: Option<Card>,
    pub is_connected: bool,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    identity: Identity,
    room: RoomSlice,
    storage: Option<BlobStore>,
}

impl SessionStore {
    /// Build a store, rehydrating the identity from `storage` if present.
    #[must_use]
    pub fn new(storage: Option<BlobStore>) -> Self {
        let identity = storage
            .as_ref()
            .and_then(|s| s.load_json::<Identity>(STORAGE_KEY))
            .unwrap_or_default();
        Self { identity, room: RoomSlice::default(), storage }
    }

    /// Store without persistence.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    // -------------------------------------------------------------------------
    // identity
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub fn user(&self) -> Option<&Participant> {
        self.identity.user.as_ref()
    }

    pub fn set_user(&mut self, user: Option<Participant>) {
        self.identity.user = user;
        self.persist_identity();
    }

    #[must_use]
    pub fn room(&self) -> Option<&RoomInfo> {
        self.identity.room.as_ref()
    }

    pub fn set_room(&mut self, room: Option<RoomInfo>) {
        self.identity.room = room;
        self.persist_identity();
    }

    /// Replace the identity after a create/join. Ephemeral state from any
    /// previous room is dropped.
    pub fn start_session(&mut self, user: Participant, room: RoomInfo) {
        self.identity = Identity { user: Some(user), room: Some(room) };
        self.room = RoomSlice::default();
        self.persist_identity();
    }

    fn persist_identity(&self) {
        let Some(storage) = &self.storage else {
            return;
        };
        let result = if self.identity == Identity::default() {
            storage.remove(STORAGE_KEY)
        } else {
            storage.save_json(STORAGE_KEY, &self.identity)
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist session identity");
        }
    }

    // -------------------------------------------------------------------------
    // room slice
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn snapshot(&self) -> &RoomSnapshot {
        &self.room.snapshot
    }

    #[must_use]
    pub fn selected_card(&self) -> Option<Card> {
        self.room.selected_card
    }

    pub fn set_selected_card(&mut self, card: Option<Card>) {
        self.room.selected_card = card;
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.room.is_connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.room.is_connected = connected;
    }

    /// Reconcile `incoming` against the stored snapshot and replace it.
    pub fn apply_snapshot(&mut self, incoming: RoomSnapshot) -> Option<ClearReason> {
        let previous = std::mem::take(&mut self.room.snapshot);
        let user_id = self.identity.user.as_ref().map(|u| u.id.as_str());
        let next = reconcile(&previous, self.room.selected_card, incoming, user_id);
        self.room.snapshot = next.snapshot;
        self.room.selected_card = next.selected_card;
        next.cleared
    }

    // -------------------------------------------------------------------------
    // derived
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user().is_some_and(|u| u.is_admin)
    }

    #[must_use]
    pub fn is_spectator(&self) -> bool {
        self.user().is_some_and(|u| u.is_spectator)
    }

    #[must_use]
    pub fn has_voted(&self) -> bool {
        self.user().is_some_and(|u| self.room.snapshot.has_vote_from(&u.id))
    }

    /// My ballot value as the server reports it; `None` while masked.
    #[must_use]
    pub fn my_vote(&self) -> Option<&str> {
        let user = self.user()?;
        self.room.snapshot.vote_for(&user.id)?.value.as_deref()
    }

    // -------------------------------------------------------------------------
    // lifecycle
    // -------------------------------------------------------------------------

    /// Disconnect without logging out.
    pub fn reset_game(&mut self) {
        self.room = RoomSlice::default();
    }

    /// Full logout, including the persisted identity.
    pub fn leave_room(&mut self) {
        self.room = RoomSlice::default();
        self.identity = Identity::default();
        self.persist_identity();
    }
}
