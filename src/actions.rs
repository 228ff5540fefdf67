//! Action dispatcher.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every user gesture becomes exactly one `RoomAction`. The dispatcher never
//! writes the snapshot: it only touches `selected_card` optimistically, sends
//! the request, and then asks the fetcher for a fresh snapshot whether the
//! request succeeded or not. The next snapshot is what settles the view.
//!
//! ERROR HANDLING
//! ==============
//! Gates (`NoSession`, `NotAdmin`, `VotingClosed`, `Validation`) are checked
//! before anything is sent and raise an error notice. A rejected or failed
//! request raises "Action failed"; optimistic state is not rolled back.
//! Every operation still returns the error so callers can branch on it.

#[cfg(test)]
#[path = "actions_test.rs"]
mod actions_test;

use std::sync::Arc;

use crate::error::ClientError;
use crate::net::api::{RoomAction, RoomBackend};
use crate::net::types::Card;
use crate::notify::Notifier;
use crate::state::session::{SessionStore, lock};
use crate::sync::{Reconciler, SnapshotFetcher, SnapshotSource};

pub const NO_ACTIVE_TASK: &str = "no active task";
const SPECTATOR: &str = "spectators cannot vote";
const ALREADY_REVEALED: &str = "cards are already revealed";

/// Room and user the request is issued for.
struct Seat {
    room_id: String,
    user_id: String,
}

impl Seat {
    fn of(store: &SessionStore) -> Result<Self, ClientError> {
        let (room_id, user_id) = store.identity().ids().ok_or(ClientError::NoSession)?;
        Ok(Self { room_id: room_id.to_owned(), user_id: user_id.to_owned() })
    }

    fn admin(store: &SessionStore, gesture: &'static str) -> Result<Self, ClientError> {
        let seat = Self::of(store)?;
        if !store.is_admin() {
            return Err(ClientError::NotAdmin(gesture));
        }
        Ok(seat)
    }
}

pub struct Dispatcher {
    backend: Arc<dyn RoomBackend>,
    fetcher: SnapshotFetcher,
    notifier: Notifier,
}

impl Dispatcher {
    #[must_use]
    pub fn new(backend: Arc<dyn RoomBackend>, fetcher: SnapshotFetcher, notifier: Notifier) -> Self {
        Self { backend, fetcher, notifier }
    }

    fn reconciler(&self) -> &Reconciler {
        self.fetcher.reconciler()
    }

    /// Run a gate against the store; refusals become error notices.
    fn gate<T>(&self, check: impl FnOnce(&mut SessionStore) -> Result<T, ClientError>) -> Result<T, ClientError> {
        let result = {
            let mut store = lock(self.reconciler().session());
            check(&mut *store)
        };
        if let Err(e) = &result {
            let message = match e {
                ClientError::VotingClosed(reason) if *reason == NO_ACTIVE_TASK => "No active task to vote on".to_owned(),
                ClientError::Validation(message) => message.clone(),
                other => other.to_string(),
            };
            tracing::debug!(error = %e, "gesture refused locally");
            self.notifier.error(message);
        }
        result
    }

    /// Send `action`, then re-fetch regardless of the outcome.
    async fn dispatch(&self, action: RoomAction) -> Result<(), ClientError> {
        tracing::debug!(action = action.name(), room_id = %action.room_id(), "dispatching action");
        let result = self.backend.send_action(&action).await;
        if let Err(e) = &result {
            tracing::warn!(action = action.name(), error = %e, "action failed");
            self.notifier.error("Action failed");
        }
        self.fetcher.fetch_once(SnapshotSource::AfterAction).await;
        result
    }

    // =========================================================================
    // VOTING
    // =========================================================================

    /// Select `card` and submit it for the active task.
    ///
    /// # Errors
    ///
    /// `NoSession`, `VotingClosed` when spectating, without an active task,
    /// or after reveal; otherwise the request error.
    pub async fn cast_vote(&self, card: Card) -> Result<(), ClientError> {
        let (seat, task_id) = self.gate(|store| {
            let seat = Seat::of(store)?;
            if store.is_spectator() {
                return Err(ClientError::VotingClosed(SPECTATOR));
            }
            let task_id = store
                .snapshot()
                .active_task_id()
                .map(str::to_owned)
                .ok_or(ClientError::VotingClosed(NO_ACTIVE_TASK))?;
            if store.snapshot().cards_revealed() {
                return Err(ClientError::VotingClosed(ALREADY_REVEALED));
            }
            store.set_selected_card(Some(card));
            Ok((seat, task_id))
        })?;
        self.reconciler().touch();

        self.dispatch(RoomAction::CastVote { room_id: seat.room_id, user_id: seat.user_id, task_id, value: card })
            .await
    }

    /// # Errors
    ///
    /// `NoSession`, `NotAdmin`, or the request error.
    pub async fn reveal_cards(&self) -> Result<(), ClientError> {
        let seat = self.gate(|store| Seat::admin(store, "reveal cards"))?;
        self.dispatch(RoomAction::RevealCards { room_id: seat.room_id, user_id: seat.user_id }).await
    }

    /// Clear all ballots for the active task (or the room when none).
    ///
    /// # Errors
    ///
    /// `NoSession`, `NotAdmin`, or the request error.
    pub async fn reset_votes(&self) -> Result<(), ClientError> {
        let (seat, task_id) = self.gate(|store| {
            let seat = Seat::admin(store, "reset votes")?;
            let task_id = store.snapshot().active_task_id().map(str::to_owned);
            store.set_selected_card(None);
            Ok((seat, task_id))
        })?;
        self.reconciler().touch();

        self.dispatch(RoomAction::ResetVotes { room_id: seat.room_id, user_id: seat.user_id, task_id })
            .await?;
        self.notifier.info("Votes cleared - ready for revote");
        Ok(())
    }

    // =========================================================================
    // TASKS
    // =========================================================================

    /// # Errors
    ///
    /// `NoSession`, `NotAdmin`, or the request error.
    pub async fn set_active_task(&self, task_id: &str) -> Result<(), ClientError> {
        let seat = self.gate(|store| {
            let seat = Seat::admin(store, "change the active task")?;
            store.set_selected_card(None);
            Ok(seat)
        })?;
        self.reconciler().touch();

        self.dispatch(RoomAction::SetActiveTask {
            room_id: seat.room_id,
            user_id: seat.user_id,
            task_id: task_id.to_owned(),
        })
        .await
    }

    /// Close `task_id` with `score` as its final estimate.
    ///
    /// # Errors
    ///
    /// `NoSession`, `NotAdmin`, or the request error.
    pub async fn complete_task(&self, task_id: &str, score: Card) -> Result<(), ClientError> {
        let seat = self.gate(|store| {
            let seat = Seat::admin(store, "complete tasks")?;
            store.set_selected_card(None);
            Ok(seat)
        })?;
        self.reconciler().touch();

        self.dispatch(RoomAction::CompleteTask {
            room_id: seat.room_id,
            user_id: seat.user_id,
            task_id: task_id.to_owned(),
            final_score: score,
        })
        .await?;
        self.notifier.success(format!("Task completed with {score} points"));
        Ok(())
    }

    /// # Errors
    ///
    /// `NoSession`, `NotAdmin`, or the request error.
    pub async fn cancel_task(&self, task_id: &str) -> Result<(), ClientError> {
        let seat = self.gate(|store| Seat::admin(store, "cancel tasks"))?;
        self.dispatch(RoomAction::CancelTask {
            room_id: seat.room_id,
            user_id: seat.user_id,
            task_id: task_id.to_owned(),
        })
        .await
    }

    /// Append a task to the backlog.
    ///
    /// # Errors
    ///
    /// `NoSession`, `NotAdmin`, `Validation` for a blank title, or the
    /// request error.
    pub async fn add_task(&self, title: &str, description: &str) -> Result<(), ClientError> {
        let title = title.trim();
        let seat = self.gate(|store| {
            let seat = Seat::admin(store, "add tasks")?;
            if title.is_empty() {
                return Err(ClientError::Validation("Task title is required".to_owned()));
            }
            Ok(seat)
        })?;

        self.dispatch(RoomAction::AddTask {
            room_id: seat.room_id,
            title: title.to_owned(),
            description: description.trim().to_owned(),
        })
        .await?;
        self.notifier.success("Task added");
        Ok(())
    }

    /// # Errors
    ///
    /// `NoSession`, `NotAdmin`, or the request error.
    pub async fn delete_task(&self, task_id: &str) -> Result<(), ClientError> {
        let seat = self.gate(|store| Seat::admin(store, "delete tasks"))?;
        self.dispatch(RoomAction::DeleteTask {
            room_id: seat.room_id,
            user_id: seat.user_id,
            task_id: task_id.to_owned(),
        })
        .await
    }

    /// Pull a snapshot now. Returns whether one was applied.
    pub async fn refresh(&self) -> bool {
        self.fetcher.fetch_once(SnapshotSource::Manual).await
    }
}
