//! Dual-channel room synchronization.
//!
//! SYSTEM CONTEXT
//! ==============
//! Three producers deliver snapshots: the poll loop, the push listener, and
//! the dispatcher's post-action re-fetch. All of them go through
//! `Reconciler::apply`, which holds the store lock for the whole
//! diff-and-replace. Applications are therefore serialized, and because each
//! snapshot is a total replacement, racing channels can only leave the view
//! momentarily stale, never a hybrid. Last `apply` wins.
//!
//! LIFECYCLE
//! =========
//! `RoomSync::start` spawns the poll and push tasks for the joined room.
//! `RoomSync::shutdown` clears the liveness flag first, so a request that
//! resolves during teardown is dropped before it reaches the store, then
//! aborts both tasks.

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::net::api::RoomBackend;
use crate::net::push::PushListener;
use crate::net::types::RoomSnapshot;
use crate::notify::Notifier;
use crate::state::reconcile::ClearReason;
use crate::state::session::{SharedSession, lock};

/// Where a snapshot came from. Only used for logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotSource {
    Poll,
    Push,
    Reveal,
    AfterAction,
    Manual,
}

// =============================================================================
// RECONCILER
// =============================================================================

/// The single writer of the cached snapshot. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Reconciler {
    session: SharedSession,
    alive: Arc<AtomicBool>,
    changes: Arc<watch::Sender<u64>>,
}

impl Reconciler {
    #[must_use]
    pub fn new(session: SharedSession) -> Self {
        let (changes, _) = watch::channel(0);
        Self { session, alive: Arc::new(AtomicBool::new(true)), changes: Arc::new(changes) }
    }

    #[must_use]
    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Revision counter bumped after every visible state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Stop accepting snapshots. Irreversible.
    pub fn close(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Reconcile and store `snapshot`. Returns `false` if the room view was
    /// already torn down and the snapshot was dropped. The revision only
    /// moves when the stored state actually changed.
    pub fn apply(&self, snapshot: RoomSnapshot, source: SnapshotSource) -> bool {
        let (cleared, changed) = {
            let mut store = lock(&self.session);
            if !self.is_alive() {
                return false;
            }
            let same = store.snapshot() == &snapshot;
            let cleared = store.apply_snapshot(snapshot);
            (cleared, !same || cleared.is_some())
        };
        match cleared {
            Some(ClearReason::ActiveTaskChanged) => {
                tracing::debug!(?source, "active task changed; selection cleared");
            }
            Some(ClearReason::BallotMissing) => {
                tracing::debug!(?source, "ballot missing from hidden round; selection cleared");
            }
            None => tracing::trace!(?source, "snapshot applied"),
        }
        if changed {
            self.touch();
        }
        true
    }

    /// Record push-channel connectivity.
    pub fn set_connected(&self, connected: bool) {
        {
            let mut store = lock(&self.session);
            if !self.is_alive() {
                return;
            }
            store.set_connected(connected);
        }
        self.touch();
    }

    /// Signal a local change (e.g. an optimistic selection) to the view.
    pub fn touch(&self) {
        self.changes.send_modify(|rev| *rev = rev.wrapping_add(1));
    }
}

// =============================================================================
// FETCHER
// =============================================================================

/// HTTP snapshot source for one room.
#[derive(Clone)]
pub struct SnapshotFetcher {
    backend: Arc<dyn RoomBackend>,
    room_id: String,
    reconciler: Reconciler,
}

impl SnapshotFetcher {
    #[must_use]
    pub fn new(backend: Arc<dyn RoomBackend>, room_id: impl Into<String>, reconciler: Reconciler) -> Self {
        Self { backend, room_id: room_id.into(), reconciler }
    }

    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    #[must_use]
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Fetch once and apply. Failures are logged and leave the cached
    /// snapshot untouched. Returns whether a snapshot was applied.
    pub async fn fetch_once(&self, source: SnapshotSource) -> bool {
        match self.backend.fetch_snapshot(&self.room_id).await {
            Ok(snapshot) => self.reconciler.apply(snapshot, source),
            Err(e) => {
                tracing::warn!(room_id = %self.room_id, ?source, error = %e, "snapshot fetch failed");
                false
            }
        }
    }

    /// Fetch immediately, then every `interval` until the reconciler closes.
    pub async fn run_polling(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !self.reconciler.is_alive() {
                break;
            }
            self.fetch_once(SnapshotSource::Poll).await;
        }
        tracing::debug!(room_id = %self.room_id, "polling stopped");
    }
}

// =============================================================================
// ROOM SYNC
// =============================================================================

/// Running synchronization for the joined room.
pub struct RoomSync {
    reconciler: Reconciler,
    fetcher: SnapshotFetcher,
    poll_task: JoinHandle<()>,
    push_task: JoinHandle<()>,
}

impl RoomSync {
    /// Spawn the poll loop and push listener for the session's room.
    ///
    /// # Errors
    ///
    /// Returns `NoSession` when no room has been joined.
    pub fn start(
        config: &ClientConfig,
        backend: Arc<dyn RoomBackend>,
        session: SharedSession,
        notifier: Notifier,
    ) -> Result<Self, ClientError> {
        let (room_id, user_id) = {
            let store = lock(&session);
            let (room_id, user_id) = store.identity().ids().ok_or(ClientError::NoSession)?;
            (room_id.to_owned(), user_id.to_owned())
        };

        let reconciler = Reconciler::new(session);
        let fetcher = SnapshotFetcher::new(backend, room_id.clone(), reconciler.clone());
        let poll_task = tokio::spawn(fetcher.clone().run_polling(config.poll_interval));

        let listener = PushListener::new(
            config.ws_url.clone(),
            room_id.clone(),
            user_id,
            config.reconnect,
            reconciler.clone(),
            notifier,
        );
        let push_task = tokio::spawn(listener.run());

        tracing::info!(%room_id, "room sync started");
        Ok(Self { reconciler, fetcher, poll_task, push_task })
    }

    #[must_use]
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Handle for on-demand fetches (dispatcher re-fetch, manual refresh).
    #[must_use]
    pub fn fetcher(&self) -> SnapshotFetcher {
        self.fetcher.clone()
    }

    /// Tear down both channels. The cached snapshot is left as-is; callers
    /// decide between `reset_game` and `leave_room`.
    pub async fn shutdown(self) {
        self.reconciler.close();
        self.poll_task.abort();
        self.push_task.abort();
        for task in [self.poll_task, self.push_task] {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "sync task ended abnormally");
                }
            }
        }
        lock(self.reconciler.session()).set_connected(false);
        tracing::info!(room_id = %self.fetcher.room_id(), "room sync stopped");
    }
}
