//! Snapshot reconciliation.
//!
//! DESIGN
//! ======
//! Pure function of (previous snapshot, current selection, incoming snapshot,
//! local user). Both update channels go through it, so it is the only code
//! that decides when the local card selection stops being meaningful.
//!
//! Clearing is always decided against the *previous* snapshot; the incoming
//! snapshot then replaces it wholesale. Snapshots are never patched.

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod reconcile_test;

use crate::net::types::{Card, RoomSnapshot};

/// Why a pending selection was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClearReason {
    /// The voting subject changed (new, different, or no active task).
    ActiveTaskChanged,
    /// Cards are hidden and the server holds no ballot for us: a reset.
    BallotMissing,
}

/// Next local room state.
#[derive(Clone, Debug, PartialEq)]
pub struct Reconciled {
    pub snapshot: RoomSnapshot,
    pub selected_card: Option<Card>,
    /// Set when this application cleared a selection.
    pub cleared: Option<ClearReason>,
}

/// Derive the next local state from the previous one and an incoming snapshot.
#[must_use]
pub fn reconcile(
    previous: &RoomSnapshot,
    selected_card: Option<Card>,
    incoming: RoomSnapshot,
    user_id: Option<&str>,
) -> Reconciled {
    let mut selected = selected_card;
    let mut cleared = None;

    if previous.active_task_id() != incoming.active_task_id() && selected.is_some() {
        selected = None;
        cleared = Some(ClearReason::ActiveTaskChanged);
    }

    if selected.is_some() && !incoming.cards_revealed() {
        let has_ballot = user_id.is_some_and(|id| incoming.has_vote_from(id));
        if !has_ballot {
            selected = None;
            cleared = Some(ClearReason::BallotMissing);
        }
    }

    Reconciled { snapshot: incoming, selected_card: selected, cleared }
}
