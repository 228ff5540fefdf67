//! Plain-text room view.
//!
//! Pure functions from the session store to a string; the binary decides
//! when to redraw. Tasks are numbered by their position in the snapshot's
//! backlog so the numbers match what `command::resolve_task` accepts.

#[cfg(test)]
#[path = "render_test.rs"]
mod render_test;

use crate::net::types::{DECK, Participant, RoomSnapshot, Task, TaskStatus};
use crate::notify::Notice;
use crate::state::session::{Identity, SessionStore};
use crate::state::stats::VoteStats;

/// Full room view.
#[must_use]
pub fn render_room(store: &SessionStore) -> String {
    let snapshot = store.snapshot();
    let mut lines = Vec::new();

    lines.push(header(store));
    lines.push(String::new());
    active_task(snapshot, &mut lines);
    lines.push(String::new());
    participants(store, &mut lines);

    if let Some(stats) = VoteStats::from_snapshot(snapshot) {
        lines.push(String::new());
        let consensus = stats.consensus.as_deref().unwrap_or("none");
        lines.push(format!(
            "Results: average {} | min {} | max {} | spread {} | consensus {} | {} votes",
            stats.average_label(),
            stats.min,
            stats.max,
            stats.spread,
            consensus,
            stats.total_votes
        ));
    } else if store.is_admin() && snapshot.active_task.is_some() && !snapshot.cards_revealed() {
        lines.push(String::new());
        let voters = snapshot.voters().count();
        let mut progress = format!("{}/{voters} voted", snapshot.voted_count());
        if snapshot.all_voted() {
            progress.push_str(" - ready to reveal");
        }
        lines.push(progress);
    }

    if !store.is_spectator() {
        lines.push(String::new());
        lines.push(hand(store));
    }

    lines.push(String::new());
    backlog(snapshot, &mut lines);
    lines.join("\n")
}

fn header(store: &SessionStore) -> String {
    let (name, id) = store
        .snapshot()
        .room
        .as_ref()
        .or(store.room())
        .map_or(("?", "?"), |r| (r.name.as_str(), r.id.as_str()));
    let link = if store.is_connected() { "live" } else { "offline" };
    format!("== {name} ({id}) == [{link}]")
}

fn active_task(snapshot: &RoomSnapshot, lines: &mut Vec<String>) {
    match &snapshot.active_task {
        Some(task) => {
            let state = if snapshot.cards_revealed() { "revealed" } else { "voting" };
            lines.push(format!("Active task: {} [{state}]", task.title));
            if !task.description.is_empty() {
                lines.push(format!("  {}", task.description));
            }
        }
        None => lines.push("No Active Task".to_owned()),
    }
}

fn role(user: &Participant) -> &'static str {
    match (user.is_admin, user.is_spectator) {
        (true, _) => " (admin)",
        (false, true) => " (spectator)",
        (false, false) => "",
    }
}

fn participants(store: &SessionStore, lines: &mut Vec<String>) {
    let snapshot = store.snapshot();
    let me = store.user().map(|u| u.id.as_str());

    lines.push("Participants:".to_owned());
    for user in snapshot.voters() {
        let marker = if Some(user.id.as_str()) == me { "*" } else { " " };
        let ballot = match snapshot.vote_for(&user.id) {
            Some(vote) if snapshot.cards_revealed() => vote.value.clone().unwrap_or_else(|| "?".to_owned()),
            Some(_) => "voted".to_owned(),
            None if user.has_voted && snapshot.active_task.is_some() => "voted".to_owned(),
            None => "waiting".to_owned(),
        };
        lines.push(format!(" {marker} {}{}: {ballot}", user.name, role(user)));
    }

    let spectators: Vec<&str> = snapshot.spectators().map(|u| u.name.as_str()).collect();
    if !spectators.is_empty() {
        lines.push(format!("Spectators: {}", spectators.join(", ")));
    }
}

fn hand(store: &SessionStore) -> String {
    let selected = store.selected_card();
    let cards: Vec<String> = DECK
        .iter()
        .map(|card| if Some(*card) == selected { format!("[{card}]") } else { card.to_string() })
        .collect();
    format!("Hand: {}", cards.join(" "))
}

fn backlog(snapshot: &RoomSnapshot, lines: &mut Vec<String>) {
    lines.push("Tasks:".to_owned());
    if snapshot.tasks.is_empty() {
        lines.push("  (none)".to_owned());
        return;
    }
    // Numbers are backlog positions, the same ones `activate 2` accepts.
    let number = |task: &Task| snapshot.tasks.iter().position(|t| std::ptr::eq(t, task)).map_or(0, |i| i + 1);
    for status in TaskStatus::ALL {
        let mut group = snapshot.tasks_with_status(status).peekable();
        if group.peek().is_none() {
            continue;
        }
        lines.push(format!("  {}", status.label()));
        for task in group {
            let score = task.final_score.as_deref().map(|s| format!(" ({s} pts)")).unwrap_or_default();
            lines.push(format!("    {}. {}{score}", number(task), task.title));
        }
    }
}

/// One toast line.
#[must_use]
pub fn render_notice(notice: &Notice) -> String {
    format!("{} {}", notice.prefix(), notice.message)
}

/// Who am I, for `whoami` and `status`.
#[must_use]
pub fn render_identity(identity: &Identity) -> String {
    match (&identity.user, &identity.room) {
        (Some(user), Some(room)) => {
            format!("{}{} in {} ({}) as user {}", user.name, role(user), room.name, room.id, user.id)
        }
        _ => "no active session".to_owned(),
    }
}
