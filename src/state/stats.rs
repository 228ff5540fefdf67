//! Summary of a revealed round.

#[cfg(test)]
#[path = "stats_test.rs"]
mod stats_test;

use crate::net::types::RoomSnapshot;

#[derive(Clone, Debug, PartialEq)]
pub struct VoteStats {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub spread: f64,
    /// The single most common ballot (including `?`); `None` on a tie.
    pub consensus: Option<String>,
    pub total_votes: usize,
}

impl VoteStats {
    /// Compute stats for a revealed round. Returns `None` while cards are
    /// hidden or when no ballot carries a number.
    #[must_use]
    pub fn from_snapshot(snapshot: &RoomSnapshot) -> Option<Self> {
        if !snapshot.cards_revealed() || snapshot.votes.is_empty() {
            return None;
        }

        let mut numeric: Vec<f64> = snapshot
            .votes
            .iter()
            .filter_map(|v| v.card().and_then(|c| c.points()))
            .collect();
        if numeric.is_empty() {
            return None;
        }
        numeric.sort_by(f64::total_cmp);

        #[allow(clippy::cast_precision_loss)]
        let average = numeric.iter().sum::<f64>() / numeric.len() as f64;
        let min = numeric[0];
        let max = numeric[numeric.len() - 1];

        let mut counts: Vec<(&str, usize)> = Vec::new();
        for value in snapshot.votes.iter().filter_map(|v| v.value.as_deref()) {
            match counts.iter_mut().find(|(v, _)| *v == value) {
                Some((_, n)) => *n += 1,
                None => counts.push((value, 1)),
            }
        }
        let top = counts.iter().map(|(_, n)| *n).max().unwrap_or(0);
        let mut leaders = counts.iter().filter(|(_, n)| *n == top);
        let consensus = match (leaders.next(), leaders.next()) {
            (Some((value, _)), None) => Some((*value).to_owned()),
            _ => None,
        };

        Some(Self { average, min, max, spread: max - min, consensus, total_votes: snapshot.votes.len() })
    }

    /// Average rounded for display, e.g. `"4.3"`.
    #[must_use]
    pub fn average_label(&self) -> String {
        format!("{:.1}", self.average)
    }
}
