//! Wire DTOs for the room API and push channel.
//!
//! DESIGN
//! ======
//! These types mirror backend payloads so a snapshot can be decoded from
//! either channel with the same code. Every snapshot field is defaulted: the
//! backend answers `{}` for a room that no longer exists, and that must still
//! decode into an empty (not corrupt) snapshot.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ClientError;

// =============================================================================
// CARD
// =============================================================================

/// Point values available in the hand, in display order.
pub const FIBONACCI: [u8; 11] = [0, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89];

/// Full hand: every Fibonacci value followed by the "unsure" card.
pub const DECK: [Card; 12] = [
    Card::Points(0),
    Card::Points(1),
    Card::Points(2),
    Card::Points(3),
    Card::Points(5),
    Card::Points(8),
    Card::Points(13),
    Card::Points(21),
    Card::Points(34),
    Card::Points(55),
    Card::Points(89),
    Card::Unsure,
];

/// One estimation card. Travels as a string (`"8"`, `"?"`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Card {
    Points(u8),
    Unsure,
}

impl Card {
    /// Numeric value for statistics; `None` for `?`.
    #[must_use]
    pub fn points(self) -> Option<f64> {
        match self {
            Self::Points(n) => Some(f64::from(n)),
            Self::Unsure => None,
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Points(n) => write!(f, "{n}"),
            Self::Unsure => f.write_str("?"),
        }
    }
}

impl FromStr for Card {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == "?" {
            return Ok(Self::Unsure);
        }
        match trimmed.parse::<u8>() {
            Ok(n) if FIBONACCI.contains(&n) => Ok(Self::Points(n)),
            _ => Err(ClientError::InvalidCard(s.to_owned())),
        }
    }
}

impl Serialize for Card {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Card {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CardVisitor;

        impl Visitor<'_> for CardVisitor {
            type Value = Card;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a card value as string or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Card, E> {
                v.parse().map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Card, E> {
                match u8::try_from(v) {
                    Ok(n) if FIBONACCI.contains(&n) => Ok(Card::Points(n)),
                    _ => Err(E::invalid_value(de::Unexpected::Unsigned(v), &self)),
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Card, E> {
                match u64::try_from(v) {
                    Ok(n) => self.visit_u64(n),
                    Err(_) => Err(E::invalid_value(de::Unexpected::Signed(v), &self)),
                }
            }
        }

        deserializer.deserialize_any(CardVisitor)
    }
}

// =============================================================================
// ROOM / PARTICIPANT / TASK / VOTE
// =============================================================================

/// Room header as returned by create, join and inside snapshots.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    /// Short upper-case room code.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cards_revealed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A room member. Also used as the persisted session user.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_spectator: bool,
    /// Server-computed flag for the active task.
    #[serde(default)]
    pub has_voted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// Backlog display order.
    pub const ALL: [TaskStatus; 4] = [Self::Pending, Self::Active, Self::Completed, Self::Cancelled];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// A backlog item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_string_or_null")]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    /// Present once the task is `COMPLETED`.
    #[serde(default, deserialize_with = "deserialize_opt_string_from_any")]
    pub final_score: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
}

/// One ballot for the active task. `value` is masked by the backend until
/// the cards are revealed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub user_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_string_from_any")]
    pub value: Option<String>,
}

impl Vote {
    /// The ballot as a deck card, when revealed and well-formed.
    #[must_use]
    pub fn card(&self) -> Option<Card> {
        self.value.as_deref().and_then(|v| v.parse().ok())
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Complete server-authoritative room state at one instant.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    #[serde(default)]
    pub room: Option<RoomInfo>,
    #[serde(default)]
    pub users: Vec<Participant>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub votes: Vec<Vote>,
    #[serde(default)]
    pub active_task: Option<Task>,
}

impl RoomSnapshot {
    #[must_use]
    pub fn cards_revealed(&self) -> bool {
        self.room.as_ref().is_some_and(|r| r.cards_revealed)
    }

    #[must_use]
    pub fn active_task_id(&self) -> Option<&str> {
        self.active_task.as_ref().map(|t| t.id.as_str())
    }

    /// Members who hold a hand.
    pub fn voters(&self) -> impl Iterator<Item = &Participant> {
        self.users.iter().filter(|u| !u.is_spectator)
    }

    pub fn spectators(&self) -> impl Iterator<Item = &Participant> {
        self.users.iter().filter(|u| u.is_spectator)
    }

    /// The user's ballot; the last entry wins if the backend sent several.
    #[must_use]
    pub fn vote_for(&self, user_id: &str) -> Option<&Vote> {
        self.votes.iter().rev().find(|v| v.user_id == user_id)
    }

    #[must_use]
    pub fn has_vote_from(&self, user_id: &str) -> bool {
        self.votes.iter().any(|v| v.user_id == user_id)
    }

    /// Distinct users with a ballot.
    #[must_use]
    pub fn voted_count(&self) -> usize {
        let mut seen: Vec<&str> = self.votes.iter().map(|v| v.user_id.as_str()).collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }

    /// At least one voter, and every voter has a ballot.
    #[must_use]
    pub fn all_voted(&self) -> bool {
        let mut voters = self.voters().peekable();
        voters.peek().is_some() && voters.all(|u| self.has_vote_from(&u.id))
    }

    pub fn tasks_with_status(&self, status: TaskStatus) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |t| t.status == status)
    }
}

// =============================================================================
// REQUEST / RESPONSE BODIES
// =============================================================================

#[derive(Clone, Debug, Serialize)]
pub struct CreateRoomRequest<'a> {
    pub name: &'a str,
}

#[derive(Clone, Debug, Serialize)]
pub struct JoinRoomRequest<'a> {
    pub room_id: &'a str,
    pub name: &'a str,
    pub is_spectator: bool,
}

/// Body of a successful join.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoinResponse {
    pub user: Participant,
    pub room: RoomInfo,
}

fn deserialize_string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Older backends stored vote values as numbers; normalize to strings.
fn deserialize_opt_string_from_any<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!("expected a string or number, got {other}"))),
    }
}
