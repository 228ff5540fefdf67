//! Crate-wide error type.
//!
//! ERROR HANDLING
//! ==============
//! Only `Validation`, `NotFound` and `ActionFailed` are ever shown to the
//! user (through notices). Transport failures from the poll loop and the
//! push channel are logged and retried; they never escape the sync tasks.

#[cfg(test)]
#[path = "error_test.rs"]
mod error_test;

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport failure or undecodable response body.
    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// The backend answered 404 for the room.
    #[error("room `{room_id}` not found")]
    NotFound { room_id: String },
    /// A required input was missing or malformed; nothing was sent.
    #[error("{0}")]
    Validation(String),
    /// The backend rejected a mutation.
    #[error("{action} failed: HTTP {status}")]
    ActionFailed { action: &'static str, status: u16 },
    /// Admin-only gesture issued by a non-admin session.
    #[error("only the room admin can {0}")]
    NotAdmin(&'static str),
    /// No joined room; the user has to create or join one first.
    #[error("no active session; run `planpoker join` or `planpoker create` first")]
    NoSession,
    /// Voting is closed for this round (spectator, no active task, or cards revealed).
    #[error("voting closed: {0}")]
    VotingClosed(&'static str),
    #[error("invalid card `{0}`; expected one of 0 1 2 3 5 8 13 21 34 55 89 ?")]
    InvalidCard(String),
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("session storage failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("websocket connect failed: {0}")]
    WsConnect(Box<tokio_tungstenite::tungstenite::Error>),
}

impl ClientError {
    /// Classify a non-success HTTP status for a mutation.
    #[must_use]
    pub fn from_status(action: &'static str, status: StatusCode) -> Self {
        Self::ActionFailed { action, status: status.as_u16() }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WsConnect(Box::new(e))
    }
}
