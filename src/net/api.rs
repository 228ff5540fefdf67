//! REST client for the room backend.
//!
//! SYSTEM CONTEXT
//! ==============
//! `RoomBackend` is the seam between the sync/dispatch layer and HTTP. The
//! production implementation is `HttpApi` (reqwest); tests plug in an
//! in-memory backend instead.
//!
//! ERROR HANDLING
//! ==============
//! 404 on a room route maps to `ClientError::NotFound`. Any other non-success
//! answer to a mutation maps to `ClientError::ActionFailed`; the response body
//! is never inspected for mutations.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;

use super::types::{Card, CreateRoomRequest, JoinResponse, JoinRoomRequest, RoomInfo, RoomSnapshot};
use crate::error::ClientError;

/// Backend operations the client depends on.
#[async_trait]
pub trait RoomBackend: Send + Sync {
    async fn create_room(&self, name: &str) -> Result<RoomInfo, ClientError>;

    async fn join_room(&self, room_id: &str, name: &str, is_spectator: bool) -> Result<JoinResponse, ClientError>;

    /// Pull the authoritative snapshot for `room_id`.
    async fn fetch_snapshot(&self, room_id: &str) -> Result<RoomSnapshot, ClientError>;

    /// Issue one room mutation. The response body is ignored; state converges
    /// through the next snapshot.
    async fn send_action(&self, action: &RoomAction) -> Result<(), ClientError>;
}

// =============================================================================
// ACTIONS
// =============================================================================

/// One outbound mutation. Serializes to the exact request body.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RoomAction {
    CastVote { room_id: String, user_id: String, task_id: String, value: Card },
    RevealCards { room_id: String, user_id: String },
    ResetVotes { room_id: String, user_id: String, task_id: Option<String> },
    SetActiveTask { room_id: String, user_id: String, task_id: String },
    CompleteTask { room_id: String, user_id: String, task_id: String, final_score: Card },
    CancelTask { room_id: String, user_id: String, task_id: String },
    AddTask { room_id: String, title: String, description: String },
    DeleteTask { room_id: String, user_id: String, task_id: String },
}

impl RoomAction {
    #[must_use]
    pub fn path(&self) -> &'static str {
        match self {
            Self::CastVote { .. } => "/api/vote",
            Self::RevealCards { .. } => "/api/reveal",
            Self::ResetVotes { .. } => "/api/reset",
            Self::SetActiveTask { .. } => "/api/active-task",
            Self::CompleteTask { .. } => "/api/complete",
            Self::CancelTask { .. } => "/api/cancel-task",
            Self::AddTask { .. } => "/api/tasks",
            Self::DeleteTask { .. } => "/api/delete-task",
        }
    }

    /// Short name used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CastVote { .. } => "cast vote",
            Self::RevealCards { .. } => "reveal cards",
            Self::ResetVotes { .. } => "reset votes",
            Self::SetActiveTask { .. } => "set active task",
            Self::CompleteTask { .. } => "complete task",
            Self::CancelTask { .. } => "cancel task",
            Self::AddTask { .. } => "add task",
            Self::DeleteTask { .. } => "delete task",
        }
    }

    #[must_use]
    pub fn room_id(&self) -> &str {
        match self {
            Self::CastVote { room_id, .. }
            | Self::RevealCards { room_id, .. }
            | Self::ResetVotes { room_id, .. }
            | Self::SetActiveTask { room_id, .. }
            | Self::CompleteTask { room_id, .. }
            | Self::CancelTask { room_id, .. }
            | Self::AddTask { room_id, .. }
            | Self::DeleteTask { room_id, .. } => room_id,
        }
    }
}

// =============================================================================
// HTTP IMPLEMENTATION
// =============================================================================

fn rooms_endpoint() -> &'static str {
    "/api/rooms"
}

fn join_endpoint(room_id: &str) -> String {
    format!("/api/rooms/{room_id}/join")
}

fn state_endpoint(room_id: &str) -> String {
    format!("/api/rooms/{room_id}/state")
}

/// reqwest-backed `RoomBackend`.
#[derive(Clone, Debug)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    /// Build a client rooted at `base_url` (scheme + host, no `/api`).
    ///
    /// # Errors
    ///
    /// Returns `InvalidBaseUrl` for non-http(s) URLs, or a network error if
    /// the TLS backend cannot be initialized.
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, ClientError> {
        let trimmed = base_url.trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(ClientError::InvalidBaseUrl(base_url.to_owned()));
        }
        let client = reqwest::Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self { client, base_url: trimmed.to_owned() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl RoomBackend for HttpApi {
    async fn create_room(&self, name: &str) -> Result<RoomInfo, ClientError> {
        let response = self
            .client
            .post(self.url(rooms_endpoint()))
            .json(&CreateRoomRequest { name })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::from_status("create room", status));
        }
        Ok(response.json::<RoomInfo>().await?)
    }

    async fn join_room(&self, room_id: &str, name: &str, is_spectator: bool) -> Result<JoinResponse, ClientError> {
        let response = self
            .client
            .post(self.url(&join_endpoint(room_id)))
            .json(&JoinRoomRequest { room_id, name, is_spectator })
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(ClientError::NotFound { room_id: room_id.to_owned() }),
            status if !status.is_success() => Err(ClientError::from_status("join room", status)),
            _ => Ok(response.json::<JoinResponse>().await?),
        }
    }

    async fn fetch_snapshot(&self, room_id: &str) -> Result<RoomSnapshot, ClientError> {
        let response = self.client.get(self.url(&state_endpoint(room_id))).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound { room_id: room_id.to_owned() });
        }
        let response = response.error_for_status()?;
        Ok(response.json::<RoomSnapshot>().await?)
    }

    async fn send_action(&self, action: &RoomAction) -> Result<(), ClientError> {
        let response = self.client.post(self.url(action.path())).json(action).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(ClientError::NotFound { room_id: action.room_id().to_owned() }),
            status if !status.is_success() => Err(ClientError::from_status(action.name(), status)),
            _ => Ok(()),
        }
    }
}
