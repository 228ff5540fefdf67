//! Client configuration.
//!
//! DESIGN
//! ======
//! The binary fills `ClientConfig` from clap (flags with `PLANPOKER_*` env
//! fallbacks); library users start from `ClientConfig::new` and override
//! fields directly. The push URL is derived from the HTTP base URL unless
//! given explicitly.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;

use crate::error::ClientError;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;
const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;
/// Upper bound on random jitter added to each reconnect delay.
const MAX_JITTER_MS: u64 = 250;

// =============================================================================
// RECONNECT POLICY
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Consecutive failed attempts before giving up; `None` retries forever.
    pub max_attempts: Option<u32>,
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            max_attempts: None,
            jitter: true,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (0-based): doubles from
    /// `initial_backoff`, capped at `max_backoff`, plus optional jitter.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        let base = self.initial_backoff.saturating_mul(factor).min(self.max_backoff);
        if self.jitter {
            base + Duration::from_millis(rand::rng().random_range(0..=MAX_JITTER_MS))
        } else {
            base
        }
    }

    #[must_use]
    pub fn exhausted(&self, failed_attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| failed_attempts >= max)
    }
}

// =============================================================================
// CLIENT CONFIG
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// HTTP origin of the backend (no `/api` suffix).
    pub base_url: String,
    /// Websocket URL of the push channel.
    pub ws_url: String,
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
    /// Directory holding the persisted session blob.
    pub state_dir: PathBuf,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    /// Defaults for everything but the backend origin.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBaseUrl` when `base_url` is not http(s).
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        let ws_url = ws_url_from_base(&base_url)?;
        Ok(Self {
            base_url,
            ws_url,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            state_dir: default_state_dir(),
            reconnect: ReconnectPolicy::default(),
        })
    }
}

/// `http://host` → `ws://host/ws`, `https://host` → `wss://host/ws`.
///
/// # Errors
///
/// Returns `InvalidBaseUrl` for any other scheme.
pub fn ws_url_from_base(base_url: &str) -> Result<String, ClientError> {
    let trimmed = base_url.trim_end_matches('/');

    if let Some(rest) = trimmed.strip_prefix("http://") {
        return Ok(format!("ws://{rest}/ws"));
    }
    if let Some(rest) = trimmed.strip_prefix("https://") {
        return Ok(format!("wss://{rest}/ws"));
    }

    Err(ClientError::InvalidBaseUrl(base_url.to_owned()))
}

/// `$XDG_CONFIG_HOME/planpoker`, else `$HOME/.config/planpoker`, else
/// `./.planpoker`.
#[must_use]
pub fn default_state_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg).join("planpoker");
    }
    if let Some(home) = std::env::var_os("HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(home).join(".config").join("planpoker");
    }
    PathBuf::from(".planpoker")
}
