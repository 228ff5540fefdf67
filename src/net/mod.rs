//! Networking modules for HTTP + push channel.
//!
//! SYSTEM CONTEXT
//! ==============
//! `api` handles REST calls, `push` manages the websocket lifecycle,
//! and `types` defines the shared wire schema.

pub mod api;
pub mod push;
pub mod types;
