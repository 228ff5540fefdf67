//! Planning-poker room client.
//!
//! SYSTEM CONTEXT
//! ==============
//! The backend owns all room state. This crate keeps a local copy of the
//! latest snapshot in sync through two channels (HTTP polling in `sync` and
//! websocket pushes in `net::push`), reconciles every incoming snapshot
//! against local selection state, and turns user gestures into backend
//! requests (`actions`, `lobby`). `render` and `command` are the terminal
//! front-end used by the `planpoker` binary.

pub mod actions;
pub mod command;
pub mod config;
pub mod error;
pub mod lobby;
pub mod net;
pub mod notify;
pub mod render;
pub mod state;
pub mod sync;
