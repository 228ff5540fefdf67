//! Client-side state.
//!
//! SYSTEM CONTEXT
//! ==============
//! `session` owns identity and the cached room snapshot, `reconcile` decides
//! how an incoming snapshot affects local selection, `persist` stores the
//! identity between runs, and `stats` summarizes a revealed round.

pub mod persist;
pub mod reconcile;
pub mod session;
pub mod stats;
