//! Mirrors the currently playing track into a custom chat status and clears it after silence.

pub mod config;
pub mod debounce;
pub mod logging;
pub mod mpris;
pub mod presence;
pub mod publisher;
mod utils;
