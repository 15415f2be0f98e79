//! # Host Interface
//!
//! The agent never talks to the game server directly. Everything outbound goes
//! through a [`Host`] supplied by the embedding application: server commands,
//! console output, and reads of the configstrings the host itself has applied.
//!
//! ## Live vs. cached configstrings
//!
//! The host applies configstring updates *after* handing the raw line to the
//! agent, so while a line is being processed `live_configstring` still returns
//! the previous value. The parser relies on this to diff old and new state.

use std::fmt::Debug;

/// Outbound side of the agent.
///
/// Implementations must be thread-safe: handlers can call back into the host
/// from timers and background tasks.
pub trait Host: Send + Sync + Debug {
    /// Sends a raw command to the game server (e.g. `say "hi"`).
    fn send_command(&self, command: &str);

    /// Writes text to the local console. The text carries its own newline.
    fn console_print(&self, text: &str);

    /// Reads a configstring as currently applied by the host.
    ///
    /// # Returns
    ///
    /// `None` when the index has never been set.
    fn live_configstring(&self, index: u16) -> Option<String>;
}
