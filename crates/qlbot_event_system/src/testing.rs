//! In-memory [`Host`] used by tests and offline tooling.

use crate::host::Host;
use crate::utils::lock;
use std::collections::HashMap;
use std::sync::Mutex;

/// A host that records everything sent to it and serves configstrings from a
/// mutable table.
#[derive(Debug, Default)]
pub struct RecordingHost {
    commands: Mutex<Vec<String>>,
    console: Mutex<Vec<String>>,
    configstrings: Mutex<HashMap<u16, String>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the host-side ("live") value of a configstring.
    pub fn set_live(&self, index: u16, value: impl Into<String>) {
        lock(&self.configstrings).insert(index, value.into());
    }

    /// Removes the host-side value of a configstring.
    pub fn unset_live(&self, index: u16) {
        lock(&self.configstrings).remove(&index);
    }

    /// Commands sent so far, oldest first.
    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }

    /// Drains the recorded commands.
    pub fn take_commands(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.commands))
    }

    /// Console output written so far.
    pub fn console_output(&self) -> Vec<String> {
        lock(&self.console).clone()
    }
}

impl Host for RecordingHost {
    fn send_command(&self, command: &str) {
        lock(&self.commands).push(command.to_string());
    }

    fn console_print(&self, text: &str) {
        lock(&self.console).push(text.to_string());
    }

    fn live_configstring(&self, index: u16) -> Option<String> {
        lock(&self.configstrings).get(&index).cloned()
    }
}
