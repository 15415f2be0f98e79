//! Error types shared across the event system.
//!
//! Each layer of the agent reports failures through its own enum so callers can
//! tell apart a bad registration, a stale entity handle, malformed server input
//! and a misbehaving plugin.

use thiserror::Error;

/// Errors returned synchronously when registering or removing hooks and commands.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Priority level outside of the five available buckets
    #[error("Invalid priority level: {0} (expected 0..=4)")]
    InvalidPriority(u8),
    /// The same (owner, handler) pair is already hooked into the stream
    #[error("Handler '{handler}' from '{owner}' is already hooked into '{stream}'")]
    DuplicateHook {
        stream: String,
        owner: String,
        handler: String,
    },
    /// The (owner, handler) pair was never hooked into the stream
    #[error("Handler '{handler}' from '{owner}' is not hooked into '{stream}'")]
    UnknownHook {
        stream: String,
        owner: String,
        handler: String,
    },
    /// A command with the same name and handler already exists for the owner
    #[error("Command '{name}' with handler '{handler}' is already registered by '{owner}'")]
    DuplicateCommand {
        name: String,
        owner: String,
        handler: String,
    },
    /// No matching command to remove
    #[error("Command '{name}' with handler '{handler}' is not registered by '{owner}'")]
    UnknownCommand {
        name: String,
        owner: String,
        handler: String,
    },
    /// Commands need at least one non-blank name
    #[error("Command registered by '{0}' has no name")]
    EmptyCommandName(String),
}

/// Returned by player and game accessors when the underlying state has moved on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityError {
    /// The slot is empty or is now occupied by someone else
    #[error("Player with client id {cid} is gone")]
    PlayerGone { cid: u8 },
    /// Configstring 0 is empty
    #[error("No game is currently active")]
    NoActiveGame,
    /// A required field is absent from the record
    #[error("Missing field: {0}")]
    MissingField(String),
    /// A field exists but could not be interpreted
    #[error("Invalid value '{value}' for field '{key}'")]
    InvalidField { key: String, value: String },
    /// Client ids are 0..=31
    #[error("Client id out of range: {0}")]
    InvalidClientId(i64),
}

/// Malformed or out-of-sequence server input.
///
/// These never reach handlers: the parser logs them and drops the notification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A continuation fragment arrived with no buffered start fragment
    #[error("Split configstring fragment for index {index} has no start fragment")]
    OrphanFragment { index: u16 },
    /// The `bcs` mode digit was not 0, 1 or 2
    #[error("Unknown split configstring mode: {0}")]
    UnknownFragmentMode(String),
    /// A `castats` line arrived with no pending client id
    #[error("Statistics line received with no pending client id")]
    UnexpectedStats,
    /// The line matched a known shape but its fields did not make sense
    #[error("Malformed {shape} notification: {detail}")]
    Malformed { shape: &'static str, detail: String },
}

/// Errors raised while loading, running or unloading plugins.
#[derive(Error, Debug)]
pub enum PluginError {
    /// A plugin with the same name is already loaded
    #[error("Plugin already loaded: {0}")]
    AlreadyLoaded(String),
    /// Requested plugin was not found
    #[error("Plugin not found: {0}")]
    NotFound(String),
    /// A hook or command could not be registered
    #[error("Plugin registration failed: {0}")]
    Registration(#[from] RegistrationError),
    /// Plugin initialization failed during startup
    #[error("Plugin initialization failed: {0}")]
    InitializationFailed(String),
    /// Runtime error such as panic
    #[error("Plugin runtime error: {0}")]
    Runtime(String),
}

/// Converts a panic payload into a readable message.
pub(crate) fn panic_message(panic_info: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked with unknown error".to_string()
    }
}
