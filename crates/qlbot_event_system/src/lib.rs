//! # QLBot Event System
//!
//! The message-ingestion and event-dispatch core of a Quake Live server bot.
//! The host (whatever is attached to the game client) hands raw server lines
//! to an [`Agent`]; the agent turns them into typed [`Event`]s and delivers
//! them to plugin hooks and chat commands.
//!
//! ## Core Features
//!
//! - **Typed events**: one closed [`Event`] enum, one stream per variant
//! - **Configstring cache**: cached and live views of the server state
//! - **Reassembly**: split configstrings and end-of-game statistics are
//!   stitched together before anything sees them
//! - **Vote tracking**: caller, subject and outcome merged into two events
//! - **Fault isolation**: a failing or panicking handler never stops the
//!   others
//! - **Commands**: prefix, permissions, channel filters, usage replies
//!
//! ## Architecture Overview
//!
//! ```text
//! raw line → ProtocolParser ─┬→ ConfigstringStore
//!                            ├→ BigConfigstrings / StatsCollector
//!                            └→ VoteTracker
//!          → Event → EventBus (5 priority buckets) → hooks
//!                  → CommandRouter (chat only)      → commands
//! ```
//!
//! ## Quick Start Example
//!
//! ```rust,no_run
//! use qlbot_event_system::*;
//! use std::sync::Arc;
//!
//! let host = Arc::new(testing::RecordingHost::new());
//! let agent = Agent::new(AgentConfig::default(), host, Arc::new(MemoryPermissions::new()));
//!
//! agent
//!     .bus()
//!     .add_hook(EventKind::PlayerConnect, "example", "welcome", Priority::Normal, |agent: &Agent, event: &Event| {
//!         if let Event::PlayerConnect { player } = event {
//!             agent.tell("Welcome!", player);
//!         }
//!         Ok(Flow::Continue)
//!     })
//!     .unwrap();
//!
//! agent.on_connection_status(8);
//! agent.on_message(r#"cs 529 "\n\Mino\t\1""#);
//! ```

pub mod agent;
pub mod bus;
pub mod channel;
pub mod commands;
pub mod configstrings;
pub mod entities;
pub mod error;
pub mod events;
pub mod host;
pub mod parser;
pub mod permissions;
pub mod plugin;
pub mod reassembly;
pub mod testing;
pub mod utils;
pub mod variables;
pub mod votes;

pub use agent::{Agent, AgentConfig, ConnectionStatus};
pub use bus::{BusStats, DispatchReport, EventBus, Flow, HandlerFault, Priority};
pub use channel::Channel;
pub use commands::{ChannelFilter, Command, CommandCall, CommandRouter};
pub use configstrings::ConfigstringStore;
pub use entities::{CaEndStats, CaScores, Game, GameState, Player, Team, WeaponStats};
pub use error::{EntityError, PluginError, ProtocolError, RegistrationError};
pub use events::{DisconnectReason, Event, EventKind, VoteOutcome};
pub use host::Host;
pub use parser::ProtocolParser;
pub use permissions::{MemoryPermissions, PermissionStore, Permissions, BOT_PERMISSION_LEVEL};
pub use plugin::{Plugin, PluginContext};
pub use variables::VariableMap;
pub use votes::VoteTracker;
