//! # Events
//!
//! Every notification the agent understands becomes one variant of [`Event`].
//! Variants map onto named streams through [`EventKind`]; handlers subscribe
//! to a stream and receive the whole event.

use crate::channel::Channel;
use crate::entities::{CaEndStats, CaScores, Game, Player, Team};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a player left. Set by a `print` notification, consumed by the next
/// disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    Disconnect,
    Kick,
    Ragequit,
    Timeout,
    #[default]
    Unknown,
}

impl DisconnectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DisconnectReason::Disconnect => "disconnect",
            DisconnectReason::Kick => "kick",
            DisconnectReason::Ragequit => "ragequit",
            DisconnectReason::Timeout => "timeout",
            DisconnectReason::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a vote ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteOutcome {
    Passed,
    Failed,
    /// The vote was dropped by a game state change before it resolved.
    Cancelled,
}

/// Typed notification delivered to handlers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Public chat, team chat or tell. `player` is `None` when the name could
    /// not be matched to a slot.
    Chat {
        player: Option<Player>,
        message: String,
        channel: Channel,
    },
    PlayerConnect {
        player: Player,
    },
    /// `player` is a detached snapshot of the record the player left behind.
    PlayerDisconnect {
        player: Player,
        reason: DisconnectReason,
    },
    RoundCountdown {
        round: i64,
    },
    RoundStart {
        round: i64,
    },
    /// `score` is (red, blue).
    RoundEnd {
        score: (i64, i64),
        winner: Team,
    },
    GameCountdown,
    GameStart {
        game: Game,
    },
    GameEnd {
        game: Game,
        score: (i64, i64),
        winner: Team,
    },
    TeamSwitch {
        player: Player,
        old_team: Team,
        new_team: Team,
    },
    Map {
        name: String,
    },
    /// `kind` and `args` are lower-cased.
    VoteCalled {
        caller: Option<Player>,
        kind: String,
        args: String,
    },
    /// `votes` is (yes, no).
    VoteEnded {
        kind: String,
        args: Option<String>,
        votes: (i64, i64),
        outcome: VoteOutcome,
    },
    /// Every inbound line, after everything else it produced.
    Raw {
        line: String,
    },
    /// Every inbound `cs` update, after it was cached.
    ConfigstringChanged {
        index: u16,
        value: String,
    },
    /// A configstring delivered as part of the initial game state.
    Gamestate {
        index: u16,
        value: String,
    },
    Scores {
        rows: Vec<CaScores>,
    },
    Stats {
        rows: Vec<CaEndStats>,
    },
    Console {
        text: String,
    },
    BotConnect,
    BotDisconnect,
    /// Delivered only to the hooks of the plugin being unloaded.
    Unload {
        owner: String,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Chat { .. } => EventKind::Chat,
            Event::PlayerConnect { .. } => EventKind::PlayerConnect,
            Event::PlayerDisconnect { .. } => EventKind::PlayerDisconnect,
            Event::RoundCountdown { .. } => EventKind::RoundCountdown,
            Event::RoundStart { .. } => EventKind::RoundStart,
            Event::RoundEnd { .. } => EventKind::RoundEnd,
            Event::GameCountdown => EventKind::GameCountdown,
            Event::GameStart { .. } => EventKind::GameStart,
            Event::GameEnd { .. } => EventKind::GameEnd,
            Event::TeamSwitch { .. } => EventKind::TeamSwitch,
            Event::Map { .. } => EventKind::Map,
            Event::VoteCalled { .. } => EventKind::VoteCalled,
            Event::VoteEnded { .. } => EventKind::VoteEnded,
            Event::Raw { .. } => EventKind::Raw,
            Event::ConfigstringChanged { .. } => EventKind::Configstring,
            Event::Gamestate { .. } => EventKind::Gamestate,
            Event::Scores { .. } => EventKind::Scores,
            Event::Stats { .. } => EventKind::Stats,
            Event::Console { .. } => EventKind::Console,
            Event::BotConnect => EventKind::BotConnect,
            Event::BotDisconnect => EventKind::BotDisconnect,
            Event::Unload { .. } => EventKind::Unload,
        }
    }
}

/// Name of an event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Chat,
    PlayerConnect,
    PlayerDisconnect,
    RoundCountdown,
    RoundStart,
    RoundEnd,
    GameCountdown,
    GameStart,
    GameEnd,
    TeamSwitch,
    Map,
    VoteCalled,
    VoteEnded,
    Raw,
    Configstring,
    Gamestate,
    Scores,
    Stats,
    Console,
    BotConnect,
    BotDisconnect,
    Unload,
}

impl EventKind {
    pub const ALL: [EventKind; 22] = [
        EventKind::Chat,
        EventKind::PlayerConnect,
        EventKind::PlayerDisconnect,
        EventKind::RoundCountdown,
        EventKind::RoundStart,
        EventKind::RoundEnd,
        EventKind::GameCountdown,
        EventKind::GameStart,
        EventKind::GameEnd,
        EventKind::TeamSwitch,
        EventKind::Map,
        EventKind::VoteCalled,
        EventKind::VoteEnded,
        EventKind::Raw,
        EventKind::Configstring,
        EventKind::Gamestate,
        EventKind::Scores,
        EventKind::Stats,
        EventKind::Console,
        EventKind::BotConnect,
        EventKind::BotDisconnect,
        EventKind::Unload,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Chat => "chat",
            EventKind::PlayerConnect => "player_connect",
            EventKind::PlayerDisconnect => "player_disconnect",
            EventKind::RoundCountdown => "round_countdown",
            EventKind::RoundStart => "round_start",
            EventKind::RoundEnd => "round_end",
            EventKind::GameCountdown => "game_countdown",
            EventKind::GameStart => "game_start",
            EventKind::GameEnd => "game_end",
            EventKind::TeamSwitch => "team_switch",
            EventKind::Map => "map",
            EventKind::VoteCalled => "vote_called",
            EventKind::VoteEnded => "vote_ended",
            EventKind::Raw => "raw",
            EventKind::Configstring => "configstring",
            EventKind::Gamestate => "gamestate",
            EventKind::Scores => "scores",
            EventKind::Stats => "stats",
            EventKind::Console => "console",
            EventKind::BotConnect => "bot_connect",
            EventKind::BotDisconnect => "bot_disconnect",
            EventKind::Unload => "unload",
        }
    }

    /// Looks a stream up by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
