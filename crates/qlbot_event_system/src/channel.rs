//! # Reply Channels
//!
//! A [`Channel`] is where a chat line came from and where the answer goes.
//! Chat-like channels split long replies on spaces and carry the last color
//! code into the next fragment, so a colored sentence stays colored across
//! lines. The console gets the text as-is.

use crate::entities::Player;
use crate::host::Host;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest fragment sent in one chat command.
pub const CHAT_LIMIT: usize = 100;

static COLOR_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\^.").expect("valid regex"));

/// Reply destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Channel {
    /// Public chat (`say`)
    Chat,
    /// Team chat (`say_team`)
    TeamChat,
    /// Private message to one player (`tell <cid>`)
    Tell { cid: u8, name: String },
    /// Local console
    Console,
}

impl Channel {
    /// Builds a tell channel targeting `player`.
    ///
    /// # Returns
    ///
    /// `None` for players without a client id (the console pseudo-player).
    pub fn tell(player: &Player) -> Option<Self> {
        player.client_id().map(|cid| Channel::Tell {
            cid,
            name: player.captured_name().to_string(),
        })
    }

    /// Logical channel name, shared by every tell.
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Chat => "chat",
            Channel::TeamChat => "team_chat",
            Channel::Tell { .. } => "tell",
            Channel::Console => "console",
        }
    }

    /// Name plus target for tells (`tell Mino`), name otherwise.
    pub fn identity(&self) -> String {
        match self {
            Channel::Tell { name, .. } => format!("tell {name}"),
            other => other.name().to_string(),
        }
    }

    /// Whether a filter entry (`chat`, `tell`, `tell Mino`, ...) designates this channel.
    pub fn matches(&self, entry: &str) -> bool {
        entry.eq_ignore_ascii_case(self.name()) || entry.eq_ignore_ascii_case(&self.identity())
    }

    /// Sends `message` through `host`.
    ///
    /// # Arguments
    ///
    /// * `host` - Outbound side of the agent
    /// * `message` - Text to deliver, possibly longer than one chat line
    pub fn reply(&self, host: &dyn Host, message: &str) {
        let command = match self {
            Channel::Console => {
                host.console_print(&format!("{message}\n"));
                return;
            }
            Channel::Chat => "say".to_string(),
            Channel::TeamChat => "say_team".to_string(),
            Channel::Tell { cid, .. } => format!("tell {cid}"),
        };

        let mut last_color = String::new();
        for piece in split_long_message(message, CHAT_LIMIT) {
            host.send_command(&format!("{command} \"{last_color}{piece}\""));
            if let Some(color) = COLOR_TAG.find_iter(&piece).last() {
                last_color = color.as_str().to_string();
            }
        }
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        self.identity().eq_ignore_ascii_case(&other.identity())
    }
}

impl Eq for Channel {}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity())
    }
}

/// Splits `message` into pieces shorter than `limit` characters.
///
/// Each cut happens at the last space before the limit and drops that space.
/// A run without spaces is cut hard at the limit.
pub fn split_long_message(message: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let chars: Vec<char> = message.chars().collect();
    let mut rest = &chars[..];
    let mut out = Vec::new();

    loop {
        if rest.len() < limit {
            out.push(rest.iter().collect());
            break;
        }

        match (1..limit).rev().find(|&i| rest[i] == ' ') {
            Some(i) => {
                out.push(rest[..i].iter().collect());
                rest = &rest[i + 1..];
            }
            None => {
                out.push(rest[..limit].iter().collect());
                rest = &rest[limit..];
            }
        }

        if rest.is_empty() {
            break;
        }
    }

    out
}
