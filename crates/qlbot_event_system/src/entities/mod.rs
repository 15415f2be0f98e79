//! Read facades over configstring state.
//!
//! [`Player`] and [`Game`] hold no copies of server state. Each accessor
//! re-reads the backing configstring and reports an [`EntityError`] when the
//! state has moved on, so a handle kept by a plugin across ticks never
//! silently describes someone else.
//!
//! [`EntityError`]: crate::error::EntityError

mod game;
mod player;
mod scores;

pub use game::{Game, GameState, GAMETYPES, GAMETYPES_SHORT, RULESETS};
pub use player::Player;
pub use scores::{CaEndStats, CaScores, WeaponStats, CA_SCORES_FIELDS, CA_STATS_MIN_FIELDS};

use crate::error::EntityError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Team a player belongs to, as stored in the `t` field of a player record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Free,
    Red,
    Blue,
    Spectator,
}

impl Team {
    pub const ALL: [Team; 4] = [Team::Free, Team::Red, Team::Blue, Team::Spectator];

    /// Maps the numeric team field onto a team.
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(Team::Free),
            1 => Some(Team::Red),
            2 => Some(Team::Blue),
            3 => Some(Team::Spectator),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            Team::Free => 0,
            Team::Red => 1,
            Team::Blue => 2,
            Team::Spectator => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Team::Free => "free",
            Team::Red => "red",
            Team::Blue => "blue",
            Team::Spectator => "spectator",
        }
    }

    /// Parses the value of a `t` field.
    pub fn parse_field(value: &str) -> Result<Self, EntityError> {
        value
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(Team::from_index)
            .ok_or_else(|| EntityError::InvalidField {
                key: "t".to_string(),
                value: value.to_string(),
            })
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn parse_int(key: &str, value: &str) -> Result<i64, EntityError> {
    value.trim().parse().map_err(|_| EntityError::InvalidField {
        key: key.to_string(),
        value: value.to_string(),
    })
}
