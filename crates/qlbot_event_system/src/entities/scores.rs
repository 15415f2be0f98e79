//! Clan Arena score and end-of-game statistics rows.

use super::Team;
use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};

/// Integers per player in a `scores_ca` block.
pub const CA_SCORES_FIELDS: usize = 17;
/// Minimum integers in a `castats` line: damage plus 15 weapon pairs.
pub const CA_STATS_MIN_FIELDS: usize = 33;

const WEAPONS: [&str; 15] = [
    "gauntlet", "mg", "sg", "gl", "rl", "lg", "rg", "pg", "wpn9", "wpn10", "wpn11", "wpn12",
    "wpn13", "hmg", "wpn15",
];

/// One player's row from a `scores_ca` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaScores {
    pub cid: u8,
    pub team: Team,
    pub premium: bool,
    pub score: i64,
    pub ping: i64,
    pub time: i64,
    pub kills: i64,
    pub deaths: i64,
    pub accuracy: i64,
    pub best_weapon: i64,
    pub best_weapon_accuracy: i64,
    pub damage_done: i64,
    pub impressives: i64,
    pub excellents: i64,
    pub humiliations: i64,
    pub perfect: i64,
    pub alive: bool,
}

impl CaScores {
    /// Builds a row from exactly [`CA_SCORES_FIELDS`] integers.
    pub fn from_fields(fields: &[i64]) -> Result<Self, ProtocolError> {
        if fields.len() != CA_SCORES_FIELDS {
            return Err(malformed(
                "scores_ca",
                format!("expected {CA_SCORES_FIELDS} fields, got {}", fields.len()),
            ));
        }
        let cid = u8::try_from(fields[0])
            .map_err(|_| malformed("scores_ca", format!("bad client id {}", fields[0])))?;
        let team = Team::from_index(fields[1])
            .ok_or_else(|| malformed("scores_ca", format!("bad team {}", fields[1])))?;

        Ok(Self {
            cid,
            team,
            premium: fields[2] != 0,
            score: fields[3],
            ping: fields[4],
            time: fields[5],
            kills: fields[6],
            deaths: fields[7],
            accuracy: fields[8],
            best_weapon: fields[9],
            best_weapon_accuracy: fields[10],
            damage_done: fields[11],
            impressives: fields[12],
            excellents: fields[13],
            humiliations: fields[14],
            perfect: fields[15],
            alive: fields[16] != 0,
        })
    }
}

/// Accuracy and kills with one weapon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponStats {
    pub weapon: String,
    pub accuracy: i64,
    pub kills: i64,
}

/// One player's end-of-game statistics from a `castats` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaEndStats {
    pub cid: u8,
    pub damage_done: i64,
    pub damage_received: i64,
    pub weapons: Vec<WeaponStats>,
}

impl CaEndStats {
    /// Builds a row for `cid` from the integers of a `castats` line.
    ///
    /// Index 0 is not used; damage sits at 1 and 2, then one
    /// (accuracy, kills) pair per weapon.
    pub fn from_fields(cid: u8, fields: &[i64]) -> Result<Self, ProtocolError> {
        if fields.len() < CA_STATS_MIN_FIELDS {
            return Err(malformed(
                "castats",
                format!("expected at least {CA_STATS_MIN_FIELDS} fields, got {}", fields.len()),
            ));
        }

        let weapons = WEAPONS
            .iter()
            .zip(fields[3..CA_STATS_MIN_FIELDS].chunks_exact(2))
            .map(|(name, pair)| WeaponStats {
                weapon: (*name).to_string(),
                accuracy: pair[0],
                kills: pair[1],
            })
            .collect();

        Ok(Self {
            cid,
            damage_done: fields[1],
            damage_received: fields[2],
            weapons,
        })
    }

    pub fn weapon(&self, name: &str) -> Option<&WeaponStats> {
        self.weapons.iter().find(|w| w.weapon == name)
    }
}

fn malformed(shape: &'static str, detail: String) -> ProtocolError {
    ProtocolError::Malformed { shape, detail }
}
