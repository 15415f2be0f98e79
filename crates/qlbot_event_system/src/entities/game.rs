use super::parse_int;
use crate::configstrings::{ConfigstringStore, CS_MAP, CS_SCORE_BLUE, CS_SCORE_RED, CS_SERVERINFO};
use crate::error::EntityError;
use crate::variables::VariableMap;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Long game type names, indexed by `g_gametype`.
pub const GAMETYPES: [&str; 12] = [
    "Free for All",
    "Duel",
    "Race",
    "Team Deathmatch",
    "Clan Arena",
    "Capture the Flag",
    "Overload",
    "Harvester",
    "Freeze Tag",
    "Domination",
    "Attack and Defend",
    "Red Rover",
];

/// Short game type names, indexed by `g_gametype`.
pub const GAMETYPES_SHORT: [&str; 12] = [
    "ffa", "duel", "race", "tdm", "ca", "ctf", "ob", "har", "ft", "dom", "ad", "rr",
];

/// Ruleset names, indexed by the `ruleset` field.
pub const RULESETS: [&str; 4] = ["", "classic", "turbo", "ql"];

/// Match phase as reported by `g_gameState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameState {
    Warmup,
    Countdown,
    InProgress,
    Other(String),
}

impl GameState {
    pub fn from_field(value: &str) -> Self {
        match value {
            "PRE_GAME" => GameState::Warmup,
            "COUNT_DOWN" => GameState::Countdown,
            "IN_PROGRESS" => GameState::InProgress,
            other => GameState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            GameState::Warmup => "warmup",
            GameState::Countdown => "countdown",
            GameState::InProgress => "in_progress",
            GameState::Other(raw) => raw,
        }
    }
}

/// Read facade over configstrings 0, 3, 6 and 7.
#[derive(Clone)]
pub struct Game {
    store: Arc<ConfigstringStore>,
    live: bool,
}

impl Game {
    /// Creates a facade reading through the cache.
    ///
    /// # Errors
    ///
    /// [`EntityError::NoActiveGame`] when configstring 0 is empty.
    pub fn new(store: Arc<ConfigstringStore>) -> Result<Self, EntityError> {
        Self::with_source(store, false)
    }

    /// Creates a facade reading the host's current view.
    pub fn live(store: Arc<ConfigstringStore>) -> Result<Self, EntityError> {
        Self::with_source(store, true)
    }

    fn with_source(store: Arc<ConfigstringStore>, live: bool) -> Result<Self, EntityError> {
        let game = Self { store, live };
        game.vars()?;
        Ok(game)
    }

    /// Re-reads configstring 0.
    pub fn vars(&self) -> Result<VariableMap, EntityError> {
        self.store
            .get(CS_SERVERINFO, self.live)
            .filter(|raw| !raw.is_empty())
            .map(|raw| VariableMap::parse(&raw))
            .ok_or(EntityError::NoActiveGame)
    }

    pub fn get(&self, key: &str) -> Result<String, EntityError> {
        self.vars()?
            .get(key)
            .cloned()
            .ok_or_else(|| EntityError::MissingField(key.to_string()))
    }

    fn get_int(&self, key: &str) -> Result<i64, EntityError> {
        parse_int(key, &self.get(key)?)
    }

    fn get_bool(&self, key: &str) -> Result<bool, EntityError> {
        Ok(self.get_int(key)? != 0)
    }

    fn indexed(&self, key: &str, table: &[&'static str]) -> Result<&'static str, EntityError> {
        let raw = self.get(key)?;
        usize::try_from(parse_int(key, &raw)?)
            .ok()
            .and_then(|i| table.get(i).copied())
            .ok_or_else(|| EntityError::InvalidField {
                key: key.to_string(),
                value: raw,
            })
    }

    pub fn game_type(&self) -> Result<&'static str, EntityError> {
        self.indexed("g_gametype", &GAMETYPES)
    }

    pub fn short_type(&self) -> Result<&'static str, EntityError> {
        self.indexed("g_gametype", &GAMETYPES_SHORT)
    }

    /// Full map name from configstring 3.
    pub fn map(&self) -> Result<String, EntityError> {
        self.vars()?;
        self.store
            .get(CS_MAP, self.live)
            .ok_or_else(|| EntityError::MissingField("map".to_string()))
    }

    /// Map name as listed in the server info.
    pub fn short_map(&self) -> Result<String, EntityError> {
        self.get("mapname")
    }

    pub fn red_score(&self) -> Result<i64, EntityError> {
        self.score(CS_SCORE_RED, "red_score")
    }

    pub fn blue_score(&self) -> Result<i64, EntityError> {
        self.score(CS_SCORE_BLUE, "blue_score")
    }

    fn score(&self, index: u16, key: &str) -> Result<i64, EntityError> {
        self.vars()?;
        let raw = self
            .store
            .get(index, self.live)
            .ok_or_else(|| EntityError::MissingField(key.to_string()))?;
        parse_int(key, &raw)
    }

    pub fn state(&self) -> Result<GameState, EntityError> {
        Ok(GameState::from_field(&self.get("g_gameState")?))
    }

    pub fn location(&self) -> Result<String, EntityError> {
        self.get("sv_location")
    }

    pub fn hostname(&self) -> Result<String, EntityError> {
        self.get("sv_hostname")
    }

    pub fn is_instagib(&self) -> Result<bool, EntityError> {
        self.get_bool("g_instaGib")
    }

    pub fn is_premium(&self) -> Result<bool, EntityError> {
        self.get_bool("sv_premium")
    }

    pub fn maxclients(&self) -> Result<i64, EntityError> {
        self.get_int("sv_maxclients")
    }

    pub fn ruleset(&self) -> Result<&'static str, EntityError> {
        self.indexed("ruleset", &RULESETS)
    }

    pub fn timelimit(&self) -> Result<i64, EntityError> {
        self.get_int("timelimit")
    }

    pub fn fraglimit(&self) -> Result<i64, EntityError> {
        self.get_int("fraglimit")
    }

    pub fn roundlimit(&self) -> Result<i64, EntityError> {
        self.get_int("roundlimit")
    }

    pub fn roundtimelimit(&self) -> Result<i64, EntityError> {
        self.get_int("roundtimelimit")
    }

    pub fn scorelimit(&self) -> Result<i64, EntityError> {
        self.get_int("scorelimit")
    }

    pub fn capturelimit(&self) -> Result<i64, EntityError> {
        self.get_int("capturelimit")
    }

    pub fn teamsize(&self) -> Result<i64, EntityError> {
        self.get_int("teamsize")
    }

    pub fn skill_rating(&self) -> Result<i64, EntityError> {
        self.get_int("sv_skillrating")
    }
}

impl fmt::Debug for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Game")
            .field("type", &self.short_type().ok())
            .field("map", &self.short_map().ok())
            .field("live", &self.live)
            .finish()
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.game_type(), self.map()) {
            (Ok(kind), Ok(map)) => write!(f, "{kind} on {map}"),
            _ => f.write_str("Invalid game"),
        }
    }
}

impl Serialize for Game {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Game", 3)?;
        state.serialize_field("type", &self.short_type().ok())?;
        state.serialize_field("map", &self.map().ok())?;
        state.serialize_field("state", &self.state().ok().map(|s| s.as_str().to_string()))?;
        state.end()
    }
}
