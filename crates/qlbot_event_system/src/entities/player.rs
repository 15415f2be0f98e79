use super::Team;
use crate::configstrings::{player_index, ConfigstringStore, MAX_CLIENTS};
use crate::error::EntityError;
use crate::utils::{clean_text, strip_color_codes};
use crate::variables::{encode, VariableMap};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Handle to a player slot.
///
/// The handle remembers the client id and the player's name at the time it was
/// created. Every accessor re-reads configstring `529 + cid` and fails with
/// [`EntityError::PlayerGone`] if the slot was emptied or taken over by
/// someone with a different name.
#[derive(Clone)]
pub struct Player {
    cid: Option<u8>,
    name: String,
    source: Source,
}

#[derive(Clone)]
enum Source {
    Store {
        store: Arc<ConfigstringStore>,
        live: bool,
    },
    /// Frozen record, used for players that already left and for the console.
    Detached(VariableMap),
}

impl Player {
    /// Creates a handle reading through the configstring cache.
    ///
    /// # Errors
    ///
    /// `InvalidClientId` for ids above 31, `PlayerGone` for an empty slot.
    pub fn new(store: Arc<ConfigstringStore>, cid: u8) -> Result<Self, EntityError> {
        Self::from_store(store, cid, false)
    }

    /// Creates a handle that always reads the host's current view of the slot.
    pub fn live(store: Arc<ConfigstringStore>, cid: u8) -> Result<Self, EntityError> {
        Self::from_store(store, cid, true)
    }

    fn from_store(store: Arc<ConfigstringStore>, cid: u8, live: bool) -> Result<Self, EntityError> {
        if u16::from(cid) >= MAX_CLIENTS {
            return Err(EntityError::InvalidClientId(i64::from(cid)));
        }

        let raw = store
            .get(player_index(cid), live)
            .filter(|raw| !raw.is_empty())
            .ok_or(EntityError::PlayerGone { cid })?;
        let vars = VariableMap::parse(&raw);
        let name = vars
            .get("n")
            .map(|n| strip_color_codes(n))
            .ok_or_else(|| EntityError::MissingField("n".to_string()))?;

        Ok(Self {
            cid: Some(cid),
            name,
            source: Source::Store { store, live },
        })
    }

    /// Creates a handle over a frozen player record.
    ///
    /// Used for disconnect notifications, where the slot is already empty by
    /// the time handlers run.
    pub fn detached(cid: u8, vars: VariableMap) -> Self {
        let name = vars
            .get("n")
            .map(|n| strip_color_codes(n))
            .unwrap_or_default();
        Self {
            cid: Some(cid),
            name,
            source: Source::Detached(vars),
        }
    }

    /// The pseudo-player representing the local console, named after the bot.
    pub fn console(bot_name: &str) -> Self {
        let raw = encode([
            ("n", bot_name),
            ("t", "0"),
            ("model", "major"),
            ("c1", "2"),
            ("c2", "2"),
            ("cn", ""),
            ("xcn", ""),
            ("c", ""),
        ]);
        Self {
            cid: None,
            name: strip_color_codes(bot_name),
            source: Source::Detached(VariableMap::parse(&raw)),
        }
    }

    /// Re-reads and validates the player's record.
    pub fn vars(&self) -> Result<VariableMap, EntityError> {
        match &self.source {
            Source::Detached(vars) => Ok(vars.clone()),
            Source::Store { store, live } => {
                let cid = self.cid.ok_or(EntityError::InvalidClientId(-1))?;
                let gone = EntityError::PlayerGone { cid };
                let raw = store
                    .get(player_index(cid), *live)
                    .filter(|raw| !raw.is_empty())
                    .ok_or_else(|| gone.clone())?;
                let vars = VariableMap::parse(&raw);
                let current = vars.get("n").map(|n| strip_color_codes(n)).unwrap_or_default();
                if !current.eq_ignore_ascii_case(&self.name) {
                    return Err(gone);
                }
                Ok(vars)
            }
        }
    }

    /// Reads a single field from the player's record.
    pub fn get(&self, key: &str) -> Result<String, EntityError> {
        self.vars()?
            .get(key)
            .cloned()
            .ok_or_else(|| EntityError::MissingField(key.to_string()))
    }

    /// Validated client id. The console has none.
    pub fn id(&self) -> Result<u8, EntityError> {
        self.vars()?;
        self.cid.ok_or(EntityError::InvalidClientId(-1))
    }

    /// Client id without validation.
    pub fn client_id(&self) -> Option<u8> {
        self.cid
    }

    /// Name captured at creation, without numeric color codes. Never fails.
    pub fn captured_name(&self) -> &str {
        &self.name
    }

    pub fn name(&self) -> Result<String, EntityError> {
        self.get("n")
    }

    /// Name with numeric color codes removed.
    pub fn clean_name(&self) -> Result<String, EntityError> {
        Ok(strip_color_codes(&self.name()?))
    }

    pub fn name_with_clantag(&self) -> Result<String, EntityError> {
        let vars = self.vars()?;
        let name = vars
            .get("n")
            .cloned()
            .ok_or_else(|| EntityError::MissingField("n".to_string()))?;
        match vars.non_empty("cn") {
            Some(tag) => Ok(format!("{tag} {name}")),
            None => Ok(name),
        }
    }

    pub fn clantag(&self) -> Result<String, EntityError> {
        self.get("cn")
    }

    /// Full clan name.
    pub fn clan(&self) -> Result<String, EntityError> {
        self.get("xcn")
    }

    pub fn team(&self) -> Result<Team, EntityError> {
        Team::parse_field(&self.get("t")?)
    }

    pub fn colors(&self) -> Result<(f32, f32), EntityError> {
        let vars = self.vars()?;
        let color = |key: &str| -> Result<f32, EntityError> {
            let value = vars
                .get(key)
                .ok_or_else(|| EntityError::MissingField(key.to_string()))?;
            value.trim().parse().map_err(|_| EntityError::InvalidField {
                key: key.to_string(),
                value: value.clone(),
            })
        };
        Ok((color("c1")?, color("c2")?))
    }

    pub fn model(&self) -> Result<String, EntityError> {
        self.get("model")
    }

    pub fn country(&self) -> Result<String, EntityError> {
        self.get("c")
    }

    /// Whether the slot still holds this player.
    pub fn is_valid(&self) -> bool {
        self.vars().is_ok()
    }

    /// Whether this handle is a frozen snapshot.
    pub fn is_detached(&self) -> bool {
        matches!(self.source, Source::Detached(_))
    }

    /// Whether the player's (color-free) name matches `name`, ignoring case and color tags.
    pub fn is_named(&self, name: &str) -> bool {
        clean_text(name).eq_ignore_ascii_case(&clean_text(&self.name))
    }
}

impl PartialEq for Player {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.source {
            Source::Store { live: true, .. } => "live",
            Source::Store { live: false, .. } => "cached",
            Source::Detached(_) => "detached",
        };
        f.debug_struct("Player")
            .field("cid", &self.cid)
            .field("name", &self.name)
            .field("source", &kind)
            .finish()
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Ok(name) => f.write_str(&name),
            Err(_) => f.write_str(&self.name),
        }
    }
}

impl Serialize for Player {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Player", 2)?;
        state.serialize_field("id", &self.cid)?;
        state.serialize_field("name", &self.name)?;
        state.end()
    }
}
