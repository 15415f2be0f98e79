//! # Configstring Store
//!
//! Cache of configstring values keyed by index. Inbound `cs` notifications
//! reach the agent before the host applies them, so the cache is the only
//! place where the *new* value is visible while a line is being processed.
//! Reads that must observe the host's view (the *old* value) ask for it
//! explicitly with `prefer_live`.

use crate::host::Host;
use crate::utils::lock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Global game state (`g_gameState`, `g_gametype`, ...)
pub const CS_SERVERINFO: u16 = 0;
/// Current map name
pub const CS_MAP: u16 = 3;
/// Red team score
pub const CS_SCORE_RED: u16 = 6;
/// Blue team score
pub const CS_SCORE_BLUE: u16 = 7;
/// Active vote string
pub const CS_VOTE_STRING: u16 = 9;
/// Yes votes
pub const CS_VOTE_YES: u16 = 10;
/// No votes
pub const CS_VOTE_NO: u16 = 11;
/// Game end flag
pub const CS_GAME_END: u16 = 14;
/// First player record; client `cid` lives at `CS_PLAYERS + cid`
pub const CS_PLAYERS: u16 = 529;
/// Round state (countdown / start)
pub const CS_ROUND: u16 = 661;
/// Number of client slots
pub const MAX_CLIENTS: u16 = 32;

/// Returns the configstring index of a player record.
pub fn player_index(cid: u8) -> u16 {
    CS_PLAYERS + u16::from(cid)
}

/// Returns the client id stored at `index`, if it is a player record.
pub fn client_id_of(index: u16) -> Option<u8> {
    if (CS_PLAYERS..CS_PLAYERS + MAX_CLIENTS).contains(&index) {
        u8::try_from(index - CS_PLAYERS).ok()
    } else {
        None
    }
}

/// Thread-safe configstring cache backed by a [`Host`].
pub struct ConfigstringStore {
    cache: Mutex<HashMap<u16, String>>,
    host: Arc<dyn Host>,
}

impl ConfigstringStore {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            host,
        }
    }

    /// Reads a configstring.
    ///
    /// # Arguments
    ///
    /// * `index` - Configstring index
    /// * `prefer_live` - When `true`, always ask the host and leave the cache
    ///   untouched. When `false`, serve from the cache and fall back to the
    ///   host on a miss, caching the result.
    ///
    /// # Returns
    ///
    /// The value, or `None` if neither the cache nor the host knows the index.
    pub fn get(&self, index: u16, prefer_live: bool) -> Option<String> {
        if prefer_live {
            return self.host.live_configstring(index);
        }

        let mut cache = lock(&self.cache);
        if let Some(value) = cache.get(&index) {
            return Some(value.clone());
        }

        let live = self.host.live_configstring(index)?;
        trace!("Cached configstring {} from host", index);
        cache.insert(index, live.clone());
        Some(live)
    }

    /// Convenience for `get(index, false)`.
    pub fn cached(&self, index: u16) -> Option<String> {
        self.get(index, false)
    }

    /// Convenience for `get(index, true)`.
    pub fn live(&self, index: u16) -> Option<String> {
        self.get(index, true)
    }

    /// Overwrites the cached value of `index`.
    pub fn set(&self, index: u16, value: impl Into<String>) {
        lock(&self.cache).insert(index, value.into());
    }

    /// Forgets every cached value; the next read of each index goes to the host.
    pub fn clear(&self) {
        lock(&self.cache).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.cache).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.cache).is_empty()
    }

    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }
}

impl std::fmt::Debug for ConfigstringStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigstringStore")
            .field("cached", &self.len())
            .finish()
    }
}
