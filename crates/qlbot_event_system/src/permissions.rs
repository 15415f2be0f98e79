//! Permission levels for chat commands.
//!
//! Levels are looked up by the player's clean name. Level 0 commands are open
//! to everyone and the bot itself always has [`BOT_PERMISSION_LEVEL`].

use crate::entities::Player;
use dashmap::DashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Level granted to the bot's own name.
pub const BOT_PERMISSION_LEVEL: u32 = 999;

/// Source of stored permission levels.
pub trait PermissionStore: Send + Sync + Debug {
    /// Stored level for a clean, lower-cased player name.
    fn permission_level(&self, name: &str) -> Option<u32>;
}

/// Permission levels kept in memory, keyed case-insensitively.
#[derive(Debug, Default)]
pub struct MemoryPermissions {
    levels: DashMap<String, u32>,
}

impl MemoryPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_level(&self, name: &str, level: u32) {
        self.levels.insert(name.to_lowercase(), level);
    }

    pub fn remove(&self, name: &str) -> Option<u32> {
        self.levels.remove(&name.to_lowercase()).map(|(_, level)| level)
    }
}

impl<S: AsRef<str>> FromIterator<(S, u32)> for MemoryPermissions {
    fn from_iter<I: IntoIterator<Item = (S, u32)>>(iter: I) -> Self {
        let permissions = Self::new();
        for (name, level) in iter {
            permissions.set_level(name.as_ref(), level);
        }
        permissions
    }
}

impl PermissionStore for MemoryPermissions {
    fn permission_level(&self, name: &str) -> Option<u32> {
        self.levels.get(&name.to_lowercase()).map(|level| *level)
    }
}

/// Permission checks bound to the bot's identity.
#[derive(Debug, Clone)]
pub struct Permissions {
    bot_name: String,
    store: Arc<dyn PermissionStore>,
}

impl Permissions {
    pub fn new(bot_name: &str, store: Arc<dyn PermissionStore>) -> Self {
        Self {
            bot_name: bot_name.to_lowercase(),
            store,
        }
    }

    /// Effective level of a player, by clean name.
    pub fn level_of_name(&self, name: &str) -> u32 {
        let clean = crate::utils::strip_color_codes(name).to_lowercase();
        if clean == self.bot_name {
            return BOT_PERMISSION_LEVEL;
        }
        self.store.permission_level(&clean).unwrap_or(0)
    }

    pub fn level_of(&self, player: &Player) -> u32 {
        self.level_of_name(player.captured_name())
    }

    /// Whether `player` may run something that needs `required`.
    pub fn has_permission(&self, player: &Player, required: u32) -> bool {
        required == 0 || self.level_of(player) >= required
    }
}
