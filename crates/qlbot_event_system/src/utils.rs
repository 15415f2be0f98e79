//! Small helpers shared by the rest of the crate.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

static COLOR_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\^[^\^]").expect("valid regex"));
static COLOR_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\^[0-9]").expect("valid regex"));

/// Removes every `^x` color tag from `text`.
pub fn clean_text(text: &str) -> String {
    COLOR_TAG.replace_all(text, "").into_owned()
}

/// Removes numeric color codes (`^0`..`^9`) only, the way player records are
/// compared.
pub fn strip_color_codes(text: &str) -> String {
    COLOR_DIGIT.replace_all(text, "").into_owned()
}

/// Cleans a player name typed by a user or printed by the server.
///
/// # Arguments
///
/// * `name` - Possibly colored name, possibly prefixed by a clan tag
/// * `keep_clan` - Whether to keep a leading clan tag
///
/// # Returns
///
/// The name without color tags, and without the clan tag unless asked.
pub fn clean_name(name: &str, keep_clan: bool) -> String {
    let clean = clean_text(name);
    let mut split = clean.split_whitespace();
    match (split.next(), split.next()) {
        (Some(_), Some(second)) if !keep_clan => second.to_string(),
        _ => clean,
    }
}

/// Locks a mutex, recovering the data if a handler panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
