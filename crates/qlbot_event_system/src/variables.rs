//! Codec for the backslash-delimited key/value format used by configstrings.
//!
//! A configstring such as `\n\Mino\t\1\model\sarge` decodes to the map
//! `{n: Mino, t: 1, model: sarge}`. Leading separators are ignored. An odd
//! number of tokens is malformed: the complete pairs are kept and the anomaly
//! is reported to the caller.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Deref;

/// Decoded configstring variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableMap(HashMap<String, String>);

/// Result of [`decode`]: the variables plus whether the input was malformed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    pub vars: VariableMap,
    pub malformed: bool,
}

impl VariableMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `raw`, logging and discarding the malformed flag.
    pub fn parse(raw: &str) -> Self {
        let decoded = decode(raw);
        if decoded.malformed {
            tracing::error!("❌ Uneven number of keys and values: {}", raw);
        }
        decoded.vars
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Looks up `key`, treating a missing key and an empty value alike.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn into_inner(self) -> HashMap<String, String> {
        self.0
    }
}

impl Deref for VariableMap {
    type Target = HashMap<String, String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<HashMap<String, String>> for VariableMap {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VariableMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Decodes a backslash-delimited configstring.
///
/// # Arguments
///
/// * `raw` - The configstring value, e.g. `\g_gametype\4\mapname\campgrounds`
///
/// # Returns
///
/// The decoded pairs, with `malformed` set when a trailing key had no value.
pub fn decode(raw: &str) -> Decoded {
    let trimmed = raw.trim_start_matches('\\');
    if trimmed.is_empty() {
        return Decoded::default();
    }

    let tokens: Vec<&str> = trimmed.split('\\').collect();
    let vars = tokens
        .chunks_exact(2)
        .map(|pair| (pair[0], pair[1]))
        .collect();

    Decoded {
        vars,
        malformed: tokens.len() % 2 != 0,
    }
}

/// Encodes pairs back into the wire format, in the order given.
pub fn encode<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = String::new();
    for (key, value) in pairs {
        out.push('\\');
        out.push_str(key);
        out.push('\\');
        out.push_str(value);
    }
    out
}
