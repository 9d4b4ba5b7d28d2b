use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Presence payloads keyed by participant key.
pub type PresenceMap = HashMap<String, Vec<JsonValue>>;

/// Last-known presence of the participants on the current channel.
///
/// Never authoritative across reconnects: the connection task clears it
/// whenever a new channel is opened and rebuilds it from inbound messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceState {
    entries: PresenceMap,
}

impl PresenceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole state with a full snapshot from the server.
    pub fn sync(&mut self, state: PresenceMap) {
        self.entries = state;
        self.entries.retain(|_, metas| !metas.is_empty());
    }

    /// Apply an incremental join/leave diff.
    ///
    /// Joins are appended (duplicates ignored); leaves remove matching
    /// payloads, and a key with no payloads left is dropped.
    pub fn apply_diff(&mut self, joins: PresenceMap, leaves: PresenceMap) {
        for (key, metas) in joins {
            let entry = self.entries.entry(key).or_default();
            for meta in metas {
                if !entry.contains(&meta) {
                    entry.push(meta);
                }
            }
        }
        for (key, metas) in leaves {
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.retain(|existing| !metas.contains(existing));
                if entry.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, key: &str) -> Option<&[JsonValue]> {
        self.entries.get(key).map(|v| v.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_map(&self) -> &PresenceMap {
        &self.entries
    }
}
