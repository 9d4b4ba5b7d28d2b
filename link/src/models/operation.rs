use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Kind of row-level change carried by a change event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// New row inserted
    Insert,

    /// Existing row updated
    Update,

    /// Row deleted
    Delete,
}

impl OperationKind {
    /// All operation kinds, in wire order.
    pub const ALL: [OperationKind; 3] =
        [OperationKind::Insert, OperationKind::Update, OperationKind::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of operation kinds a subscription wants to receive.
///
/// Serialized as `"*"` when every kind is selected, otherwise as a list
/// such as `["insert", "delete"]`.
///
/// # Example
///
/// ```rust
/// use feed_link::{EventMask, OperationKind};
///
/// let mask = EventMask::only(&[OperationKind::Insert]);
/// assert!(mask.contains(OperationKind::Insert));
/// assert!(!mask.contains(OperationKind::Update));
/// assert!(EventMask::all().is_wildcard());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventMask {
    insert: bool,
    update: bool,
    delete: bool,
}

impl EventMask {
    /// Wildcard mask (every operation kind).
    pub const fn all() -> Self {
        Self {
            insert: true,
            update: true,
            delete: true,
        }
    }

    /// Mask with no kinds selected.
    pub const fn none() -> Self {
        Self {
            insert: false,
            update: false,
            delete: false,
        }
    }

    /// Mask selecting exactly the given kinds.
    pub fn only(kinds: &[OperationKind]) -> Self {
        kinds.iter().fold(Self::none(), |mask, kind| mask.with(*kind))
    }

    /// Return a copy of this mask with `kind` added.
    pub fn with(mut self, kind: OperationKind) -> Self {
        match kind {
            OperationKind::Insert => self.insert = true,
            OperationKind::Update => self.update = true,
            OperationKind::Delete => self.delete = true,
        }
        self
    }

    pub fn contains(&self, kind: OperationKind) -> bool {
        match kind {
            OperationKind::Insert => self.insert,
            OperationKind::Update => self.update,
            OperationKind::Delete => self.delete,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.insert && self.update && self.delete
    }

    pub fn is_empty(&self) -> bool {
        !(self.insert || self.update || self.delete)
    }

    /// Selected kinds, in wire order.
    pub fn kinds(&self) -> Vec<OperationKind> {
        OperationKind::ALL
            .iter()
            .copied()
            .filter(|kind| self.contains(*kind))
            .collect()
    }
}

impl Default for EventMask {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_wildcard() {
            return f.write_str("*");
        }
        let kinds: Vec<&str> = self.kinds().iter().map(|k| k.as_str()).collect();
        f.write_str(&kinds.join(","))
    }
}

impl Serialize for EventMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_wildcard() {
            serializer.serialize_str("*")
        } else {
            self.kinds().serialize(serializer)
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EventMaskRepr {
    Wildcard(String),
    Kinds(Vec<OperationKind>),
}

impl<'de> Deserialize<'de> for EventMask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match EventMaskRepr::deserialize(deserializer)? {
            EventMaskRepr::Wildcard(s) if s == "*" => Ok(EventMask::all()),
            EventMaskRepr::Wildcard(other) => Err(serde::de::Error::custom(format!(
                "invalid event mask '{}': expected \"*\" or a list of operation kinds",
                other
            ))),
            EventMaskRepr::Kinds(kinds) => Ok(EventMask::only(&kinds)),
        }
    }
}
