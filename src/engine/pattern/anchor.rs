//! Map-key anchors.
//!
//! An anchor wraps a pattern key and changes how the surrounding subtree
//! is matched:
//!
//! - `(key)` conditional: if the anchored subtree matches, the sibling
//!   keys must match too; otherwise the map is skipped.
//! - `=(key)` existence: the key must be present and match.
//! - `^(key)` global: a mismatch skips the entire pattern.
//! - `X(key)` negation: the key must be absent.

/// A parsed anchor with the wrapped key name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Anchor<'a> {
    Condition(&'a str),
    Existence(&'a str),
    Global(&'a str),
    Negation(&'a str),
}

impl<'a> Anchor<'a> {
    /// The key name inside the anchor markers.
    pub fn key(&self) -> &'a str {
        match self {
            Anchor::Condition(key)
            | Anchor::Existence(key)
            | Anchor::Global(key)
            | Anchor::Negation(key) => key,
        }
    }
}

/// Parse a pattern map key into an anchor, if it is one.
pub fn parse(key: &str) -> Option<Anchor<'_>> {
    let inner = key.strip_suffix(')')?;
    if let Some(name) = inner.strip_prefix("=(") {
        return Some(Anchor::Existence(name));
    }
    if let Some(name) = inner.strip_prefix("^(") {
        return Some(Anchor::Global(name));
    }
    if let Some(name) = inner.strip_prefix("X(") {
        return Some(Anchor::Negation(name));
    }
    if let Some(name) = inner.strip_prefix('(') {
        return Some(Anchor::Condition(name));
    }
    None
}

/// Whether a pattern map contains any anchored key.
pub fn has_anchors(map: &serde_json::Map<String, serde_json::Value>) -> bool {
    map.keys().any(|key| parse(key).is_some())
}
