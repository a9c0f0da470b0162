//! Identity types for the data link
//!
//! Link ids are opaque strings assigned by whichever application created the
//! character. Entity ids are local handles into the host scene.

use std::fmt;

/// Actor link id - stable across messages within one session
#[derive(Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct LinkId(pub String);

impl LinkId {
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        LinkId(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for LinkId {
    fn from(s: &str) -> Self {
        LinkId(s.to_string())
    }
}

impl From<String> for LinkId {
    fn from(s: String) -> Self {
        LinkId(s)
    }
}

impl AsRef<str> for LinkId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Link({})", self.0)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to a local scene entity (character rig, prop)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntityId(pub u64);

impl EntityId {
    pub const ZERO: EntityId = EntityId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        EntityId(id)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({:08x})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}
