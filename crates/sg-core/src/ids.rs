//! Identifier types.
//!
//! Graph ids are dense integer wrappers: `NodeId(n)` indexes directly into
//! the node arrays of a `RoadNetwork`.  Transit-side ids (`StopId`,
//! `ShapeId`) are opaque strings owned by the schedule data.

use std::fmt;

/// Generate a typed ID wrapper around a primitive integer.
macro_rules! typed_id {
    ($(#[$attr:meta])* $vis:vis struct $name:ident($inner:ty);) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        $vis struct $name(pub $inner);

        impl $name {
            /// Sentinel meaning "no valid ID".
            pub const INVALID: $name = $name(<$inner>::MAX);

            /// Cast to `usize` for direct use as a `Vec` index.
            #[inline(always)]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl Default for $name {
            #[inline(always)]
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl TryFrom<usize> for $name {
            type Error = std::num::TryFromIntError;
            fn try_from(n: usize) -> Result<$name, Self::Error> {
                <$inner>::try_from(n).map($name)
            }
        }
    };
}

typed_id! {
    /// Index of a routing-graph node.
    pub struct NodeId(u32);
}

typed_id! {
    /// Index of a directed routing-graph edge.
    pub struct EdgeId(u32);
}

// ── StopId ────────────────────────────────────────────────────────────────────

/// Opaque identifier of a transit stop, stable for the whole run.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct StopId(String);

impl StopId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The stop-group key: the first `prefix_len` characters.
    ///
    /// Ids shorter than the prefix are their own group.
    pub fn group(&self, prefix_len: usize) -> &str {
        match self.0.char_indices().nth(prefix_len) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }

    /// `true` if both stops share the same `prefix_len`-character group.
    pub fn same_group(&self, other: &StopId, prefix_len: usize) -> bool {
        self.group(prefix_len) == other.group(prefix_len)
    }
}

impl fmt::Display for StopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StopId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for StopId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for StopId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ── ShapeId ───────────────────────────────────────────────────────────────────

/// Key of a generated shape: `route_id + "/" + pattern_id`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ShapeId(String);

impl ShapeId {
    pub fn new(route_id: &str, pattern_id: &str) -> Self {
        Self(format!("{route_id}/{pattern_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
