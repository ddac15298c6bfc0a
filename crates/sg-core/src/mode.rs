//! Transport mode enum.
//!
//! A mode selects the routing graph, the spatial index, and the match cache
//! used for a shape.  Every mode has exactly one of each per run.

use std::str::FromStr;

use crate::CoreError;

/// The kind of vehicle a shape is generated for.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Mode {
    /// Buses route over the street network.
    Bus,
    /// Trams route over tram and light-rail tracks.
    Tram,
    /// Trains route over the heavy-rail network.
    Train,
}

impl Mode {
    /// All modes, in table order.
    pub const ALL: [Mode; 3] = [Mode::Bus, Mode::Tram, Mode::Train];

    /// Dense index for per-mode tables.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Human-readable label, used in cache blob names and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Bus   => "bus",
            Mode::Tram  => "tram",
            Mode::Train => "train",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bus"   => Ok(Mode::Bus),
            "tram"  => Ok(Mode::Tram),
            "train" | "rail" => Ok(Mode::Train),
            other   => Err(CoreError::UnknownMode(other.to_owned())),
        }
    }
}
