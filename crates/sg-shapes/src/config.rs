//! Shape generation configuration.

use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;

use serde::Deserialize;

use sg_core::Mode;

use crate::ShapeResult;

/// Tunables for one generation run.
///
/// Every field has a default, so a JSON config only lists what it changes:
///
/// ```
/// use sg_shapes::ShapeConfig;
///
/// let cfg = ShapeConfig::from_json_reader(r#"{ "search_timeout_ms": 250 }"#.as_bytes()).unwrap();
/// assert_eq!(cfg.search_timeout_ms, 250);
/// assert_eq!(cfg.default_ratio, 3.5);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ShapeConfig {
    /// KD-tree leaf size.
    pub leaf_size: usize,

    /// Wall-clock bound for a single path search.  A via leg gets this
    /// budget for each of its two halves.
    pub search_timeout_ms: u64,

    /// Allowed route/straight ratio when both stops share a stop group.
    pub same_group_ratio: f64,

    /// Allowed route/straight ratio between different stop groups.
    pub default_ratio: f64,

    /// Number of leading characters of a stop id forming its group.
    pub group_prefix_len: usize,

    /// RDP tolerance in degrees.  `None` keeps every routed point.
    pub simplify_epsilon: Option<f64>,

    /// A stop farther than this from its nearest graph node is unmatched.
    /// `None` always accepts the nearest node.
    pub max_snap_distance_m: Option<f64>,

    /// Maximum age of cached graph extracts and persisted match tables.
    pub cache_ttl_secs: u64,

    /// Limits that differ per mode, e.g. `{ "tram": { "default_ratio": 2.5 } }`.
    /// Anything a mode leaves out falls back to the fields above.
    pub modes: BTreeMap<Mode, ModeThresholds>,
}

/// Per-mode replacements for the global search and ratio limits.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModeThresholds {
    pub search_timeout_ms: Option<u64>,
    pub same_group_ratio:  Option<f64>,
    pub default_ratio:     Option<f64>,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            leaf_size:           sg_spatial::kdtree::DEFAULT_LEAF_SIZE,
            search_timeout_ms:   5_000,
            same_group_ratio:    7.0,
            default_ratio:       3.5,
            group_prefix_len:    4,
            simplify_epsilon:    None,
            max_snap_distance_m: None,
            cache_ttl_secs:      24 * 3_600,
            modes:               BTreeMap::new(),
        }
    }
}

impl ShapeConfig {
    /// Parse a JSON document; absent fields keep their defaults.
    pub fn from_json_reader<R: Read>(reader: R) -> ShapeResult<Self> {
        let cfg: ShapeConfig = serde_json::from_reader(reader)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Set the limits for one mode, replacing any it had.
    pub fn with_mode(mut self, mode: Mode, thresholds: ModeThresholds) -> Self {
        self.modes.insert(mode, thresholds);
        self
    }

    pub fn search_timeout(&self, mode: Mode) -> Duration {
        let ms = self.modes.get(&mode).and_then(|t| t.search_timeout_ms);
        Duration::from_millis(ms.unwrap_or(self.search_timeout_ms))
    }

    pub fn same_group_ratio(&self, mode: Mode) -> f64 {
        self.modes.get(&mode).and_then(|t| t.same_group_ratio).unwrap_or(self.same_group_ratio)
    }

    pub fn default_ratio(&self, mode: Mode) -> f64 {
        self.modes.get(&mode).and_then(|t| t.default_ratio).unwrap_or(self.default_ratio)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Reject values that would make every leg fail or the index unusable.
    pub fn validate(&self) -> ShapeResult<()> {
        use crate::ShapeError::Config;

        if self.leaf_size == 0 {
            return Err(Config("leaf_size must be at least 1".into()));
        }
        for mode in Mode::ALL {
            if !(self.same_group_ratio(mode) >= 1.0 && self.default_ratio(mode) >= 1.0) {
                return Err(Config(format!("{mode}: expected ratios must be at least 1.0")));
            }
        }
        if matches!(self.simplify_epsilon, Some(e) if !(e >= 0.0)) {
            return Err(Config("simplify_epsilon must be non-negative".into()));
        }
        Ok(())
    }
}
