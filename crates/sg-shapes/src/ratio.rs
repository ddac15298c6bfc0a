//! Plausibility check of a routed leg against the straight line.

use tracing::warn;

use sg_core::{polyline_length_m, GeoPoint, Mode, StopId};

use crate::config::ShapeConfig;
use crate::error::LegError;
use crate::overrides::Overrides;

/// Straight lines shorter than this are treated as zero length.
const MIN_STRAIGHT_M: f64 = 1e-3;

/// `length(route) / length(straight)`.
///
/// A degenerate straight line yields `1.0`, so coincident stops always pass.
pub fn length_ratio(route: &[GeoPoint], straight: &[GeoPoint]) -> f64 {
    let straight_m = polyline_length_m(straight);
    if straight_m < MIN_STRAIGHT_M {
        return 1.0;
    }
    polyline_length_m(route) / straight_m
}

/// Decides whether a routed leg is too long to be believable.
///
/// The allowed ratio is the curated override for the pair if there is one,
/// otherwise the mode's same-group or default ratio.  It never drops below
/// `1.0`.
pub struct RatioValidator<'a> {
    overrides:        &'a Overrides,
    same_group_ratio: f64,
    default_ratio:    f64,
    group_prefix_len: usize,
}

impl<'a> RatioValidator<'a> {
    pub fn new(config: &ShapeConfig, mode: Mode, overrides: &'a Overrides) -> Self {
        Self {
            overrides,
            same_group_ratio: config.same_group_ratio(mode),
            default_ratio:    config.default_ratio(mode),
            group_prefix_len: config.group_prefix_len,
        }
    }

    /// The ratio allowed without any override.
    pub fn base_ratio(&self, from: &StopId, to: &StopId) -> f64 {
        if from.same_group(to, self.group_prefix_len) {
            self.same_group_ratio
        } else {
            self.default_ratio
        }
    }

    /// The ratio actually enforced for `from → to`.
    pub fn expected_ratio(&self, from: &StopId, to: &StopId) -> f64 {
        self.overrides
            .ratio(from, to)
            .unwrap_or_else(|| self.base_ratio(from, to))
            .max(1.0)
    }

    pub fn validate(
        &self,
        route:    &[GeoPoint],
        straight: &[GeoPoint],
        from:     &StopId,
        to:       &StopId,
    ) -> Result<(), LegError> {
        self.judge(length_ratio(route, straight), from, to)
    }

    /// The override for `from → to` if it loosens the base limit and the
    /// base limit would already accept `ratio`.  Tightening overrides are
    /// never reported.
    pub fn unneeded_override(&self, ratio: f64, from: &StopId, to: &StopId) -> Option<f64> {
        let base = self.base_ratio(from, to);
        self.overrides.ratio(from, to).filter(|&over| over > base && ratio <= base)
    }

    /// Accept `ratio` unless it strictly exceeds the enforced limit.
    ///
    /// Logs a warning for an [unneeded override](Self::unneeded_override).
    pub fn judge(&self, ratio: f64, from: &StopId, to: &StopId) -> Result<(), LegError> {
        if let Some(over) = self.unneeded_override(ratio, from, to) {
            let base = self.base_ratio(from, to);
            warn!(%from, %to, ratio, override_ratio = over, base, "ratio override not needed");
        }

        let expected = self.expected_ratio(from, to);
        if ratio > expected {
            Err(LegError::RouteTooLong { ratio, expected })
        } else {
            Ok(())
        }
    }
}
