//! Blend weights over the four intent sources.
//!
//! Weights are a continuous function of danger, opponent distance and
//! traffic density, so an agent drifting across a band edge never flips
//! between two advisors' opposite suggestions in one tick.

use crate::components::SpatialState;
use crate::config::BlendConfig;

use super::types::{IntentSource, ObstacleSet, Urgency};

/// Diagnostic label for the opponent-distance band a gap falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeBand {
    Close,
    Medium,
    Long,
    Far,
}

impl RangeBand {
    pub fn classify(gap: f32, config: &BlendConfig) -> Self {
        let gap = gap.abs();
        if gap < config.close_range {
            RangeBand::Close
        } else if gap < config.medium_range {
            RangeBand::Medium
        } else if gap < config.long_range {
            RangeBand::Long
        } else {
            RangeBand::Far
        }
    }
}

/// (tactical, search) shares of the non-safety weight at each band edge.
/// Path-following takes the remainder.
const SHARES_AT_CONTACT: (f32, f32) = (0.60, 0.15);
const SHARES_AT_CLOSE: (f32, f32) = (0.50, 0.25);
const SHARES_AT_MEDIUM: (f32, f32) = (0.30, 0.45);
const SHARES_AT_LONG: (f32, f32) = (0.15, 0.60);

fn lerp(a: (f32, f32), b: (f32, f32), t: f32) -> (f32, f32) {
    (a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t)
}

fn range_shares(gap: f32, config: &BlendConfig) -> (f32, f32) {
    let anchors = [
        (0.0, SHARES_AT_CONTACT),
        (config.close_range, SHARES_AT_CLOSE),
        (config.medium_range, SHARES_AT_MEDIUM),
        (config.long_range, SHARES_AT_LONG),
    ];
    let gap = gap.abs();
    for pair in anchors.windows(2) {
        let (lo, lo_shares) = pair[0];
        let (hi, hi_shares) = pair[1];
        if gap < hi {
            return lerp(lo_shares, hi_shares, (gap - lo) / (hi - lo));
        }
    }
    SHARES_AT_LONG
}

/// Cars ahead of `me` inside the density window, per lane, as a `0.0..=1.0` level.
pub fn traffic_density(
    me: &SpatialState,
    obstacles: &ObstacleSet,
    lane_count: usize,
    config: &BlendConfig,
) -> f32 {
    let ahead = obstacles
        .traffic
        .iter()
        .filter(|car| {
            let gap = car.distance - me.distance;
            gap >= 0.0 && gap <= config.density_window
        })
        .count() as f32;
    let per_lane = ahead / lane_count.max(1) as f32;
    (per_lane / config.density_saturation).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlendWeights {
    pub safety: f32,
    pub tactical: f32,
    pub search: f32,
    pub path_following: f32,
}

impl BlendWeights {
    /// Situational weights. Safety grows with urgency and density; the rest
    /// shifts from the tactical advisor up close to the search planner far away.
    pub fn compute(urgency: Urgency, gap: f32, density: f32, config: &BlendConfig) -> Self {
        let safety = (config.safety_floor
            + config.safety_urgency_gain * urgency.level()
            + config.safety_density_gain * density.clamp(0.0, 1.0))
        .min(config.safety_ceiling);
        let rest = 1.0 - safety;
        let (tactical, search) = range_shares(gap, config);
        Self {
            safety,
            tactical: rest * tactical,
            search: rest * search,
            path_following: rest * (1.0 - tactical - search),
        }
    }

    pub fn total(&self) -> f32 {
        self.safety + self.tactical + self.search + self.path_following
    }

    pub fn weight(&self, source: IntentSource) -> f32 {
        match source {
            IntentSource::Safety => self.safety,
            IntentSource::Tactical => self.tactical,
            IntentSource::Search => self.search,
            IntentSource::PathFollowing => self.path_following,
            IntentSource::Fallback => 0.0,
        }
    }

    fn weight_mut(&mut self, source: IntentSource) -> Option<&mut f32> {
        match source {
            IntentSource::Safety => Some(&mut self.safety),
            IntentSource::Tactical => Some(&mut self.tactical),
            IntentSource::Search => Some(&mut self.search),
            IntentSource::PathFollowing => Some(&mut self.path_following),
            IntentSource::Fallback => None,
        }
    }

    /// Rescale to sum to one. All-zero weights stay zero.
    pub fn normalized(self) -> Self {
        let total = self.total();
        if total <= f32::EPSILON {
            return Self::default();
        }
        Self {
            safety: self.safety / total,
            tactical: self.tactical / total,
            search: self.search / total,
            path_following: self.path_following / total,
        }
    }

    /// Drop a source and hand its weight to the others in proportion.
    pub fn without(self, source: IntentSource) -> Self {
        self.scaled(source, 0.0)
    }

    pub fn scaled(mut self, source: IntentSource, factor: f32) -> Self {
        if let Some(w) = self.weight_mut(source) {
            *w *= factor.max(0.0);
        }
        self.normalized()
    }

    pub fn is_empty(&self) -> bool {
        self.total() <= f32::EPSILON
    }

    /// Source carrying the largest weight; earlier sources win ties.
    pub fn dominant(&self) -> Option<IntentSource> {
        [
            IntentSource::Safety,
            IntentSource::Tactical,
            IntentSource::Search,
            IntentSource::PathFollowing,
        ]
        .into_iter()
        .filter(|s| self.weight(*s) > 0.0)
        .fold(None, |best: Option<IntentSource>, s| match best {
            Some(b) if self.weight(b) >= self.weight(s) => Some(b),
            _ => Some(s),
        })
    }
}
