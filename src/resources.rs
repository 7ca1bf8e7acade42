use std::collections::HashMap;

use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::ai::IntentSource;
use crate::components::Role;

/// Seeded generator for traffic and power-up placement.
#[derive(Resource, Debug)]
pub struct RaceRng(pub StdRng);

impl RaceRng {
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

/// Fixed ticks elapsed since the race started.
#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RaceClock(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RaceOutcome {
    /// The pursuer closed within the capture threshold.
    Captured,
    /// The evader reached the finish distance.
    Escaped,
    TimeUp,
}

impl RaceOutcome {
    pub fn winner(self) -> Option<Role> {
        match self {
            RaceOutcome::Captured => Some(Role::Pursuer),
            RaceOutcome::Escaped => Some(Role::Evader),
            RaceOutcome::TimeUp => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Race stats
// ---------------------------------------------------------------------------

#[derive(Resource, Debug, Default)]
pub struct RaceStats {
    pub ticks: u64,
    pub pickups: HashMap<Role, u32>,
    pub crashes: HashMap<Role, u32>,
    pub shielded_crashes: u32,
    pub no_path_ticks: HashMap<Role, u32>,
    pub safety_overrides: HashMap<Role, u32>,
    pub dominant_sources: HashMap<(Role, IntentSource), u32>,
    pub outcome: Option<RaceOutcome>,
}

impl RaceStats {
    pub fn count_source(&mut self, role: Role, source: IntentSource) {
        *self.dominant_sources.entry((role, source)).or_default() += 1;
    }

    pub fn summary(&self) -> String {
        let get = |map: &HashMap<Role, u32>, role| map.get(&role).copied().unwrap_or(0);
        let mut sources: Vec<String> = self
            .dominant_sources
            .iter()
            .map(|((role, source), n)| format!("{role:?}/{source:?}: {n}"))
            .collect();
        sources.sort();
        format!(
            "outcome={:?} ticks={} pickups={}/{} crashes={}/{} (shielded {}) no_path={}/{} overrides={}/{} sources=[{}]",
            self.outcome,
            self.ticks,
            get(&self.pickups, Role::Pursuer),
            get(&self.pickups, Role::Evader),
            get(&self.crashes, Role::Pursuer),
            get(&self.crashes, Role::Evader),
            self.shielded_crashes,
            get(&self.no_path_ticks, Role::Pursuer),
            get(&self.no_path_ticks, Role::Evader),
            get(&self.safety_overrides, Role::Pursuer),
            get(&self.safety_overrides, Role::Evader),
            sources.join(", "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = RaceRng::seeded(42);
        let mut b = RaceRng::seeded(42);
        let xs: Vec<u32> = (0..8).map(|_| a.0.gen_range(0..1000)).collect();
        let ys: Vec<u32> = (0..8).map(|_| b.0.gen_range(0..1000)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn winners() {
        assert_eq!(RaceOutcome::Captured.winner(), Some(Role::Pursuer));
        assert_eq!(RaceOutcome::Escaped.winner(), Some(Role::Evader));
        assert_eq!(RaceOutcome::TimeUp.winner(), None);
    }

    #[test]
    fn summary_lists_sources_in_order() {
        let mut stats = RaceStats::default();
        stats.count_source(Role::Evader, IntentSource::Search);
        stats.count_source(Role::Pursuer, IntentSource::Tactical);
        stats.count_source(Role::Pursuer, IntentSource::Tactical);
        let s = stats.summary();
        assert!(s.contains("sources=[Evader/Search: 1, Pursuer/Tactical: 2]"));
        assert!(s.contains("ticks=0"));
    }
}
