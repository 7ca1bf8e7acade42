//! Race events triggered by the race systems and observed by effects and stats.

use bevy::prelude::*;

use crate::components::{PowerUpKind, Role};
use crate::resources::RaceOutcome;

#[derive(Event, Debug, Clone, Copy)]
pub struct PowerUpCollected {
    pub collector: Entity,
    pub role: Role,
    pub kind: PowerUpKind,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct VehicleCrashed {
    pub vehicle: Entity,
    pub role: Role,
    /// Whether a shield absorbed the crash.
    pub shielded: bool,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct RaceFinished {
    pub outcome: RaceOutcome,
}
