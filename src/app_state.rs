use bevy::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, States)]
pub enum RaceState {
    /// Track populated, agents on the grid.
    #[default]
    Staging,
    Racing,
    Finished,
}
