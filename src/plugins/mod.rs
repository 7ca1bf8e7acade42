pub mod decision;
pub mod motion;
pub mod race;
pub mod telemetry;
pub mod traffic;
