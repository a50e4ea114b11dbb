//! Core types for the survey kernel.

pub mod leg;
pub mod shot;
pub mod station;

pub use leg::{normalize_azimuth, Leg, LegId};
pub use shot::{Role, ShotRecord, StationReference, TeamEntry, Trip};
pub use station::{Direction, Station, StationId};
