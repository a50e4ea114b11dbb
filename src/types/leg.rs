//! Leg types for the survey tree.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::station::StationId;

/// Normalize an angle in degrees onto the circular azimuth domain `[0, 360)`.
pub fn normalize_azimuth(angle: f64) -> f64 {
    angle.rem_euclid(360.0)
}

/// Unique identifier for a leg held in a survey's arena.
///
/// Allocated sequentially by the owning [`Survey`](crate::Survey), so
/// identifiers are chronological and identical across replays of the same
/// input. A replaced leg always receives a fresh identifier; the old one is
/// retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LegId(u64);

impl LegId {
    /// Create a LegId from a raw arena index.
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw arena index.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "leg#{}", self.0)
    }
}

/// One measured edge of the survey tree.
///
/// A leg is an immutable value once constructed: edits replace the whole leg
/// rather than mutating it in place, so entries in the flat leg record stay
/// valid snapshots regardless of later changes.
///
/// A leg with a destination station is "connected" and extends the tree; a
/// leg without one is a "splay" (a one-off measurement to a point of
/// interest). The `promoted_from` shots are the raw repeats that were
/// averaged into this leg; `backsight_promoted_from` holds raw shots taken
/// in the opposite direction that confirm it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    distance: f64,
    azimuth: f64,
    inclination: f64,
    destination: Option<StationId>,
    was_shot_backwards: bool,
    promoted_from: Vec<Leg>,
    backsight_promoted_from: Vec<Leg>,
}

impl Leg {
    /// Create a splay: a bare measurement with no destination.
    ///
    /// Distance is clamped to be non-negative and the azimuth is normalized
    /// onto `[0, 360)`; inclination is stored as given.
    pub fn splay(distance: f64, azimuth: f64, inclination: f64) -> Self {
        Self {
            distance: distance.max(0.0),
            azimuth: normalize_azimuth(azimuth),
            inclination,
            destination: None,
            was_shot_backwards: false,
            promoted_from: Vec::new(),
            backsight_promoted_from: Vec::new(),
        }
    }

    /// Create a connected leg to an existing station, without provenance.
    pub fn full(distance: f64, azimuth: f64, inclination: f64, destination: StationId) -> Self {
        let mut leg = Self::splay(distance, azimuth, inclination);
        leg.destination = Some(destination);
        leg
    }

    /// Mark this leg as having been shot in the reverse direction.
    ///
    /// The stored geometry is unchanged; only the flag flips. Used when a
    /// shot has already been converted to the forward convention.
    pub fn shot_backwards(mut self) -> Self {
        self.was_shot_backwards = true;
        self
    }

    /// Distance in metres (always ≥ 0).
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Azimuth in degrees, in `[0, 360)`.
    pub fn azimuth(&self) -> f64 {
        self.azimuth
    }

    /// Inclination in degrees (nominally `[-90, 90]`, not strictly enforced).
    pub fn inclination(&self) -> f64 {
        self.inclination
    }

    /// Destination station, if this leg is connected.
    pub fn destination(&self) -> Option<StationId> {
        self.destination
    }

    /// Whether this leg extends the tree to a destination station.
    pub fn has_destination(&self) -> bool {
        self.destination.is_some()
    }

    /// Whether the stored geometry is the reverse of how the leg was
    /// physically measured.
    pub fn was_shot_backwards(&self) -> bool {
        self.was_shot_backwards
    }

    /// The raw shots this leg was averaged from (empty unless promoted).
    pub fn promoted_from(&self) -> &[Leg] {
        &self.promoted_from
    }

    /// Raw shots recorded in the opposite direction.
    pub fn backsight_promoted_from(&self) -> &[Leg] {
        &self.backsight_promoted_from
    }

    /// Whether this leg was produced by fusing repeat shots.
    pub fn was_promoted(&self) -> bool {
        !self.promoted_from.is_empty()
    }

    /// Whether any backsight shots have been recorded against this leg.
    pub fn has_backsight_shots(&self) -> bool {
        !self.backsight_promoted_from.is_empty()
    }

    /// Upgrade to a connected leg, keeping this leg's measurements and
    /// backward flag but attaching a destination.
    pub fn to_full_leg(&self, destination: StationId) -> Leg {
        let mut leg = self.clone();
        leg.destination = Some(destination);
        leg
    }

    /// Upgrade to a connected leg carrying provenance.
    ///
    /// `promoted_from` are the raw shots averaged into this leg;
    /// `backsight_promoted_from` the raw opposite-direction shots.
    pub fn upgrade_to_connected(
        &self,
        destination: StationId,
        promoted_from: Vec<Leg>,
        backsight_promoted_from: Vec<Leg>,
    ) -> Leg {
        let mut leg = self.clone();
        leg.destination = Some(destination);
        leg.promoted_from = promoted_from;
        leg.backsight_promoted_from = backsight_promoted_from;
        leg
    }

    /// Downgrade to a splay: the measurements and backward flag survive, the
    /// destination and all provenance are dropped.
    pub fn to_splay(&self) -> Leg {
        Leg {
            distance: self.distance,
            azimuth: self.azimuth,
            inclination: self.inclination,
            destination: None,
            was_shot_backwards: self.was_shot_backwards,
            promoted_from: Vec::new(),
            backsight_promoted_from: Vec::new(),
        }
    }

    /// The same physical leg with its stored direction flipped.
    ///
    /// Negates the inclination, rotates the azimuth 180°, toggles the
    /// backward flag, and swaps the two provenance arrays (the foresight
    /// shots of the reversed leg are the backsight shots of the original).
    /// The destination is kept: the leg still connects the same stations.
    pub fn reverse(&self) -> Leg {
        Leg {
            distance: self.distance,
            azimuth: normalize_azimuth(self.azimuth + 180.0),
            inclination: -self.inclination,
            destination: self.destination,
            was_shot_backwards: !self.was_shot_backwards,
            promoted_from: self.backsight_promoted_from.clone(),
            backsight_promoted_from: self.promoted_from.clone(),
        }
    }

    /// The mirror measurement of this leg, as a bare splay.
    ///
    /// Used to compare a candidate backsight against a foresight, or to fold
    /// a backsight into a foresight average.
    pub fn as_backsight(&self) -> Leg {
        Leg::splay(
            self.distance,
            normalize_azimuth(self.azimuth + 180.0),
            -self.inclination,
        )
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.has_destination() { "leg" } else { "splay" };
        write!(
            f,
            "{} {:.2}m az {:.1}° incl {:.1}°",
            kind, self.distance, self.azimuth, self.inclination
        )?;
        if self.was_shot_backwards {
            write!(f, " (backwards)")?;
        }
        Ok(())
    }
}
