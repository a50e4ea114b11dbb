//! The normalized parser-to-core contract: shot records and trip metadata.
//!
//! Every format-specific parser (instrument dump, text interchange dialect)
//! reduces its input to these types before handing over to the kernel. The
//! kernel never sees the concrete syntax; all values crossing this boundary
//! are plain floats in metres and degrees.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::leg::Leg;

/// A single normalized measurement as it came off the instrument.
///
/// `from`/`to` are station names; an absent `to` marks a splay, an absent
/// `from` a degenerate record that reconciliation skips. Which endpoint
/// already exists in the tree decides whether the record is a foresight, a
/// backsight, or a loop closure — see
/// [`BatchReconciler`](crate::BatchReconciler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotRecord {
    /// Originating station name.
    pub from: Option<String>,
    /// Destination station name; `None` for a splay.
    pub to: Option<String>,
    /// Distance in metres.
    pub distance: f64,
    /// Azimuth in degrees, `[0, 360)`.
    pub azimuth: f64,
    /// Inclination in degrees.
    pub inclination: f64,
    /// Free-text comment; ends up on the station the record creates.
    pub comment: Option<String>,
    /// Instrument display was flipped for this shot. Stations created from
    /// a flipped shot are tagged with the left extended-elevation direction.
    pub flipped: bool,
    /// Index into the trip list the record came with.
    pub trip_index: Option<usize>,
}

impl ShotRecord {
    /// Create a station-to-station record.
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        distance: f64,
        azimuth: f64,
        inclination: f64,
    ) -> Self {
        Self {
            from: Some(from.into()),
            to: Some(to.into()),
            distance,
            azimuth,
            inclination,
            comment: None,
            flipped: false,
            trip_index: None,
        }
    }

    /// Create a splay record (no destination).
    pub fn splay(
        from: impl Into<String>,
        distance: f64,
        azimuth: f64,
        inclination: f64,
    ) -> Self {
        Self {
            from: Some(from.into()),
            to: None,
            distance,
            azimuth,
            inclination,
            comment: None,
            flipped: false,
            trip_index: None,
        }
    }

    /// Attach a comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Set the flipped-display flag.
    pub fn with_flipped(mut self, flipped: bool) -> Self {
        self.flipped = flipped;
        self
    }

    /// Set the trip index.
    pub fn with_trip_index(mut self, trip_index: usize) -> Self {
        self.trip_index = Some(trip_index);
        self
    }

    /// Whether this record is a splay (no destination name).
    pub fn is_splay(&self) -> bool {
        self.to.is_none()
    }

    /// The raw measurement as a splay [`Leg`] value.
    pub fn to_splay_leg(&self) -> Leg {
        Leg::splay(self.distance, self.azimuth, self.inclination)
    }
}

impl fmt::Display for ShotRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}→{} {:.2}m az {:.1}° incl {:.1}°",
            self.from.as_deref().unwrap_or("?"),
            self.to.as_deref().unwrap_or("·"),
            self.distance,
            self.azimuth,
            self.inclination
        )
    }
}

/// Role a team member played on a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Kept the survey notes.
    Book,
    /// Read the instruments.
    Instruments,
    /// Explored ahead of the survey.
    Exploration,
    /// General assistant.
    Dog,
}

impl Role {
    /// Parse a role from the interchange-format keyword.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "notes" => Some(Self::Book),
            "instruments" => Some(Self::Instruments),
            "explorer" => Some(Self::Exploration),
            "dog" | "assistant" => Some(Self::Dog),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Book => write!(f, "notes"),
            Self::Instruments => write!(f, "instruments"),
            Self::Exploration => write!(f, "explorer"),
            Self::Dog => write!(f, "assistant"),
        }
    }
}

/// One team member and their roles on the trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamEntry {
    /// Member name.
    pub name: String,
    /// Roles held; may be empty.
    pub roles: Vec<Role>,
}

impl TeamEntry {
    /// Create a team entry.
    pub fn new(name: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            name: name.into(),
            roles,
        }
    }

    /// Whether any role is recorded for this member.
    pub fn has_roles(&self) -> bool {
        !self.roles.is_empty()
    }
}

/// Metadata describing the surveying trip a batch of shots came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Date the survey data was taken.
    pub date: Option<NaiveDate>,
    /// Free-text trip comments.
    pub comment: Option<String>,
    /// Magnetic declination in degrees, as configured on the instrument.
    pub declination: f64,
    /// Instrument name, if recorded.
    pub instrument: Option<String>,
    /// Survey team.
    pub team: Vec<TeamEntry>,
}

impl Trip {
    /// Create an empty trip.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the survey date.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Set the trip comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Set the declination in degrees.
    pub fn with_declination(mut self, declination: f64) -> Self {
        self.declination = declination;
        self
    }

    /// Set the instrument name.
    pub fn with_instrument(mut self, instrument: impl Into<String>) -> Self {
        self.instrument = Some(instrument.into());
        self
    }

    /// Add a team member.
    pub fn with_team_member(mut self, name: impl Into<String>, roles: Vec<Role>) -> Self {
        self.team.push(TeamEntry::new(name, roles));
        self
    }
}

/// A fixed-point reference tied to a named station (GPS tie-in or similar).
///
/// Only the comment is consumed by the kernel — it is attached to the
/// matching station after a batch build; the coordinates ride along for
/// exporters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationReference {
    /// Name of the station the reference belongs to.
    pub station: String,
    /// Easting in millimetres.
    pub east: i64,
    /// Northing in millimetres.
    pub north: i64,
    /// Altitude in millimetres.
    pub altitude: i32,
    /// Free-text comment to attach to the station.
    pub comment: Option<String>,
}

impl StationReference {
    /// Create a reference without a comment.
    pub fn new(station: impl Into<String>, east: i64, north: i64, altitude: i32) -> Self {
        Self {
            station: station.into(),
            east,
            north,
            altitude,
            comment: None,
        }
    }

    /// Attach a comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}
