//! Station types for the survey tree.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::leg::LegId;

/// Unique identifier for a station in the survey tree.
///
/// Allocated sequentially by the owning [`Survey`](crate::Survey);
/// identifier 0 is always the origin. Ordering is creation order and is
/// identical across replays of the same input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StationId(u64);

impl StationId {
    /// Create a StationId from a raw arena index.
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw arena index.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "station#{}", self.0)
    }
}

/// Extended-elevation direction tag.
///
/// Marks which way a station's subtree unfolds in an extended elevation;
/// descendants inherit it unless explicitly overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Subtree unfolds to the left.
    Left,
    /// Subtree unfolds to the right.
    Right,
}

impl Direction {
    /// Parse a direction from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    /// The other direction.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

impl Default for Direction {
    fn default() -> Self {
        Self::Right
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// A named node of the survey tree.
///
/// Owns an ordered sequence of outward legs: zero or more splays plus the
/// connected legs that grow the tree further. Insertion order is
/// significant — it is what "last N legs" queries and promotion windows are
/// defined over.
///
/// Stations are created either as the tree origin or as the destination of
/// a promoted leg, and only disappear when the leg that created them is
/// deleted. The name is the station's identity for callers; rename goes
/// through [`Survey::rename_station`](crate::Survey::rename_station) so the
/// uniqueness invariant holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    id: StationId,
    name: String,
    comment: Option<String>,
    direction: Direction,
    legs: Vec<LegId>,
}

impl Station {
    pub(crate) fn new(id: StationId, name: String) -> Self {
        Self {
            id,
            name,
            comment: None,
            direction: Direction::default(),
            legs: Vec::new(),
        }
    }

    /// This station's arena identifier.
    pub fn id(&self) -> StationId {
        self.id
    }

    /// The unique station name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-text comment, if any.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Extended-elevation direction tag.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Outward legs in insertion order.
    pub fn legs(&self) -> &[LegId] {
        &self.legs
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_comment(&mut self, comment: Option<String>) {
        self.comment = comment;
    }

    pub(crate) fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub(crate) fn push_leg(&mut self, leg: LegId) {
        self.legs.push(leg);
    }

    /// Remove a leg handle; returns whether it was present.
    pub(crate) fn remove_leg(&mut self, leg: LegId) -> bool {
        if let Some(index) = self.legs.iter().position(|id| *id == leg) {
            self.legs.remove(index);
            true
        } else {
            false
        }
    }

    /// Replace a leg handle in place, keeping its position in the order.
    pub(crate) fn replace_leg(&mut self, old: LegId, new: LegId) -> bool {
        if let Some(slot) = self.legs.iter_mut().find(|id| **id == old) {
            *slot = new;
            true
        } else {
            false
        }
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_parsing() {
        assert_eq!(Direction::from_str("left"), Some(Direction::Left));
        assert_eq!(Direction::from_str("RIGHT"), Some(Direction::Right));
        assert_eq!(Direction::from_str("up"), None);
    }

    #[test]
    fn test_direction_opposite() {
        assert_eq!(Direction::Left.opposite(), Direction::Right);
        assert_eq!(Direction::Right.opposite(), Direction::Left);
    }

    #[test]
    fn test_replace_leg_keeps_position() {
        let mut station = Station::new(StationId::new(0), "1".to_string());
        station.push_leg(LegId::new(0));
        station.push_leg(LegId::new(1));
        station.push_leg(LegId::new(2));

        assert!(station.replace_leg(LegId::new(1), LegId::new(9)));
        assert_eq!(
            station.legs(),
            &[LegId::new(0), LegId::new(9), LegId::new(2)]
        );
    }

    #[test]
    fn test_remove_missing_leg() {
        let mut station = Station::new(StationId::new(0), "1".to_string());
        station.push_leg(LegId::new(0));
        assert!(!station.remove_leg(LegId::new(7)));
        assert_eq!(station.legs().len(), 1);
    }
}
