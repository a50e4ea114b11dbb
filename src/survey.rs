//! The survey aggregate: station/leg arenas, the flat chronological leg
//! record, and the active-station cursor.
//!
//! ## Structure
//!
//! Stations and legs live in `BTreeMap` arenas keyed by sequentially
//! allocated ids, so iteration order is deterministic and replacement is an
//! in-place splice by handle rather than pointer surgery. The flat `record`
//! lists every leg in the order it was added — logically separate from the
//! tree edges but kept in lockstep with them, which is what undo and
//! "last N legs" queries are defined over.
//!
//! ## Invariants
//!
//! - exactly one origin station; every other station is the destination of
//!   exactly one connected leg (the tree property);
//! - the set of legs reachable from the origin, the leg arena, and the flat
//!   record all agree (checked by [`Survey::check_integrity`] after
//!   structural deletions);
//! - station names are unique; renames that would collide are rejected.
//!
//! Structural mutations are deliberately `pub(crate)`: external callers go
//! through [`SurveyUpdater`](crate::SurveyUpdater) or
//! [`BatchReconciler`](crate::BatchReconciler), which maintain the
//! reconciliation semantics on top of these primitives.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Direction, Leg, LegId, Station, StationId, Trip};
use crate::DEFAULT_ORIGIN_NAME;

/// Error type for survey mutations and integrity checks.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SurveyError {
    /// A rename or creation would reuse a name held by another station.
    #[error("station name already in use: {0}")]
    NameInUse(String),
    /// A station handle did not resolve.
    #[error("station not found: {0}")]
    StationNotFound(StationId),
    /// A leg handle did not resolve.
    #[error("leg not found: {0}")]
    LegNotFound(LegId),
    /// Attaching the leg would give its destination a second referring leg.
    #[error("{0} already has a referring leg")]
    DestinationAlreadyReferred(StationId),
    /// Attaching the leg would make the origin a destination.
    #[error("cannot attach a leg whose destination is the origin")]
    DestinationIsOrigin,
    /// A connected leg cannot be downgraded while its destination still has
    /// outward legs of its own.
    #[error("cannot downgrade {0}: destination station still has onward legs")]
    DestinationHasOnwardLegs(LegId),
    /// The operation expected a splay but got a connected leg.
    #[error("{0} is already a connected leg")]
    AlreadyConnected(LegId),
    /// Moving the leg would make it an ancestor of its own origin.
    #[error("cannot move {0} into its own subtree")]
    MoveIntoOwnSubtree(LegId),
    /// The flat record and the tree no longer correspond.
    #[error("survey integrity violated: {0}")]
    IntegrityViolation(String),
}

/// A survey: one origin-rooted tree of stations and measured legs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Survey {
    name: String,
    stations: BTreeMap<StationId, Station>,
    legs: BTreeMap<LegId, Leg>,
    record: Vec<LegId>,
    names: BTreeMap<String, StationId>,
    owners: BTreeMap<LegId, StationId>,
    origin: StationId,
    active: StationId,
    trip: Option<Trip>,
    saved: bool,
    next_station: u64,
    next_leg: u64,
}

impl Default for Survey {
    fn default() -> Self {
        Self::new()
    }
}

impl Survey {
    /// Create an empty survey whose origin carries the default name.
    pub fn new() -> Self {
        Self::with_origin(DEFAULT_ORIGIN_NAME)
    }

    /// Create an empty survey with a named origin station.
    pub fn with_origin(origin_name: impl Into<String>) -> Self {
        let origin_name = origin_name.into();
        let origin = StationId::new(0);
        let mut stations = BTreeMap::new();
        stations.insert(origin, Station::new(origin, origin_name.clone()));
        let mut names = BTreeMap::new();
        names.insert(origin_name, origin);
        Self {
            name: String::new(),
            stations,
            legs: BTreeMap::new(),
            record: Vec::new(),
            names,
            owners: BTreeMap::new(),
            origin,
            active: origin,
            trip: None,
            saved: true,
            next_station: 1,
            next_leg: 0,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// The survey name (used by exporters for the outer block).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the survey name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.saved = false;
    }

    /// The origin station: the tree root, the only station with no
    /// referring leg.
    pub fn origin(&self) -> StationId {
        self.origin
    }

    /// Whether a station is the origin.
    pub fn is_origin(&self, id: StationId) -> bool {
        id == self.origin
    }

    /// The station live data entry currently attaches to.
    pub fn active_station(&self) -> StationId {
        self.active
    }

    /// Move the active-station cursor.
    pub fn set_active_station(&mut self, id: StationId) -> Result<(), SurveyError> {
        if !self.stations.contains_key(&id) {
            return Err(SurveyError::StationNotFound(id));
        }
        self.active = id;
        Ok(())
    }

    /// Look up a station by handle.
    pub fn station(&self, id: StationId) -> Option<&Station> {
        self.stations.get(&id)
    }

    /// Look up a station by its unique name.
    pub fn station_by_name(&self, name: &str) -> Option<StationId> {
        self.names.get(name).copied()
    }

    /// All stations, in creation order.
    pub fn stations(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    /// Number of stations in the tree.
    pub fn num_stations(&self) -> usize {
        self.stations.len()
    }

    /// Look up a leg by handle.
    pub fn leg(&self, id: LegId) -> Option<&Leg> {
        self.legs.get(&id)
    }

    /// Number of legs (splays and connected) in the tree.
    pub fn num_legs(&self) -> usize {
        self.legs.len()
    }

    /// Number of connected (non-splay) legs.
    pub fn num_connected_legs(&self) -> usize {
        self.legs.values().filter(|leg| leg.has_destination()).count()
    }

    /// The station a leg hangs off.
    pub fn originating_station(&self, leg: LegId) -> Option<StationId> {
        self.owners.get(&leg).copied()
    }

    /// The single connected leg whose destination is the given station, if
    /// any (the origin has none).
    pub fn referring_leg(&self, station: StationId) -> Option<LegId> {
        self.legs
            .iter()
            .find(|(_, leg)| leg.destination() == Some(station))
            .map(|(id, _)| *id)
    }

    /// Chronological `(origin station, leg)` pairs for flat listings.
    pub fn leg_records(&self) -> Vec<(StationId, LegId)> {
        self.record
            .iter()
            .filter_map(|id| self.owners.get(id).map(|owner| (*owner, *id)))
            .collect()
    }

    /// The most recent `n` legs, oldest first.
    pub fn last_n_legs(&self, n: usize) -> Vec<LegId> {
        let start = self.record.len().saturating_sub(n);
        self.record[start..].to_vec()
    }

    /// Trip metadata, if attached.
    pub fn trip(&self) -> Option<&Trip> {
        self.trip.as_ref()
    }

    /// Attach trip metadata.
    pub fn set_trip(&mut self, trip: Trip) {
        self.trip = Some(trip);
        self.saved = false;
    }

    /// Whether the survey has been persisted since the last mutation.
    pub fn is_saved(&self) -> bool {
        self.saved
    }

    /// Mark the survey saved/unsaved.
    pub fn set_saved(&mut self, saved: bool) {
        self.saved = saved;
    }

    // ── Safe public mutation ─────────────────────────────────────────────

    /// Rename a station.
    ///
    /// Fails with [`SurveyError::NameInUse`] if another station already
    /// holds the name; renaming a station to its current name is a no-op.
    pub fn rename_station(
        &mut self,
        id: StationId,
        name: impl Into<String>,
    ) -> Result<(), SurveyError> {
        let name = name.into();
        if let Some(&holder) = self.names.get(&name) {
            if holder == id {
                return Ok(());
            }
            return Err(SurveyError::NameInUse(name));
        }
        let Some(station) = self.stations.get_mut(&id) else {
            return Err(SurveyError::StationNotFound(id));
        };
        let previous = station.name().to_string();
        station.set_name(name.clone());
        self.names.remove(&previous);
        self.names.insert(name.clone(), id);
        self.saved = false;
        debug!(from = %previous, to = %name, "renamed station");
        Ok(())
    }

    /// Set a station's free-text comment.
    pub fn set_station_comment(
        &mut self,
        id: StationId,
        comment: Option<String>,
    ) -> Result<(), SurveyError> {
        let Some(station) = self.stations.get_mut(&id) else {
            return Err(SurveyError::StationNotFound(id));
        };
        station.set_comment(comment);
        self.saved = false;
        Ok(())
    }

    /// Set a station's extended-elevation direction tag.
    pub fn set_station_direction(
        &mut self,
        id: StationId,
        direction: Direction,
    ) -> Result<(), SurveyError> {
        let Some(station) = self.stations.get_mut(&id) else {
            return Err(SurveyError::StationNotFound(id));
        };
        station.set_direction(direction);
        self.saved = false;
        Ok(())
    }

    // ── Structural primitives (crate-internal) ───────────────────────────

    /// Allocate a new station. The name must be unused.
    pub(crate) fn new_station(
        &mut self,
        name: impl Into<String>,
    ) -> Result<StationId, SurveyError> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(SurveyError::NameInUse(name));
        }
        let id = StationId::new(self.next_station);
        self.next_station += 1;
        self.stations.insert(id, Station::new(id, name.clone()));
        self.names.insert(name, id);
        self.saved = false;
        Ok(id)
    }

    /// Attach a leg to a station and append it to the flat record.
    ///
    /// A connected leg's destination must exist, must not be the origin, and
    /// must not already have a referring leg (tree property).
    pub(crate) fn add_leg(&mut self, from: StationId, leg: Leg) -> Result<LegId, SurveyError> {
        if !self.stations.contains_key(&from) {
            return Err(SurveyError::StationNotFound(from));
        }
        if let Some(destination) = leg.destination() {
            if destination == self.origin {
                return Err(SurveyError::DestinationIsOrigin);
            }
            if !self.stations.contains_key(&destination) {
                return Err(SurveyError::StationNotFound(destination));
            }
            if self.referring_leg(destination).is_some() {
                return Err(SurveyError::DestinationAlreadyReferred(destination));
            }
        }
        let id = LegId::new(self.next_leg);
        self.next_leg += 1;
        self.legs.insert(id, leg);
        if let Some(station) = self.stations.get_mut(&from) {
            station.push_leg(id);
        }
        self.owners.insert(id, from);
        self.record.push(id);
        self.saved = false;
        Ok(id)
    }

    /// Remove the most recently recorded leg, returning its value.
    ///
    /// If that leg was connected, its destination station (necessarily a
    /// leaf, being newer than every other leg) is retired too, and the
    /// active cursor is re-homed if it pointed there.
    pub(crate) fn undo_add_leg(&mut self) -> Option<Leg> {
        let id = self.record.pop()?;
        let owner = self.owners.remove(&id);
        if let Some(owner) = owner {
            if let Some(station) = self.stations.get_mut(&owner) {
                station.remove_leg(id);
            }
        }
        let leg = self.legs.remove(&id);
        if let Some(leg) = &leg {
            if let Some(destination) = leg.destination() {
                self.remove_station_entry(destination);
                if self.active == destination {
                    self.active = owner.unwrap_or(self.origin);
                }
            }
        }
        self.saved = false;
        leg
    }

    /// Replace a leg in place: same origin station, same position in both
    /// the station's leg order and the flat record, fresh handle.
    ///
    /// A destination *change* is validated like [`Survey::add_leg`]; keeping
    /// the old destination is always allowed.
    pub(crate) fn replace_leg(&mut self, old: LegId, new_leg: Leg) -> Result<LegId, SurveyError> {
        let Some(&owner) = self.owners.get(&old) else {
            return Err(SurveyError::LegNotFound(old));
        };
        let old_destination = self.legs.get(&old).and_then(|leg| leg.destination());
        if let Some(destination) = new_leg.destination() {
            if Some(destination) != old_destination {
                if destination == self.origin {
                    return Err(SurveyError::DestinationIsOrigin);
                }
                if !self.stations.contains_key(&destination) {
                    return Err(SurveyError::StationNotFound(destination));
                }
                if self.referring_leg(destination).is_some() {
                    return Err(SurveyError::DestinationAlreadyReferred(destination));
                }
            }
        }
        let id = LegId::new(self.next_leg);
        self.next_leg += 1;
        self.legs.remove(&old);
        self.legs.insert(id, new_leg);
        if let Some(station) = self.stations.get_mut(&owner) {
            station.replace_leg(old, id);
        }
        self.owners.remove(&old);
        self.owners.insert(id, owner);
        if let Some(slot) = self.record.iter_mut().find(|slot| **slot == old) {
            *slot = id;
        }
        self.saved = false;
        Ok(id)
    }

    /// Re-home a leg onto a different origin station (appended at the end
    /// of the new station's leg order; the record position is unchanged).
    pub(crate) fn reattach_leg(
        &mut self,
        leg: LegId,
        new_source: StationId,
    ) -> Result<(), SurveyError> {
        if !self.stations.contains_key(&new_source) {
            return Err(SurveyError::StationNotFound(new_source));
        }
        let Some(&owner) = self.owners.get(&leg) else {
            return Err(SurveyError::LegNotFound(leg));
        };
        if let Some(station) = self.stations.get_mut(&owner) {
            station.remove_leg(leg);
        }
        if let Some(station) = self.stations.get_mut(&new_source) {
            station.push_leg(leg);
        }
        self.owners.insert(leg, new_source);
        self.saved = false;
        Ok(())
    }

    /// Remove a leg together with the whole subtree hanging off its
    /// destination, from both the tree and the flat record.
    ///
    /// If the active cursor pointed into the removed subtree it is re-homed
    /// onto the deleted leg's origin station.
    pub(crate) fn remove_leg_subtree(&mut self, leg_id: LegId) -> Result<(), SurveyError> {
        let Some(&owner) = self.owners.get(&leg_id) else {
            return Err(SurveyError::LegNotFound(leg_id));
        };
        let destination = self.legs.get(&leg_id).and_then(|leg| leg.destination());

        if let Some(destination) = destination {
            let subtree_legs = crate::traverse::collect_legs(self, destination);
            let subtree_stations = crate::traverse::collect_subtree_stations(self, destination);
            for (_, sub_leg) in subtree_legs {
                self.record.retain(|id| *id != sub_leg);
                self.legs.remove(&sub_leg);
                self.owners.remove(&sub_leg);
            }
            for station_id in subtree_stations {
                if self.active == station_id {
                    self.active = owner;
                }
                self.remove_station_entry(station_id);
            }
        }

        self.record.retain(|id| *id != leg_id);
        self.legs.remove(&leg_id);
        self.owners.remove(&leg_id);
        if let Some(station) = self.stations.get_mut(&owner) {
            station.remove_leg(leg_id);
        }
        self.saved = false;
        Ok(())
    }

    /// Retire a single station from the arena and the name index.
    pub(crate) fn remove_station_entry(&mut self, id: StationId) {
        if let Some(station) = self.stations.remove(&id) {
            self.names.remove(station.name());
        }
    }

    // ── Integrity ────────────────────────────────────────────────────────

    /// Verify that the flat record, the arenas, and the tree edges all
    /// correspond.
    ///
    /// Walks the tree from the origin with an explicit stack and checks:
    /// every station and leg is reached exactly once; the arenas contain
    /// nothing unreachable; the record lists exactly the reachable legs,
    /// each once; the owner and name indexes agree; the cursors resolve.
    pub fn check_integrity(&self) -> Result<(), SurveyError> {
        let mut seen_stations: BTreeSet<StationId> = BTreeSet::new();
        let mut seen_legs: BTreeSet<LegId> = BTreeSet::new();
        let mut stack = vec![self.origin];

        while let Some(station_id) = stack.pop() {
            if !seen_stations.insert(station_id) {
                return Err(SurveyError::IntegrityViolation(format!(
                    "{station_id} is the destination of more than one leg"
                )));
            }
            let Some(station) = self.stations.get(&station_id) else {
                return Err(SurveyError::IntegrityViolation(format!(
                    "{station_id} referenced but missing from the arena"
                )));
            };
            for &leg_id in station.legs() {
                if !seen_legs.insert(leg_id) {
                    return Err(SurveyError::IntegrityViolation(format!(
                        "{leg_id} owned by more than one station"
                    )));
                }
                let Some(leg) = self.legs.get(&leg_id) else {
                    return Err(SurveyError::IntegrityViolation(format!(
                        "{leg_id} owned by {station_id} but missing from the arena"
                    )));
                };
                if self.owners.get(&leg_id) != Some(&station_id) {
                    return Err(SurveyError::IntegrityViolation(format!(
                        "owner index disagrees for {leg_id}"
                    )));
                }
                if let Some(destination) = leg.destination() {
                    stack.push(destination);
                }
            }
        }

        if seen_stations.len() != self.stations.len() {
            return Err(SurveyError::IntegrityViolation(format!(
                "{} stations unreachable from the origin",
                self.stations.len() - seen_stations.len()
            )));
        }
        if seen_legs.len() != self.legs.len() {
            return Err(SurveyError::IntegrityViolation(format!(
                "{} legs unreachable from the origin",
                self.legs.len() - seen_legs.len()
            )));
        }
        let recorded: BTreeSet<LegId> = self.record.iter().copied().collect();
        if recorded.len() != self.record.len() {
            return Err(SurveyError::IntegrityViolation(
                "duplicate entries in the flat leg record".to_string(),
            ));
        }
        if recorded != seen_legs {
            return Err(SurveyError::IntegrityViolation(
                "flat leg record does not match the tree".to_string(),
            ));
        }
        if !self.stations.contains_key(&self.active) {
            return Err(SurveyError::IntegrityViolation(
                "active station missing from the arena".to_string(),
            ));
        }
        if self.names.len() != self.stations.len() {
            return Err(SurveyError::IntegrityViolation(
                "station name index out of sync".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shared handle serializing all access to one survey instance.
///
/// The live-update state machine reads and writes the active-station cursor
/// and the flat leg record as one unit, so concurrent callers must hold the
/// per-survey lock for the whole operation — closure-scoped access makes
/// that the only option. Cloning the handle shares the same survey.
#[derive(Clone)]
pub struct SharedSurvey {
    inner: Arc<Mutex<Survey>>,
}

impl SharedSurvey {
    /// Wrap a survey in a shared, lock-guarded handle.
    pub fn new(survey: Survey) -> Self {
        Self {
            inner: Arc::new(Mutex::new(survey)),
        }
    }

    /// Run a mutation while exclusively holding the per-survey lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut Survey) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// Run a read-only query while holding the per-survey lock.
    pub fn read<R>(&self, f: impl FnOnce(&Survey) -> R) -> R {
        let guard = self.inner.lock();
        f(&guard)
    }
}
