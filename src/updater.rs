//! Live incremental survey updating.
//!
//! [`SurveyUpdater`] is the mutation surface for interactive data entry: it
//! consumes one shot at a time against the survey's active station and
//! decides whether the shot is a plain splay, a repeat to fold into an
//! already-promoted leg, or the last of a run of agreeing splays that
//! promotes into a new connected station. The manual structural operations
//! (edit, rename, move, delete, downgrade, reverse) live here too.
//!
//! ## Promotion
//!
//! 1. An incoming shot is first tested against the active station's
//!    *referring* leg (the connected leg that created it). If that leg was
//!    promoted and the shot matches its original or mirror direction, the
//!    shot is incorporated in place and nothing else changes.
//! 2. Otherwise the shot lands as a splay on the active station.
//! 3. Depending on the input mode, the most recent splays are examined: a
//!    run of `repeats_for_promotion` mutually agreeing splays (or, in combo
//!    mode, a foresight/backsight pair) is undone from the record, averaged,
//!    and re-added as a single connected leg to a freshly named station,
//!    which becomes active.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::average::{
    average_backsights, average_legs, legs_are_about_the_same, legs_are_backsights,
};
use crate::namer;
use crate::policy::ReconcilePolicy;
use crate::survey::{Survey, SurveyError};
use crate::traverse;
use crate::types::{Direction, Leg, LegId, StationId};

/// How live shots are being dictated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputMode {
    /// Shots are measured in the direction of travel.
    Forward,
    /// Shots are dictated in the opposite direction and must be reversed
    /// before storage.
    Backward,
    /// Try foresight/backsight pairing first, fall back to repeat-shot
    /// promotion.
    Combo,
    /// The shot only validates instrument calibration; nothing is promoted.
    CalibrationCheck,
}

impl InputMode {
    /// Parse an input mode from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "forward" => Some(Self::Forward),
            "backward" => Some(Self::Backward),
            "combo" => Some(Self::Combo),
            "calibration_check" | "calibration" => Some(Self::CalibrationCheck),
            _ => None,
        }
    }
}

impl Default for InputMode {
    fn default() -> Self {
        Self::Forward
    }
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "forward"),
            Self::Backward => write!(f, "backward"),
            Self::Combo => write!(f, "combo"),
            Self::CalibrationCheck => write!(f, "calibration_check"),
        }
    }
}

/// The live-entry state machine and manual structural operations.
#[derive(Debug, Clone, Default)]
pub struct SurveyUpdater {
    policy: ReconcilePolicy,
}

impl SurveyUpdater {
    /// Create an updater with the given reconciliation policy.
    pub fn new(policy: ReconcilePolicy) -> Self {
        Self { policy }
    }

    /// The policy being used.
    pub fn policy(&self) -> &ReconcilePolicy {
        &self.policy
    }

    /// Feed one shot against the active station.
    ///
    /// Returns whether a new station was created. A shot incorporated into
    /// an existing promoted leg, or stored as a plain splay, returns
    /// `false`.
    pub fn update(
        &self,
        survey: &mut Survey,
        leg: Leg,
        mode: InputMode,
    ) -> Result<bool, SurveyError> {
        let active = survey.active_station();

        if self.try_incorporate_into_existing_leg(survey, active, &leg, mode)? {
            return Ok(false);
        }

        debug!(shot = %leg, "adding shot as splay");
        survey.add_leg(active, leg)?;

        match mode {
            InputMode::Forward => self.create_new_station_if_triple_shot(survey, false),
            InputMode::Backward => self.create_new_station_if_triple_shot(survey, true),
            InputMode::Combo => {
                if self.create_new_station_if_backsight(survey)? {
                    Ok(true)
                } else {
                    self.create_new_station_if_triple_shot(survey, false)
                }
            }
            InputMode::CalibrationCheck => Ok(false),
        }
    }

    /// Feed a sequence of shots; returns whether any station was created.
    pub fn update_all(
        &self,
        survey: &mut Survey,
        legs: Vec<Leg>,
        mode: InputMode,
    ) -> Result<bool, SurveyError> {
        let mut any_stations_added = false;
        for leg in legs {
            if self.update(survey, leg, mode)? {
                any_stations_added = true;
            }
        }
        Ok(any_stations_added)
    }

    /// Add a leg from the active station, naming a fresh destination
    /// station if the leg is a splay; the destination becomes active.
    pub fn update_with_new_station(
        &self,
        survey: &mut Survey,
        leg: Leg,
    ) -> Result<LegId, SurveyError> {
        let active = survey.active_station();
        let leg = if leg.has_destination() {
            leg
        } else {
            let name = namer::generate_next_station_name(survey, active);
            let station = survey.new_station(name)?;
            leg.to_full_leg(station)
        };
        self.add_leg_from_station(survey, active, leg)
    }

    /// Add a leg from an arbitrary station; a connected leg's destination
    /// becomes the active station.
    pub fn add_leg_from_station(
        &self,
        survey: &mut Survey,
        from: StationId,
        leg: Leg,
    ) -> Result<LegId, SurveyError> {
        debug!(shot = %leg, "adding leg");
        let destination = leg.destination();
        let id = survey.add_leg(from, leg)?;
        if let Some(destination) = destination {
            survey.set_active_station(destination)?;
        }
        Ok(id)
    }

    /// Force a chosen splay into a connected leg to a freshly named
    /// station, which becomes active. Reverses the leg first in
    /// [`InputMode::Backward`].
    pub fn upgrade_splay(
        &self,
        survey: &mut Survey,
        leg_id: LegId,
        mode: InputMode,
    ) -> Result<StationId, SurveyError> {
        let Some(leg) = survey.leg(leg_id).cloned() else {
            return Err(SurveyError::LegNotFound(leg_id));
        };
        if leg.has_destination() {
            return Err(SurveyError::AlreadyConnected(leg_id));
        }
        let name = namer::generate_next_station_name(survey, survey.active_station());
        let new_station = survey.new_station(name)?;
        let mut new_leg = leg.to_full_leg(new_station);
        if mode == InputMode::Backward {
            new_leg = new_leg.reverse();
        }
        self.edit_leg(survey, leg_id, new_leg)?;
        survey.set_active_station(new_station)?;
        Ok(new_station)
    }

    /// Replace one leg with another, keeping its place in the tree and the
    /// flat record. Returns the replacement's handle.
    pub fn edit_leg(
        &self,
        survey: &mut Survey,
        to_edit: LegId,
        edited: Leg,
    ) -> Result<LegId, SurveyError> {
        let id = survey.replace_leg(to_edit, edited)?;
        debug!(old = %to_edit, new = %id, "edited leg");
        Ok(id)
    }

    /// Rename a station; fails if the name belongs to another station.
    pub fn rename_station(
        &self,
        survey: &mut Survey,
        station: StationId,
        name: impl Into<String>,
    ) -> Result<(), SurveyError> {
        survey.rename_station(station, name)
    }

    /// Rename the origin station.
    pub fn rename_origin(
        &self,
        survey: &mut Survey,
        name: impl Into<String>,
    ) -> Result<(), SurveyError> {
        let origin = survey.origin();
        survey.rename_station(origin, name)
    }

    /// Reattach a leg to a different origin station.
    ///
    /// A connected leg cannot be moved into its own subtree — that would
    /// cut the subtree loose from the origin.
    pub fn move_leg(
        &self,
        survey: &mut Survey,
        leg: LegId,
        new_source: StationId,
    ) -> Result<(), SurveyError> {
        if let Some(destination) = survey.leg(leg).and_then(|l| l.destination()) {
            if traverse::collect_subtree_stations(survey, destination).contains(&new_source) {
                return Err(SurveyError::MoveIntoOwnSubtree(leg));
            }
        }
        survey.reattach_leg(leg, new_source)?;
        info!(to = %new_source, "moved leg to a different station");
        Ok(())
    }

    /// Delete a station by deleting the leg that created it, along with the
    /// whole subtree below. Deleting the origin is a no-op.
    pub fn delete_station(
        &self,
        survey: &mut Survey,
        station: StationId,
    ) -> Result<(), SurveyError> {
        if survey.is_origin(station) {
            return Ok(());
        }
        if survey.station(station).is_none() {
            return Err(SurveyError::StationNotFound(station));
        }
        let Some(referring) = survey.referring_leg(station) else {
            return Err(SurveyError::IntegrityViolation(format!(
                "{station} has no referring leg"
            )));
        };
        self.delete_leg(survey, referring)
    }

    /// Delete a leg and the entire subtree hanging off its destination,
    /// from both the tree and the flat record.
    pub fn delete_leg(&self, survey: &mut Survey, leg: LegId) -> Result<(), SurveyError> {
        survey.remove_leg_subtree(leg)?;
        survey.check_integrity()?;
        info!(%leg, "deleted leg and its subtree");
        Ok(())
    }

    /// Convert a connected leg back into a splay, retiring its destination
    /// station. Fails if the destination still has outward legs.
    pub fn downgrade_leg(&self, survey: &mut Survey, leg_id: LegId) -> Result<(), SurveyError> {
        let Some(leg) = survey.leg(leg_id).cloned() else {
            return Err(SurveyError::LegNotFound(leg_id));
        };
        let Some(destination) = leg.destination() else {
            return Ok(()); // already a splay
        };
        let destination_has_legs = survey
            .station(destination)
            .map(|station| !station.legs().is_empty())
            .unwrap_or(false);
        if destination_has_legs {
            return Err(SurveyError::DestinationHasOnwardLegs(leg_id));
        }

        let owner = survey
            .originating_station(leg_id)
            .unwrap_or_else(|| survey.origin());
        let new_id = survey.replace_leg(leg_id, leg.to_splay())?;
        if survey.active_station() == destination {
            survey.set_active_station(owner)?;
        }
        survey.remove_station_entry(destination);
        survey.check_integrity()?;
        debug!(old = %leg_id, new = %new_id, "downgraded leg to splay");
        Ok(())
    }

    /// Reverse the stored direction of the leg referring to `destination`.
    /// A station with no referring leg (the origin) is left untouched.
    pub fn reverse_leg(
        &self,
        survey: &mut Survey,
        destination: StationId,
    ) -> Result<(), SurveyError> {
        let Some(referring_id) = survey.referring_leg(destination) else {
            return Ok(());
        };
        let Some(reversed) = survey.leg(referring_id).map(|leg| leg.reverse()) else {
            return Ok(());
        };
        let new_id = survey.replace_leg(referring_id, reversed)?;
        info!(leg = %new_id, "reversed leg");
        Ok(())
    }

    /// Set the extended-elevation direction on a station and every
    /// descendant.
    pub fn set_direction_of_subtree(
        &self,
        survey: &mut Survey,
        station: StationId,
        direction: Direction,
    ) -> Result<(), SurveyError> {
        if survey.station(station).is_none() {
            return Err(SurveyError::StationNotFound(station));
        }
        for id in traverse::collect_subtree_stations(survey, station) {
            survey.set_station_direction(id, direction)?;
        }
        Ok(())
    }

    // ── Promotion internals ──────────────────────────────────────────────

    /// Fold the shot into the active station's referring leg when it
    /// matches an already-promoted leg's direction or mirror direction.
    ///
    /// Once backsight shots exist on the leg, only further backsight-
    /// direction shots are incorporated; original-direction shots fall back
    /// to being plain splays.
    fn try_incorporate_into_existing_leg(
        &self,
        survey: &mut Survey,
        active: StationId,
        new_leg: &Leg,
        mode: InputMode,
    ) -> Result<bool, SurveyError> {
        if mode == InputMode::CalibrationCheck {
            return Ok(false);
        }
        let Some(referring_id) = survey.referring_leg(active) else {
            return Ok(false);
        };
        let Some(referring) = survey.leg(referring_id).cloned() else {
            return Ok(false);
        };
        if !referring.was_promoted() {
            return Ok(false);
        }
        let Some(original) = referring.promoted_from().first().cloned() else {
            return Ok(false);
        };

        let matches_original =
            legs_are_about_the_same(&[original.clone(), new_leg.clone()], &self.policy);
        let matches_backsight =
            legs_are_about_the_same(&[original.as_backsight(), new_leg.clone()], &self.policy);

        if referring.has_backsight_shots() {
            if matches_backsight {
                self.add_backsight_to_referring_leg(
                    survey,
                    active,
                    referring_id,
                    &referring,
                    new_leg,
                    mode,
                )?;
                return Ok(true);
            }
            return Ok(false);
        }

        if matches_original {
            self.incorporate_into_referring_leg(
                survey,
                active,
                referring_id,
                &referring,
                new_leg,
                mode,
            )?;
            return Ok(true);
        }
        if matches_backsight {
            self.add_backsight_to_referring_leg(
                survey,
                active,
                referring_id,
                &referring,
                new_leg,
                mode,
            )?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Append the shot to the referring leg's originals and re-average.
    fn incorporate_into_referring_leg(
        &self,
        survey: &mut Survey,
        active: StationId,
        referring_id: LegId,
        referring: &Leg,
        new_leg: &Leg,
        mode: InputMode,
    ) -> Result<(), SurveyError> {
        let mut all_shots = referring.promoted_from().to_vec();
        all_shots.push(new_leg.clone());

        let averaged = average_legs(&all_shots);
        let mut updated = averaged.upgrade_to_connected(
            active,
            all_shots,
            referring.backsight_promoted_from().to_vec(),
        );
        if mode == InputMode::Backward {
            updated = updated.reverse();
        }

        survey.replace_leg(referring_id, updated)?;
        debug!(shot = %new_leg, "incorporated repeat shot into promoted leg");
        Ok(())
    }

    /// Record the shot as a backsight on the referring leg.
    fn add_backsight_to_referring_leg(
        &self,
        survey: &mut Survey,
        active: StationId,
        referring_id: LegId,
        referring: &Leg,
        new_leg: &Leg,
        mode: InputMode,
    ) -> Result<(), SurveyError> {
        let mut backsight_shots = referring.backsight_promoted_from().to_vec();
        backsight_shots.push(new_leg.clone());

        let mut updated = referring.to_splay().upgrade_to_connected(
            active,
            referring.promoted_from().to_vec(),
            backsight_shots,
        );
        if mode == InputMode::Backward {
            updated = updated.reverse();
        }

        survey.replace_leg(referring_id, updated)?;
        debug!(shot = %new_leg, "recorded backsight shot on promoted leg");
        Ok(())
    }

    /// Promote the last `repeats_for_promotion` splays into a connected
    /// station if they all hang off the active station and agree.
    fn create_new_station_if_triple_shot(
        &self,
        survey: &mut Survey,
        backsight_mode: bool,
    ) -> Result<bool, SurveyError> {
        let required = self.policy.repeats_for_promotion;
        let active = survey.active_station();
        let Some(active_station) = survey.station(active) else {
            return Ok(false);
        };
        if active_station.legs().len() < required {
            return Ok(false);
        }

        let last_n = survey.last_n_legs(required);
        if last_n.len() < required {
            return Ok(false);
        }
        if !last_n.iter().all(|id| active_station.legs().contains(id)) {
            return Ok(false);
        }
        let direction = active_station.direction();

        let mut shots = Vec::with_capacity(required);
        for id in &last_n {
            let Some(leg) = survey.leg(*id) else {
                return Err(SurveyError::LegNotFound(*id));
            };
            shots.push(leg.clone());
        }
        if !legs_are_about_the_same(&shots, &self.policy) {
            return Ok(false);
        }

        let name = namer::generate_next_station_name(survey, active);
        let new_station = survey.new_station(name.clone())?;
        survey.set_station_direction(new_station, direction)?;

        let mut new_leg =
            average_legs(&shots).upgrade_to_connected(new_station, shots, Vec::new());
        if backsight_mode {
            new_leg = new_leg.reverse();
        }

        for _ in 0..required {
            survey.undo_add_leg();
        }
        survey.add_leg(active, new_leg)?;
        survey.set_active_station(new_station)?;

        info!(station = %name, repeats = required, "promoted repeat shots into new station");
        Ok(true)
    }

    /// Promote the last two splays into a connected station if they agree
    /// as a foresight/backsight pair.
    fn create_new_station_if_backsight(&self, survey: &mut Survey) -> Result<bool, SurveyError> {
        let active = survey.active_station();
        let Some(active_station) = survey.station(active) else {
            return Ok(false);
        };
        if active_station.legs().len() < 2 {
            return Ok(false);
        }

        let last_pair = survey.last_n_legs(2);
        if last_pair.len() < 2 {
            return Ok(false);
        }
        if !last_pair.iter().all(|id| active_station.legs().contains(id)) {
            return Ok(false);
        }
        let direction = active_station.direction();

        let Some(fore) = survey.leg(last_pair[0]).cloned() else {
            return Err(SurveyError::LegNotFound(last_pair[0]));
        };
        let Some(back) = survey.leg(last_pair[1]).cloned() else {
            return Err(SurveyError::LegNotFound(last_pair[1]));
        };
        if !legs_are_backsights(&fore, &back, &self.policy) {
            return Ok(false);
        }

        let name = namer::generate_next_station_name(survey, active);
        let new_station = survey.new_station(name.clone())?;
        survey.set_station_direction(new_station, direction)?;

        let new_leg = average_backsights(&fore, &back).to_full_leg(new_station);

        survey.undo_add_leg();
        survey.undo_add_leg();
        survey.add_leg(active, new_leg)?;
        survey.set_active_station(new_station)?;

        info!(station = %name, "promoted foresight/backsight pair into new station");
        Ok(true)
    }
}
