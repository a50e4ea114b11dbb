//! Multi-pass reconstruction of a survey from unordered shot records.
//!
//! Instrument files store shots in *recording* order, not tree order: a
//! record may name a "from" station that nothing has created yet, repeat
//! shots of one station pair arrive scattered, and a shot may have been
//! taken backwards along its leg. The reconciler repeats full passes over
//! the unprocessed records, acting on each record the moment one of its
//! endpoints exists in the tree, until a pass makes no progress:
//!
//! - no `from` ⇒ degenerate, skipped;
//! - splay (no `to`) ⇒ waits for its `from` station, then attaches as-is;
//! - `from` exists, `to` new ⇒ **foresight**: all unprocessed repeats of
//!   the exact (from, to) pair are gathered, averaged when there are
//!   several, and become one connected leg to a new station;
//! - `from` new, `to` exists ⇒ **backsight**: same gathering, then the
//!   averaged measurement is converted to the forward convention
//!   (azimuth +180°, inclination negated, backwards flag set) and attached
//!   to the `to` station;
//! - both exist ⇒ loop closure: recorded surveys are trees, the record is
//!   discarded without structural change;
//! - neither exists ⇒ deferred to a later pass.
//!
//! Records that never resolve are returned in
//! [`BatchOutcome::unresolved`] rather than dropped silently.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::average::average_legs;
use crate::policy::ReconcilePolicy;
use crate::survey::{Survey, SurveyError};
use crate::types::{
    normalize_azimuth, Direction, Leg, ShotRecord, StationId, StationReference, Trip,
};

/// Result of a batch reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// The assembled survey.
    pub survey: Survey,
    /// Records whose endpoints never appeared in the tree, in input order.
    /// Empty when the input formed a single connected tree.
    pub unresolved: Vec<ShotRecord>,
}

/// Builds a survey tree from an unordered batch of shot records.
///
/// Unlike live entry this never auto-promotes repeat splays into invented
/// stations: station names come from the records themselves, and repeat
/// fusion only happens for explicitly repeated (from, to) pairs.
#[derive(Debug, Clone, Default)]
pub struct BatchReconciler {
    policy: ReconcilePolicy,
}

impl BatchReconciler {
    /// Create a reconciler with the given policy.
    pub fn new(policy: ReconcilePolicy) -> Self {
        Self { policy }
    }

    /// The policy being used.
    pub fn policy(&self) -> &ReconcilePolicy {
        &self.policy
    }

    /// Assemble a survey from shot records plus optional trip and
    /// station-reference metadata.
    ///
    /// The origin is named after the first record with a `from` name; the
    /// first trip (if any) is attached to the survey; reference comments
    /// are applied by station-name lookup after the tree is built, with
    /// unknown names ignored.
    pub fn reconcile(
        &self,
        shots: &[ShotRecord],
        trips: &[Trip],
        references: &[StationReference],
    ) -> Result<BatchOutcome, SurveyError> {
        let mut survey = Survey::new();

        if let Some(trip) = trips.first() {
            survey.set_trip(trip.clone());
        }

        if let Some(origin_name) = shots.iter().find_map(|shot| shot.from.clone()) {
            let origin = survey.origin();
            survey.rename_station(origin, origin_name)?;
        }

        let mut processed = vec![false; shots.len()];
        let mut progress = true;
        while progress {
            progress = false;
            for index in 0..shots.len() {
                if processed[index] {
                    continue;
                }
                let shot = &shots[index];

                let Some(from_name) = shot.from.as_deref() else {
                    // Degenerate record: nothing to attach it to.
                    processed[index] = true;
                    progress = true;
                    continue;
                };

                let from_station = survey.station_by_name(from_name);
                let to_station = shot
                    .to
                    .as_deref()
                    .and_then(|name| survey.station_by_name(name));

                match (shot.to.as_deref(), from_station, to_station) {
                    (None, Some(from), _) => {
                        processed[index] = true;
                        progress = true;
                        survey.add_leg(from, shot.to_splay_leg())?;
                    }
                    (None, None, _) => {
                        // Splay whose station does not exist yet: defer.
                    }
                    (Some(to_name), Some(from), None) => {
                        let originals = collect_repeat_legs(shots, &mut processed, index);
                        progress = true;

                        let station = survey.new_station(to_name)?;
                        self.apply_shot_metadata(&mut survey, station, shot)?;

                        let (averaged, promoted_from) = fuse_repeats(originals);
                        let leg = averaged.upgrade_to_connected(station, promoted_from, Vec::new());
                        survey.add_leg(from, leg)?;
                        survey.set_active_station(station)?;
                        debug!(station = to_name, "attached foresight leg");
                    }
                    (Some(_), None, Some(to)) => {
                        let originals = collect_repeat_legs(shots, &mut processed, index);
                        progress = true;

                        let station = survey.new_station(from_name)?;
                        self.apply_shot_metadata(&mut survey, station, shot)?;

                        let (averaged, promoted_from) = fuse_repeats(originals);
                        // Convert to the forward convention before attachment.
                        let forward = Leg::splay(
                            averaged.distance(),
                            normalize_azimuth(averaged.azimuth() + 180.0),
                            -averaged.inclination(),
                        );
                        let leg = forward
                            .upgrade_to_connected(station, promoted_from, Vec::new())
                            .shot_backwards();
                        survey.add_leg(to, leg)?;
                        survey.set_active_station(station)?;
                        debug!(station = from_name, "attached backsight leg");
                    }
                    (Some(_), Some(_), Some(_)) => {
                        // Loop closure: the tree already connects both ends.
                        processed[index] = true;
                        progress = true;
                        debug!(shot = %shot, "discarding loop-closure record");
                    }
                    (Some(_), None, None) => {
                        // Neither endpoint exists yet: defer.
                    }
                }
            }
        }

        let unresolved: Vec<ShotRecord> = shots
            .iter()
            .zip(&processed)
            .filter(|(_, done)| !**done)
            .map(|(shot, _)| shot.clone())
            .collect();
        if !unresolved.is_empty() {
            warn!(
                count = unresolved.len(),
                "records never connected to the tree"
            );
        }

        for reference in references {
            let Some(comment) = reference.comment.as_deref() else {
                continue;
            };
            if comment.is_empty() {
                continue;
            }
            if let Some(station) = survey.station_by_name(&reference.station) {
                survey.set_station_comment(station, Some(comment.to_string()))?;
            }
        }

        survey.set_saved(true);
        Ok(BatchOutcome { survey, unresolved })
    }

    /// Station comment and extended-elevation direction from the record.
    fn apply_shot_metadata(
        &self,
        survey: &mut Survey,
        station: StationId,
        shot: &ShotRecord,
    ) -> Result<(), SurveyError> {
        if let Some(comment) = shot.comment.as_deref() {
            if !comment.is_empty() {
                survey.set_station_comment(station, Some(comment.to_string()))?;
            }
        }
        let direction = if shot.flipped {
            Direction::Left
        } else {
            Direction::Right
        };
        survey.set_station_direction(station, direction)
    }
}

/// Average a set of repeats: more than one shot yields an averaged
/// measurement carrying the originals as provenance, exactly one passes
/// through untouched with no provenance.
fn fuse_repeats(originals: Vec<Leg>) -> (Leg, Vec<Leg>) {
    if originals.len() > 1 {
        let averaged = average_legs(&originals);
        (averaged, originals)
    } else {
        let single = originals.into_iter().next().unwrap_or_else(|| Leg::splay(0.0, 0.0, 0.0));
        (single, Vec::new())
    }
}

/// Gather every unprocessed shot with exactly the target's (from, to) pair
/// (the target included), mark them processed, and return the raw
/// measurements in input order.
fn collect_repeat_legs(
    shots: &[ShotRecord],
    processed: &mut [bool],
    target_index: usize,
) -> Vec<Leg> {
    let target_from = shots[target_index].from.clone();
    let target_to = shots[target_index].to.clone();
    let mut legs = Vec::new();
    for (index, shot) in shots.iter().enumerate() {
        if processed[index] {
            continue;
        }
        if shot.from == target_from && shot.to == target_to {
            legs.push(shot.to_splay_leg());
            processed[index] = true;
        }
    }
    legs
}
