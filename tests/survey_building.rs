//! End-to-end tests for the survey kernel.
//!
//! These drive the public API the way format importers and the live entry
//! screen do, and verify the reconciliation scenarios and invariants the
//! kernel promises.

use survey_kernel::{
    BatchReconciler, Direction, InputMode, Leg, ReconcilePolicy, ShotRecord, SharedSurvey,
    Survey, SurveyError, SurveyUpdater, Trip,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Shot records describing a small three-branch cave:
///
/// ```text
/// 1 ── 2 ── 3
///      └─ 4
/// ```
/// plus splays off stations 2 and 4.
fn branching_records() -> Vec<ShotRecord> {
    vec![
        ShotRecord::new("1", "2", 5.0, 90.0, 0.0),
        ShotRecord::splay("2", 1.2, 10.0, 40.0),
        ShotRecord::new("2", "3", 4.0, 85.0, -2.0),
        ShotRecord::new("2", "4", 3.0, 180.0, 5.0),
        ShotRecord::splay("4", 0.8, 200.0, -10.0),
    ]
}

fn station_count(survey: &Survey) -> usize {
    survey.num_stations()
}

// ─────────────────────────────────────────────────────────────────────────────
// BATCH RECONCILIATION
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_batch_scenario_two_stations_one_splay() {
    init_tracing();
    let shots = vec![
        ShotRecord::new("0.0", "0.1", 3.5, 90.0, 0.0),
        ShotRecord::splay("0.1", 2.0, 0.0, 45.0),
    ];
    let outcome = BatchReconciler::default().reconcile(&shots, &[], &[]).unwrap();
    let survey = outcome.survey;

    assert_eq!(survey.num_stations(), 2);
    assert_eq!(survey.num_connected_legs(), 1);

    let origin = survey.origin();
    let leg = survey
        .leg(survey.station(origin).unwrap().legs()[0])
        .unwrap();
    assert!(close(leg.distance(), 3.5));
    assert!(close(leg.azimuth(), 90.0));
    assert!(close(leg.inclination(), 0.0));

    let tip = survey.station_by_name("0.1").unwrap();
    let splay = survey
        .leg(survey.station(tip).unwrap().legs()[0])
        .unwrap();
    assert!(close(splay.distance(), 2.0));
    assert!(close(splay.inclination(), 45.0));
    assert!(!splay.has_destination());
}

#[test]
fn test_batch_tree_completeness_is_order_independent() {
    init_tracing();
    let records = branching_records();
    let reconciler = BatchReconciler::default();

    let reference = reconciler.reconcile(&records, &[], &[]).unwrap();
    assert!(reference.unresolved.is_empty());
    assert_eq!(station_count(&reference.survey), 4);
    assert_eq!(reference.survey.num_connected_legs(), 3);
    assert_eq!(reference.survey.num_legs(), 5);

    // every rotation of the input builds the same tree shape
    for rotation in 1..records.len() {
        let mut permuted = records.clone();
        permuted.rotate_left(rotation);
        let outcome = reconciler.reconcile(&permuted, &[], &[]).unwrap();
        assert!(outcome.unresolved.is_empty(), "rotation {rotation} left records behind");
        assert_eq!(station_count(&outcome.survey), 4);
        assert_eq!(outcome.survey.num_connected_legs(), 3);
        assert_eq!(outcome.survey.num_legs(), 5);
        assert!(outcome.survey.check_integrity().is_ok());
    }

    // and so does the full reversal
    let mut reversed = records;
    reversed.reverse();
    let outcome = reconciler.reconcile(&reversed, &[], &[]).unwrap();
    assert!(outcome.unresolved.is_empty());
    assert_eq!(station_count(&outcome.survey), 4);
}

#[test]
fn test_batch_backsight_conversion() {
    init_tracing();
    // "5" is new, "2" exists: a backsight with azimuth A, inclination I
    // becomes a forward leg (A+180 mod 360, -I) attached to "2".
    let mut shots = branching_records();
    shots.push(ShotRecord::new("5", "2", 6.0, 300.0, 12.0));

    let outcome = BatchReconciler::default().reconcile(&shots, &[], &[]).unwrap();
    let survey = outcome.survey;

    let two = survey.station_by_name("2").unwrap();
    let five = survey.station_by_name("5").unwrap();
    let leg_id = survey.referring_leg(five).unwrap();
    assert_eq!(survey.originating_station(leg_id), Some(two));

    let leg = survey.leg(leg_id).unwrap();
    assert!(close(leg.azimuth(), 120.0));
    assert!(close(leg.inclination(), -12.0));
    assert!(leg.was_shot_backwards());
}

#[test]
fn test_batch_loop_closure_is_idempotent() {
    init_tracing();
    let mut shots = branching_records();
    shots.push(ShotRecord::new("3", "4", 9.9, 12.0, 3.0)); // both exist

    let reconciler = BatchReconciler::default();
    let without = reconciler.reconcile(&branching_records(), &[], &[]).unwrap();
    let with = reconciler.reconcile(&shots, &[], &[]).unwrap();

    assert_eq!(
        station_count(&without.survey),
        station_count(&with.survey)
    );
    assert_eq!(without.survey.num_legs(), with.survey.num_legs());
    assert!(with.unresolved.is_empty());
}

#[test]
fn test_batch_fuses_scattered_repeats() {
    init_tracing();
    // the repeats of 2→3 are not adjacent in recording order
    let shots = vec![
        ShotRecord::new("1", "2", 5.0, 90.0, 0.0),
        ShotRecord::new("2", "3", 4.00, 85.00, -2.0),
        ShotRecord::splay("2", 1.0, 10.0, 0.0),
        ShotRecord::new("2", "3", 4.01, 85.05, -2.1),
        ShotRecord::new("2", "3", 3.99, 84.95, -1.9),
    ];
    let outcome = BatchReconciler::default().reconcile(&shots, &[], &[]).unwrap();
    let survey = outcome.survey;

    let three = survey.station_by_name("3").unwrap();
    let leg = survey.leg(survey.referring_leg(three).unwrap()).unwrap();
    assert_eq!(leg.promoted_from().len(), 3);
    assert!(close(leg.distance(), 4.0));
    assert!(close(leg.azimuth(), 85.0));
    assert!(close(leg.inclination(), -2.0));
}

// ─────────────────────────────────────────────────────────────────────────────
// LIVE ENTRY
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_live_triple_shot_scenario() {
    init_tracing();
    let updater = SurveyUpdater::default();
    let mut survey = Survey::new();

    let shots = [
        Leg::splay(5.00, 90.00, 0.4),
        Leg::splay(5.01, 90.05, -0.1),
        Leg::splay(4.99, 89.95, -0.3),
    ];
    let mut created = false;
    for shot in shots {
        created = updater.update(&mut survey, shot, InputMode::Forward).unwrap();
    }
    assert!(created);

    let origin = survey.origin();
    let leg = survey
        .leg(survey.station(origin).unwrap().legs()[0])
        .unwrap();
    assert!(close(leg.distance(), 5.0));
    assert_eq!(leg.promoted_from().len(), 3);

    // round-trip: the originals come back exactly, in input order
    let originals: Vec<(f64, f64, f64)> = leg
        .promoted_from()
        .iter()
        .map(|shot| (shot.distance(), shot.azimuth(), shot.inclination()))
        .collect();
    assert_eq!(
        originals,
        vec![(5.00, 90.00, 0.4), (5.01, 90.05, -0.1), (4.99, 89.95, -0.3)]
    );
}

#[test]
fn test_live_walkthrough_two_promotions_and_queries() {
    init_tracing();
    let updater = SurveyUpdater::new(ReconcilePolicy::default());
    let mut survey = Survey::new();

    // a couple of wall splays that never promote
    updater.update(&mut survey, Leg::splay(0.9, 10.0, 60.0), InputMode::Forward).unwrap();
    updater.update(&mut survey, Leg::splay(1.4, 200.0, -60.0), InputMode::Forward).unwrap();

    // first station: three agreeing shots
    for (d, a) in [(5.00, 90.0), (5.01, 90.1), (4.99, 89.9)] {
        updater.update(&mut survey, Leg::splay(d, a, 0.0), InputMode::Forward).unwrap();
    }
    assert_eq!(survey.num_stations(), 2);

    // second station, from the new active station
    for (d, a) in [(3.50, 0.0), (3.51, 359.9), (3.49, 0.1)] {
        updater.update(&mut survey, Leg::splay(d, a, 2.0), InputMode::Forward).unwrap();
    }
    assert_eq!(survey.num_stations(), 3);

    // the wrap-straddling azimuths averaged to ~0, not 180
    let active = survey.active_station();
    let leg = survey.leg(survey.referring_leg(active).unwrap()).unwrap();
    assert!(leg.azimuth() < 0.1 || leg.azimuth() > 359.9);

    // chronological record: 2 splays + 2 connected legs
    let record = survey.leg_records();
    assert_eq!(record.len(), 4);
    assert_eq!(survey.last_n_legs(2).len(), 2);
    assert!(survey.check_integrity().is_ok());
}

#[test]
fn test_live_rename_collision_leaves_tree_unchanged() {
    init_tracing();
    let updater = SurveyUpdater::default();
    let mut survey = Survey::new();
    for (d, a) in [(5.0, 90.0), (5.0, 90.0), (5.0, 90.0)] {
        updater.update(&mut survey, Leg::splay(d, a, 0.0), InputMode::Forward).unwrap();
    }
    let station = survey.active_station();

    let result = updater.rename_station(&mut survey, station, "1");
    assert!(matches!(result, Err(SurveyError::NameInUse(_))));
    assert_eq!(survey.station(station).unwrap().name(), "2");
    assert!(survey.check_integrity().is_ok());
}

#[test]
fn test_live_direction_inheritance() {
    init_tracing();
    let updater = SurveyUpdater::default();
    let mut survey = Survey::new();
    let origin = survey.origin();
    updater
        .set_direction_of_subtree(&mut survey, origin, Direction::Left)
        .unwrap();

    for (d, a) in [(5.0, 90.0), (5.0, 90.0), (5.0, 90.0)] {
        updater.update(&mut survey, Leg::splay(d, a, 0.0), InputMode::Forward).unwrap();
    }
    let station = survey.active_station();
    assert_eq!(survey.station(station).unwrap().direction(), Direction::Left);
}

#[test]
fn test_shared_survey_cross_thread_entry() {
    init_tracing();
    let shared = SharedSurvey::new(Survey::new());
    let updater = SurveyUpdater::default();

    let handle = {
        let shared = shared.clone();
        let updater = updater.clone();
        std::thread::spawn(move || {
            shared.with(|survey| {
                updater.update(survey, Leg::splay(2.0, 10.0, 0.0), InputMode::Forward)
            })
        })
    };
    shared
        .with(|survey| updater.update(survey, Leg::splay(3.0, 200.0, 0.0), InputMode::Forward))
        .unwrap();
    handle.join().unwrap().unwrap();

    assert_eq!(shared.read(|survey| survey.num_legs()), 2);
    assert!(shared.read(|survey| survey.check_integrity()).is_ok());
}

// ─────────────────────────────────────────────────────────────────────────────
// SNAPSHOTS & CONTRACTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_survey_snapshot_round_trips_through_json() {
    init_tracing();
    let shots = branching_records();
    let trips = vec![Trip::new().with_comment("import test").with_declination(-0.8)];
    let outcome = BatchReconciler::default().reconcile(&shots, &trips, &[]).unwrap();

    let json = serde_json::to_string(&outcome.survey).unwrap();
    let restored: Survey = serde_json::from_str(&json).unwrap();

    assert_eq!(restored.num_stations(), outcome.survey.num_stations());
    assert_eq!(restored.num_legs(), outcome.survey.num_legs());
    assert_eq!(
        restored.trip().unwrap().comment,
        outcome.survey.trip().unwrap().comment
    );
    assert!(restored.check_integrity().is_ok());
}

#[test]
fn test_exporter_traversal_covers_every_leg_once() {
    init_tracing();
    let outcome = BatchReconciler::default()
        .reconcile(&branching_records(), &[], &[])
        .unwrap();
    let survey = outcome.survey;

    let walked = survey_kernel::traverse::collect_legs(&survey, survey.origin());
    assert_eq!(walked.len(), survey.num_legs());

    let mut seen = std::collections::BTreeSet::new();
    for (origin, leg_id) in &walked {
        assert!(seen.insert(*leg_id), "leg visited twice");
        assert_eq!(survey.originating_station(*leg_id), Some(*origin));
    }
}
