//! Property tests for the numeric routines and the reconcilers.

use proptest::prelude::*;

use survey_kernel::{
    average_azimuths, BatchReconciler, InputMode, Leg, ReconcilePolicy, ShotRecord, Survey,
    SurveyUpdater,
};

proptest! {
    /// Averages always land back on the circular domain.
    #[test]
    fn average_azimuths_stays_in_domain(
        azimuths in prop::collection::vec(0.0f64..360.0, 1..20)
    ) {
        let average = average_azimuths(&azimuths);
        prop_assert!((0.0..360.0).contains(&average), "got {average}");
    }

    /// A set symmetric around 0° averages to ~0°, never 180°.
    #[test]
    fn symmetric_sets_average_to_zero(offset in 0.01f64..90.0) {
        let average = average_azimuths(&[offset, 360.0 - offset]);
        let distance_from_zero = average.min(360.0 - average);
        prop_assert!(
            distance_from_zero < 1e-6,
            "{{{offset}, {}}} averaged to {average}",
            360.0 - offset
        );
    }

    /// Shifting every azimuth by the same rotation shifts the average by
    /// the same rotation (circular equivariance).
    #[test]
    fn average_is_rotation_equivariant(
        azimuths in prop::collection::vec(0.0f64..20.0, 2..8),
        rotation in 0.0f64..360.0,
    ) {
        let base = average_azimuths(&azimuths);
        let rotated: Vec<f64> = azimuths
            .iter()
            .map(|a| (a + rotation).rem_euclid(360.0))
            .collect();
        let shifted = average_azimuths(&rotated);
        let difference = (shifted - (base + rotation).rem_euclid(360.0)).abs();
        let wrapped = difference.min(360.0 - difference);
        prop_assert!(wrapped < 1e-6, "base {base}, rotation {rotation}, got {shifted}");
    }

    /// Promoting a run of agreeing splays preserves the original triples in
    /// input order.
    #[test]
    fn promotion_round_trips_originals(
        base_distance in 1.0f64..40.0,
        base_azimuth in 0.0f64..360.0,
        base_inclination in -60.0f64..60.0,
        jitter in prop::collection::vec((-0.04f64..0.04, -0.4f64..0.4), 3..=3),
    ) {
        let updater = SurveyUpdater::new(ReconcilePolicy::default());
        let mut survey = Survey::new();

        let shots: Vec<Leg> = jitter
            .iter()
            .map(|(distance_delta, angle_delta)| {
                Leg::splay(
                    base_distance + distance_delta,
                    (base_azimuth + angle_delta).rem_euclid(360.0),
                    base_inclination + angle_delta,
                )
            })
            .collect();

        let mut created = false;
        for shot in shots.clone() {
            created = updater.update(&mut survey, shot, InputMode::Forward).unwrap();
        }
        prop_assert!(created, "agreeing shots must promote");

        let origin = survey.origin();
        let leg_id = survey.station(origin).unwrap().legs()[0];
        let leg = survey.leg(leg_id).unwrap();
        prop_assert_eq!(leg.promoted_from().len(), 3);
        for (original, shot) in leg.promoted_from().iter().zip(&shots) {
            prop_assert_eq!(original, shot);
        }
        prop_assert!(survey.check_integrity().is_ok());
    }

    /// Batch reconciliation builds the same counts whatever order the
    /// records arrive in.
    #[test]
    fn batch_counts_are_order_independent(
        shuffled in Just(vec![
            ShotRecord::new("1", "2", 5.0, 90.0, 0.0),
            ShotRecord::new("2", "3", 4.0, 85.0, -2.0),
            ShotRecord::new("2", "4", 3.0, 180.0, 5.0),
            ShotRecord::new("4", "5", 2.5, 170.0, 1.0),
            ShotRecord::splay("3", 1.0, 10.0, 30.0),
            ShotRecord::splay("5", 0.7, 350.0, -20.0),
        ]).prop_shuffle()
    ) {
        let outcome = BatchReconciler::default()
            .reconcile(&shuffled, &[], &[])
            .unwrap();
        prop_assert!(outcome.unresolved.is_empty());
        prop_assert_eq!(outcome.survey.num_stations(), 5);
        prop_assert_eq!(outcome.survey.num_connected_legs(), 4);
        prop_assert_eq!(outcome.survey.num_legs(), 6);
        prop_assert!(outcome.survey.check_integrity().is_ok());
    }
}
