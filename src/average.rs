//! Tolerance comparison and circular averaging for repeated shots.
//!
//! Azimuths live on a circle, so naive min/max and arithmetic means go wrong
//! near the 0/360 boundary: `{359, 1}` must compare as 2° apart and average
//! to 0, not 180. Both routines here re-map the values before doing ordinary
//! arithmetic:
//!
//! - comparison shifts every azimuth so the first leg's azimuth lands on
//!   180°, putting the whole cluster as far from the wrap as possible;
//! - averaging detects a straddling set (`max − min > 180`) and lifts the
//!   sub-180 values by a full turn before summing.

use crate::policy::ReconcilePolicy;
use crate::types::{normalize_azimuth, Leg};

/// Whether a set of splays all measure the same physical leg, within the
/// policy's tolerances.
///
/// Connected legs are unique by definition, so any connected leg in the set
/// (and the empty set) fails immediately. Otherwise the distance,
/// inclination, and wrap-adjusted azimuth spreads must each stay within the
/// configured deltas.
pub fn legs_are_about_the_same(legs: &[Leg], policy: &ReconcilePolicy) -> bool {
    let Some(first) = legs.first() else {
        return false;
    };
    if legs.iter().any(|leg| leg.has_destination()) {
        return false;
    }

    // Re-center the first azimuth at 180 so the cluster cannot straddle 0/360.
    let offset = 540.0 - first.azimuth();

    let mut min_distance = f64::INFINITY;
    let mut max_distance = f64::NEG_INFINITY;
    let mut min_azimuth = f64::INFINITY;
    let mut max_azimuth = f64::NEG_INFINITY;
    let mut min_inclination = f64::INFINITY;
    let mut max_inclination = f64::NEG_INFINITY;

    for leg in legs {
        min_distance = min_distance.min(leg.distance());
        max_distance = max_distance.max(leg.distance());
        let shifted = (leg.azimuth() + offset) % 360.0;
        min_azimuth = min_azimuth.min(shifted);
        max_azimuth = max_azimuth.max(shifted);
        min_inclination = min_inclination.min(leg.inclination());
        max_inclination = max_inclination.max(leg.inclination());
    }

    max_distance - min_distance <= policy.max_distance_delta
        && max_azimuth - min_azimuth <= policy.max_angle_delta
        && max_inclination - min_inclination <= policy.max_angle_delta
}

/// Average azimuth values, even when they span the 0/360 boundary.
///
/// Returns 0.0 for an empty set.
pub fn average_azimuths(azimuths: &[f64]) -> f64 {
    if azimuths.is_empty() {
        return 0.0;
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &azimuth in azimuths {
        min = min.min(azimuth);
        max = max.max(azimuth);
    }

    // A spread over 180 means the set straddles the wrap; lift the low half
    // by a full turn so the mean lands on the right side.
    let split_over_zero = max - min > 180.0;
    let sum: f64 = azimuths
        .iter()
        .map(|&azimuth| {
            if split_over_zero && azimuth < 180.0 {
                azimuth + 360.0
            } else {
                azimuth
            }
        })
        .sum();

    normalize_azimuth(sum / azimuths.len() as f64)
}

/// Average repeat shots into a single measurement.
///
/// Distance and inclination are arithmetic means; the azimuth mean is
/// wrap-aware. The result is a plain splay — callers attach destination and
/// provenance separately. Returns a zero splay for an empty set.
pub fn average_legs(legs: &[Leg]) -> Leg {
    if legs.is_empty() {
        return Leg::splay(0.0, 0.0, 0.0);
    }
    let count = legs.len() as f64;
    let distance = legs.iter().map(|leg| leg.distance()).sum::<f64>() / count;
    let inclination = legs.iter().map(|leg| leg.inclination()).sum::<f64>() / count;
    let azimuths: Vec<f64> = legs.iter().map(|leg| leg.azimuth()).collect();
    Leg::splay(distance, average_azimuths(&azimuths), inclination)
}

/// Whether two legs agree as a foresight/backsight pair.
pub fn legs_are_backsights(fore: &Leg, back: &Leg, policy: &ReconcilePolicy) -> bool {
    legs_are_about_the_same(&[fore.clone(), back.as_backsight()], policy)
}

/// Fold a foresight and a (possibly disagreeing) backsight into one averaged
/// foresight.
pub fn average_backsights(fore: &Leg, back: &Leg) -> Leg {
    average_legs(&[fore.clone(), back.as_backsight()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StationId;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_average_azimuths_across_wrap() {
        assert!(close(average_azimuths(&[359.0, 1.0]), 0.0));
        assert!(close(average_azimuths(&[350.0, 10.0]), 0.0));
        assert!(close(average_azimuths(&[355.0, 359.0, 3.0]), 359.0));
    }

    #[test]
    fn test_average_azimuths_plain() {
        assert!(close(average_azimuths(&[90.0, 100.0]), 95.0));
        assert!(close(average_azimuths(&[180.0]), 180.0));
        assert!(close(average_azimuths(&[]), 0.0));
    }

    #[test]
    fn test_about_the_same_within_tolerance() {
        let policy = ReconcilePolicy::default();
        let legs = [
            Leg::splay(5.00, 90.0, 0.0),
            Leg::splay(5.01, 90.05, 0.3),
            Leg::splay(4.99, 89.95, -0.2),
        ];
        assert!(legs_are_about_the_same(&legs, &policy));
    }

    #[test]
    fn test_about_the_same_across_wrap() {
        let policy = ReconcilePolicy::default();
        let legs = [Leg::splay(5.0, 359.5, 0.0), Leg::splay(5.0, 0.5, 0.0)];
        assert!(legs_are_about_the_same(&legs, &policy));
    }

    #[test]
    fn test_about_the_same_rejects_spread() {
        let policy = ReconcilePolicy::default();
        let distance_off = [Leg::splay(5.0, 90.0, 0.0), Leg::splay(5.5, 90.0, 0.0)];
        assert!(!legs_are_about_the_same(&distance_off, &policy));

        let azimuth_off = [Leg::splay(5.0, 90.0, 0.0), Leg::splay(5.0, 95.0, 0.0)];
        assert!(!legs_are_about_the_same(&azimuth_off, &policy));

        let inclination_off = [Leg::splay(5.0, 90.0, 0.0), Leg::splay(5.0, 90.0, 4.0)];
        assert!(!legs_are_about_the_same(&inclination_off, &policy));
    }

    #[test]
    fn test_about_the_same_rejects_connected_and_empty() {
        let policy = ReconcilePolicy::default();
        let connected = Leg::full(5.0, 90.0, 0.0, StationId::new(1));
        assert!(!legs_are_about_the_same(
            &[connected, Leg::splay(5.0, 90.0, 0.0)],
            &policy
        ));
        assert!(!legs_are_about_the_same(&[], &policy));
    }

    #[test]
    fn test_average_legs_means() {
        let legs = [
            Leg::splay(5.00, 90.0, 0.0),
            Leg::splay(5.01, 90.05, 0.5),
            Leg::splay(4.99, 89.95, -0.5),
        ];
        let averaged = average_legs(&legs);
        assert!(close(averaged.distance(), 5.0));
        assert!(close(averaged.azimuth(), 90.0));
        assert!(close(averaged.inclination(), 0.0));
        assert!(!averaged.has_destination());
        assert!(!averaged.was_promoted());
    }

    #[test]
    fn test_backsight_agreement() {
        let policy = ReconcilePolicy::default();
        let fore = Leg::splay(5.0, 90.0, 10.0);
        let back = Leg::splay(5.05, 270.1, -9.9);
        assert!(legs_are_backsights(&fore, &back, &policy));

        let stranger = Leg::splay(5.0, 180.0, 0.0);
        assert!(!legs_are_backsights(&fore, &stranger, &policy));
    }

    #[test]
    fn test_average_backsights() {
        let fore = Leg::splay(5.0, 90.0, 10.0);
        let back = Leg::splay(5.2, 270.0, -10.0);
        let averaged = average_backsights(&fore, &back);
        assert!(close(averaged.distance(), 5.1));
        assert!(close(averaged.azimuth(), 90.0));
        assert!(close(averaged.inclination(), 10.0));
    }
}
