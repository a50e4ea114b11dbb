//! Reconciliation policy: tolerances and thresholds.
//!
//! Everything that decides whether two shots are "the same measurement" is
//! collected here and passed explicitly to the averaging functions and the
//! engines. Nothing in the kernel reads ambient configuration.

use serde::{Deserialize, Serialize};

/// Tolerances and thresholds governing shot reconciliation.
///
/// ## Parameters
///
/// - `max_distance_delta`: spread in metres within which repeat distances
///   still count as the same shot
/// - `max_angle_delta`: spread in degrees applied to both azimuth (after
///   wrap-aware re-centering) and inclination
/// - `repeats_for_promotion`: how many agreeing splays in a row promote into
///   a new connected station during live entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilePolicy {
    /// Maximum distance spread in metres.
    pub max_distance_delta: f64,
    /// Maximum angular spread in degrees (azimuth and inclination).
    pub max_angle_delta: f64,
    /// Number of agreeing repeat shots that trigger promotion.
    pub repeats_for_promotion: usize,
}

impl ReconcilePolicy {
    /// Create a policy with custom parameters.
    ///
    /// Negative deltas are clamped to zero; the repeat threshold is clamped
    /// to at least 2 (promoting a single shot is meaningless).
    pub fn new(
        max_distance_delta: f64,
        max_angle_delta: f64,
        repeats_for_promotion: usize,
    ) -> Self {
        Self {
            max_distance_delta: max_distance_delta.max(0.0),
            max_angle_delta: max_angle_delta.max(0.0),
            repeats_for_promotion: repeats_for_promotion.max(2),
        }
    }
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            max_distance_delta: 0.2,
            max_angle_delta: 1.7,
            repeats_for_promotion: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps() {
        let policy = ReconcilePolicy::new(-1.0, -5.0, 0);
        assert_eq!(policy.max_distance_delta, 0.0);
        assert_eq!(policy.max_angle_delta, 0.0);
        assert_eq!(policy.repeats_for_promotion, 2);
    }

    #[test]
    fn test_default_threshold() {
        assert_eq!(ReconcilePolicy::default().repeats_for_promotion, 3);
    }
}
