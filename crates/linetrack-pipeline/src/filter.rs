//! Length and orientation filtering of detected segments.

use serde::{Deserialize, Serialize};

use crate::types::{LineSegment, PipelineError, SegmentSet};

/// Inclusive range of accepted segment angles, in degrees.
///
/// A segment has no preferred direction, so the test is made against
/// its orientation: the angle folded into `[0, 180)` is accepted if
/// some half-turn multiple of it lands inside `[lo, hi]`. Everything the
/// plain "angle or angle + 180 in range" test accepts is accepted here
/// too, plus the half-turn shifts that test misses (`[270, 360]` takes
/// -80, `[300, 500]` takes 10). A segment and its reverse always get
/// the same answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleRange {
    /// Lower bound in degrees.
    pub lo: f64,
    /// Upper bound in degrees.
    pub hi: f64,
}

impl AngleRange {
    /// Accept every orientation.
    pub const FULL: Self = Self { lo: 0.0, hi: 360.0 };

    /// Create a range.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] if a bound is not
    /// finite or `lo > hi`.
    pub fn new(lo: f64, hi: f64) -> Result<Self, PipelineError> {
        if !lo.is_finite() || !hi.is_finite() {
            return Err(PipelineError::InvalidArgument(format!(
                "angle range bounds must be finite, got [{lo}, {hi}]"
            )));
        }
        if lo > hi {
            return Err(PipelineError::InvalidArgument(format!(
                "angle range is inverted: [{lo}, {hi}]"
            )));
        }
        Ok(Self { lo, hi })
    }

    /// Whether a segment with direction `angle_deg` falls inside the range.
    #[must_use]
    pub fn contains_orientation(&self, angle_deg: f64) -> bool {
        if !angle_deg.is_finite() {
            return false;
        }
        let folded = angle_deg.rem_euclid(180.0);
        // Smallest half-turn multiple that reaches the lower bound.
        let turns = ((self.lo - folded) / 180.0).ceil();
        let candidate = turns.mul_add(180.0, folded);
        candidate <= self.hi
    }
}

impl Default for AngleRange {
    fn default() -> Self {
        Self::FULL
    }
}

/// Whether a single segment passes the length and angle tests.
///
/// Lengths are compared squared, so the sign of `min_length` is ignored.
#[must_use]
pub fn accepts(segment: &LineSegment, min_length: f64, range: &AngleRange) -> bool {
    segment.length_squared() >= min_length * min_length
        && range.contains_orientation(segment.angle())
}

/// Keep segments at least `min_length` long whose orientation lies in
/// `range`, preserving input order.
#[must_use = "returns the filtered segments"]
pub fn filter_segments(input: &SegmentSet, min_length: f64, range: &AngleRange) -> SegmentSet {
    input
        .iter()
        .filter(|s| accepts(s, min_length, range))
        .copied()
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn seg(x1: f64, y1: f64, x2: f64, y2: f64) -> LineSegment {
        LineSegment::new(x1, y1, x2, y2).unwrap()
    }

    fn set(segments: &[LineSegment]) -> SegmentSet {
        segments.iter().copied().collect()
    }

    #[test]
    fn short_segments_are_removed() {
        let input = set(&[seg(0.0, 0.0, 30.0, 0.0), seg(0.0, 0.0, 10.0, 0.0)]);
        let out = filter_segments(&input, 20.0, &AngleRange::FULL);
        assert_eq!(out, set(&[seg(0.0, 0.0, 30.0, 0.0)]));
    }

    #[test]
    fn length_bound_is_inclusive() {
        let input = set(&[seg(0.0, 0.0, 20.0, 0.0)]);
        assert_eq!(filter_segments(&input, 20.0, &AngleRange::FULL).len(), 1);
    }

    #[test]
    fn negative_min_length_acts_as_its_magnitude() {
        let input = set(&[seg(0.0, 0.0, 1.0, 0.0), seg(0.0, 0.0, 6.0, 0.0)]);
        let out = filter_segments(&input, -5.0, &AngleRange::FULL);
        assert_eq!(out, set(&[seg(0.0, 0.0, 6.0, 0.0)]));
    }

    #[test]
    fn plain_half_turn_test_is_a_subset() {
        // Directions a literal "angle or angle + 180" check would reject.
        let high = AngleRange::new(270.0, 360.0).unwrap();
        assert!(high.contains_orientation(-80.0));
        let wide = AngleRange::new(300.0, 500.0).unwrap();
        assert!(wide.contains_orientation(10.0));
        assert!(wide.contains_orientation(-170.0));

        let literal = |range: &AngleRange, a: f64| {
            (range.lo..=range.hi).contains(&a) || (range.lo..=range.hi).contains(&(a + 180.0))
        };
        for range in [high, wide, AngleRange::new(30.0, 60.0).unwrap()] {
            for tenth in -1800..=1800 {
                let a = f64::from(tenth) / 10.0;
                if literal(&range, a) {
                    assert!(range.contains_orientation(a), "{a} in {range:?}");
                }
            }
        }
    }

    #[test]
    fn full_range_keeps_every_long_segment() {
        let input = set(&[
            seg(0.0, 0.0, 25.0, 0.0),
            seg(25.0, 0.0, 0.0, 0.0),
            seg(0.0, 0.0, 0.0, 25.0),
            seg(0.0, 25.0, 0.0, 0.0),
            seg(0.0, 0.0, 20.0, -20.0),
        ]);
        assert_eq!(filter_segments(&input, 20.0, &AngleRange::FULL), input);
    }

    #[test]
    fn narrow_range_selects_by_orientation() {
        let horizontal = seg(0.0, 0.0, 30.0, 0.0);
        let vertical = seg(0.0, 0.0, 0.0, 30.0);
        let near_vertical = AngleRange::new(80.0, 100.0).unwrap();
        let out = filter_segments(&set(&[horizontal, vertical]), 0.0, &near_vertical);
        assert_eq!(out, set(&[vertical]));
    }

    #[test]
    fn reversed_segment_gets_same_verdict() {
        let ranges = [
            AngleRange::new(0.0, 360.0).unwrap(),
            AngleRange::new(80.0, 100.0).unwrap(),
            AngleRange::new(170.0, 190.0).unwrap(),
            AngleRange::new(-10.0, 10.0).unwrap(),
            AngleRange::new(-200.0, -150.0).unwrap(),
            AngleRange::new(300.0, 500.0).unwrap(),
            AngleRange::new(45.0, 45.0).unwrap(),
        ];
        let segments = [
            seg(0.0, 0.0, 10.0, 0.0),
            seg(0.0, 0.0, 10.0, 10.0),
            seg(0.0, 0.0, 0.0, 10.0),
            seg(0.0, 0.0, -10.0, 3.0),
            seg(5.0, 5.0, 1.0, -7.0),
        ];
        for range in &ranges {
            for s in &segments {
                assert_eq!(
                    range.contains_orientation(s.angle()),
                    range.contains_orientation(s.reversed().angle()),
                    "{s:?} in {range:?}"
                );
            }
        }
    }

    #[test]
    fn half_turn_multiples_are_accepted() {
        let range = AngleRange::new(170.0, 190.0).unwrap();
        assert!(range.contains_orientation(0.0));
        assert!(range.contains_orientation(180.0));
        assert!(range.contains_orientation(-5.0));
        assert!(!range.contains_orientation(90.0));

        let negative = AngleRange::new(-100.0, -80.0).unwrap();
        assert!(negative.contains_orientation(90.0));
        assert!(negative.contains_orientation(-90.0));
        assert!(!negative.contains_orientation(0.0));
    }

    #[test]
    fn zero_width_range_matches_exact_orientation() {
        let range = AngleRange::new(45.0, 45.0).unwrap();
        assert!(range.contains_orientation(45.0));
        assert!(range.contains_orientation(-135.0));
        assert!(!range.contains_orientation(46.0));
    }

    #[test]
    fn filtering_is_idempotent() {
        let input = set(&[
            seg(0.0, 0.0, 30.0, 1.0),
            seg(0.0, 0.0, 3.0, 40.0),
            seg(0.0, 0.0, 5.0, 5.0),
        ]);
        let range = AngleRange::new(-20.0, 20.0).unwrap();
        let once = filter_segments(&input, 20.0, &range);
        let twice = filter_segments(&once, 20.0, &range);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 1);
    }

    #[test]
    fn order_is_preserved() {
        let a = seg(0.0, 0.0, 40.0, 0.0);
        let b = seg(0.0, 10.0, 2.0, 10.0);
        let c = seg(0.0, 20.0, 50.0, 20.0);
        let out = filter_segments(&set(&[a, b, c]), 20.0, &AngleRange::FULL);
        assert_eq!(out.segments(), &[a, c]);
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let out = filter_segments(&SegmentSet::default(), 20.0, &AngleRange::FULL);
        assert!(out.is_empty());
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        assert!(AngleRange::new(10.0, 0.0).is_err());
        assert!(AngleRange::new(f64::NAN, 0.0).is_err());
        assert!(AngleRange::new(0.0, f64::INFINITY).is_err());
    }
}
