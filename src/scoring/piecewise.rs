//! Piecewise-linear score curves.
//!
//! A curve is a non-empty list of (value, score) points in non-decreasing
//! value order. Between two points the score is interpolated linearly; a
//! vertical segment (two points at the same value) takes the later
//! point's score; outside the curve the score stays flat at the boundary
//! point's score.
//!
//! Minimum and maximum over a closed range of such a function are attained
//! at a range end or at a curve vertex inside the range, so range queries
//! only evaluate those candidates.

use serde::{Deserialize, Serialize};

use super::{AspectScorePoint, AspectScoreRange, BEST, HIGH_THRESHOLD, LOW_THRESHOLD, WORST};
use crate::error::{PlanError, PlanResult};
use crate::models::AspectValue;

/// Non-empty ordered list of score points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<AspectScorePoint>", into = "Vec<AspectScorePoint>")]
pub struct ScorePoints(Vec<AspectScorePoint>);

impl ScorePoints {
    /// Wraps a point list.
    ///
    /// # Errors
    /// `InvalidCurve` when `points` is empty.
    pub fn new(points: Vec<AspectScorePoint>) -> PlanResult<Self> {
        if points.is_empty() {
            return Err(PlanError::InvalidCurve {
                reason: "empty point set".into(),
            });
        }
        Ok(Self(points))
    }

    pub fn as_slice(&self) -> &[AspectScorePoint] {
        &self.0
    }

    pub fn first(&self) -> &AspectScorePoint {
        &self.0[0]
    }

    pub fn last(&self) -> &AspectScorePoint {
        &self.0[self.0.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with slices.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<AspectScorePoint>> for ScorePoints {
    type Error = PlanError;

    fn try_from(points: Vec<AspectScorePoint>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<ScorePoints> for Vec<AspectScorePoint> {
    fn from(points: ScorePoints) -> Self {
        points.0
    }
}

/// Checks a curve for use by a piecewise-linear function.
///
/// Rules: non-empty, one aspect type throughout, no NaN, values
/// non-decreasing, no point repeating its predecessor, scores within
/// `[LOW_THRESHOLD, HIGH_THRESHOLD]`.
pub fn check_valid_curve(curve: &[AspectScorePoint]) -> PlanResult<()> {
    let invalid = |reason: String| Err(PlanError::InvalidCurve { reason });

    let Some(first) = curve.first() else {
        return invalid("empty point set".into());
    };
    let aspect = first.aspect_type();
    for (i, p) in curve.iter().enumerate() {
        if p.aspect_type() != aspect {
            return invalid(format!(
                "curve[{i}] aspect type is inconsistent ({} != {aspect})",
                p.aspect_type()
            ));
        }
        if p.value().is_nan() {
            return invalid(format!("curve[{i}] value is not a number"));
        }
        if p.score.is_nan() {
            return invalid(format!("curve[{i}] score is not a number"));
        }
        if !(LOW_THRESHOLD..=HIGH_THRESHOLD).contains(&p.score) {
            return invalid(format!("curve[{i}] score out of range ({})", p.score));
        }
        if i > 0 {
            let prev = &curve[i - 1];
            if p.value() < prev.value() {
                return invalid(format!(
                    "curve[{i}] value decreases ({} < {})",
                    p.value(),
                    prev.value()
                ));
            }
            if p.value() == prev.value() && p.score == prev.score {
                return invalid(format!("curve[{i}] repeats curve[{}]", i - 1));
            }
        }
    }
    Ok(())
}

/// Score of the curve at `x`.
pub fn score_at(curve: &ScorePoints, x: f64) -> f64 {
    let pts = curve.as_slice();
    for (i, c1) in pts.iter().enumerate() {
        let v1 = c1.value();
        if x < v1 {
            if i == 0 {
                return c1.score;
            }
            let c0 = &pts[i - 1];
            let v0 = c0.value();
            if v1 <= v0 {
                return c1.score;
            }
            let slope = (c1.score - c0.score) / (v1 - v0);
            return c0.score + (x - v0) * slope;
        }
    }
    curve.last().score
}

/// Lowest-scoring curve point, first on ties.
pub fn best(curve: &ScorePoints) -> AspectScorePoint {
    let mut best = curve.first();
    for p in curve.as_slice() {
        if p.score < best.score {
            best = p;
        }
    }
    best.clone()
}

/// Range ends plus every vertex strictly inside, ascending.
fn candidates(curve: &ScorePoints, lo: f64, hi: f64) -> Vec<f64> {
    let mut xs = vec![lo];
    xs.extend(
        curve
            .as_slice()
            .iter()
            .map(AspectScorePoint::value)
            .filter(|x| *x > lo && *x < hi),
    );
    if hi > lo {
        xs.push(hi);
    }
    xs.dedup();
    xs
}

fn extreme_in_range(
    curve: &ScorePoints,
    lower: &AspectValue,
    upper: &AspectValue,
    better: impl Fn(f64, f64) -> bool,
) -> AspectScorePoint {
    let mut found: Option<(f64, f64)> = None;
    for x in candidates(curve, lower.value(), upper.value()) {
        let s = score_at(curve, x);
        if found.map_or(true, |(_, fs)| better(s, fs)) {
            found = Some((x, s));
        }
    }
    let (x, s) = found.unwrap_or((lower.value(), score_at(curve, lower.value())));
    AspectScorePoint::new(lower.dup(x), s)
}

/// Lowest score within `[lower, upper]`, `None` when it is WORST.
pub fn min_in_range(
    curve: &ScorePoints,
    lower: &AspectValue,
    upper: &AspectValue,
) -> Option<AspectScorePoint> {
    let p = extreme_in_range(curve, lower, upper, |s, found| s < found);
    (p.score < WORST).then_some(p)
}

/// Highest score within `[lower, upper]`, `None` when it is BEST.
pub fn max_in_range(
    curve: &ScorePoints,
    lower: &AspectValue,
    upper: &AspectValue,
) -> Option<AspectScorePoint> {
    let p = extreme_in_range(curve, lower, upper, |s, found| s > found);
    (p.score > BEST).then_some(p)
}

/// Sub-ranges of `[lower, upper]` scoring below WORST.
///
/// Each linear piece is either entirely below WORST in its interior or
/// entirely at WORST, so it is enough to test piece midpoints. Adjacent
/// valid pieces are joined unless the shared vertex itself scores WORST;
/// a vertex that is valid on its own (a vertical jump) forms a point range.
pub fn valid_ranges(
    curve: &ScorePoints,
    lower: &AspectValue,
    upper: &AspectValue,
) -> Vec<AspectScoreRange> {
    let lo = lower.value();
    let hi = upper.value();
    if lo > hi {
        return Vec::new();
    }
    let point = |x: f64| AspectScorePoint::new(lower.dup(x), score_at(curve, x));
    let xs = candidates(curve, lo, hi);

    if xs.len() == 1 {
        let p = point(xs[0]);
        return if p.score < WORST {
            vec![AspectScoreRange::new(p.clone(), p)]
        } else {
            Vec::new()
        };
    }

    let mut out = Vec::new();
    let mut open: Option<f64> = None;
    for w in xs.windows(2) {
        let (a, b) = (w[0], w[1]);
        let piece_valid = score_at(curve, (a + b) / 2.0) < WORST;
        match (open, piece_valid) {
            (Some(start), true) => {
                if score_at(curve, a) >= WORST {
                    out.push(AspectScoreRange::new(point(start), point(a)));
                    open = Some(a);
                }
            }
            (Some(start), false) => {
                out.push(AspectScoreRange::new(point(start), point(a)));
                open = None;
            }
            (None, true) => open = Some(a),
            (None, false) => {
                if score_at(curve, a) < WORST
                    && out
                        .last()
                        .map_or(true, |r: &AspectScoreRange| r.end.value() < a)
                {
                    out.push(AspectScoreRange::new(point(a), point(a)));
                }
            }
        }
    }
    let last = xs[xs.len() - 1];
    match open {
        Some(start) => out.push(AspectScoreRange::new(point(start), point(last))),
        None => {
            if score_at(curve, last) < WORST {
                out.push(AspectScoreRange::new(point(last), point(last)));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AspectType;

    fn p(v: f64, s: f64) -> AspectScorePoint {
        AspectScorePoint::new(AspectValue::new(AspectType::Cost, v), s)
    }

    fn cost(v: f64) -> AspectValue {
        AspectValue::new(AspectType::Cost, v)
    }

    fn tent() -> ScorePoints {
        // 1.0 at 0, falls to 0.0 at 10, back to 1.0 at 20
        ScorePoints::new(vec![p(0.0, 1.0), p(10.0, 0.0), p(20.0, 1.0)]).unwrap()
    }

    #[test]
    fn test_check_valid_curve() {
        assert!(check_valid_curve(tent().as_slice()).is_ok());
        assert!(check_valid_curve(&[]).is_err());
        assert!(check_valid_curve(&[p(5.0, 0.1), p(4.0, 0.2)]).is_err());
        assert!(check_valid_curve(&[p(5.0, 0.1), p(5.0, 0.1)]).is_err());
        assert!(check_valid_curve(&[p(5.0, 0.1), p(6.0, 1.5)]).is_err());
        assert!(check_valid_curve(&[p(5.0, 0.1), p(f64::NAN, 0.5)]).is_err());
        let mixed = vec![
            p(0.0, 0.0),
            AspectScorePoint::new(AspectValue::new(AspectType::Risk, 1.0), 0.5),
        ];
        assert!(check_valid_curve(&mixed).is_err());
    }

    #[test]
    fn test_score_interpolates_and_flattens() {
        let c = tent();
        assert!((score_at(&c, -5.0) - 1.0).abs() < 1e-10);
        assert!((score_at(&c, 5.0) - 0.5).abs() < 1e-10);
        assert!((score_at(&c, 10.0) - 0.0).abs() < 1e-10);
        assert!((score_at(&c, 15.0) - 0.5).abs() < 1e-10);
        assert!((score_at(&c, 99.0) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_vertical_segment_takes_later_point() {
        let c = ScorePoints::new(vec![p(0.0, 0.0), p(10.0, 0.0), p(10.0, 1.0)]).unwrap();
        assert!((score_at(&c, 9.99) - 0.0).abs() < 1e-10);
        assert!((score_at(&c, 10.0) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_min_max_scan_every_segment() {
        let c = tent();
        let min = min_in_range(&c, &cost(2.0), &cost(18.0)).unwrap();
        assert!((min.value() - 10.0).abs() < 1e-10);
        assert!(min.score.abs() < 1e-10);

        let max = max_in_range(&c, &cost(2.0), &cost(15.0)).unwrap();
        assert!((max.value() - 2.0).abs() < 1e-10);
        assert!((max.score - 0.8).abs() < 1e-10);

        // entirely in the flat WORST tail
        assert!(min_in_range(&c, &cost(30.0), &cost(40.0)).is_none());
        // single BEST point
        assert!(max_in_range(&c, &cost(10.0), &cost(10.0)).is_none());
    }

    #[test]
    fn test_valid_ranges_clip_to_query() {
        let c = tent();
        let r = valid_ranges(&c, &cost(-10.0), &cost(30.0));
        assert_eq!(r.len(), 1);
        assert!((r[0].start.value() - 0.0).abs() < 1e-10);
        assert!((r[0].end.value() - 20.0).abs() < 1e-10);

        let r = valid_ranges(&c, &cost(5.0), &cost(12.0));
        assert_eq!(r.len(), 1);
        assert!((r[0].start.value() - 5.0).abs() < 1e-10);
        assert!((r[0].end.value() - 12.0).abs() < 1e-10);

        assert!(valid_ranges(&c, &cost(25.0), &cost(30.0)).is_empty());
    }

    #[test]
    fn test_valid_ranges_split_at_worst_vertex() {
        // two basins touching WORST at 10
        let c = ScorePoints::new(vec![
            p(0.0, 1.0),
            p(5.0, 0.0),
            p(10.0, 1.0),
            p(15.0, 0.0),
            p(20.0, 1.0),
        ])
        .unwrap();
        let r = valid_ranges(&c, &cost(0.0), &cost(20.0));
        assert_eq!(r.len(), 2);
        assert!((r[0].end.value() - 10.0).abs() < 1e-10);
        assert!((r[1].start.value() - 10.0).abs() < 1e-10);
    }

    #[test]
    fn test_best_is_lowest_point() {
        let b = best(&tent());
        assert!((b.value() - 10.0).abs() < 1e-10);
        assert_eq!(b.score, 0.0);
    }

    #[test]
    fn test_empty_points_rejected_by_serde() {
        let r: Result<ScorePoints, _> = serde_json::from_str("[]");
        assert!(r.is_err());
    }
}
