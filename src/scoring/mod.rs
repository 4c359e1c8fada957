//! Scoring functions: preference curves from an aspect value to a score.
//!
//! A score lies in `[BEST, WORST]` = `[0.0, 1.0]`; lower is better. Each
//! function is bound to one aspect type and answers four questions:
//!
//! - [`ScoringFunction::score`]: the score of a value.
//! - [`ScoringFunction::best`]: a value with the lowest score.
//! - [`ScoringFunction::min_in_range`] / [`ScoringFunction::max_in_range`]:
//!   extreme scores inside a closed query range.
//! - [`ScoringFunction::valid_ranges`]: sub-ranges of a query range that
//!   score better than WORST.
//!
//! # Shapes
//!
//! | Shape | Score |
//! |-------|-------|
//! | `StrictValue` | BEST at the point, WORST elsewhere |
//! | `PreferredValue` | `slope * |v - p|`, capped at WORST |
//! | `StrictBetween` | BEST inside `[low, high]`, WORST outside |
//! | `StrictBetweenWithBest` | as `StrictBetween`, with a designated best |
//! | `V` | `ok` at the edges, BEST at `best`, WORST outside |
//! | `PreferredBetween` | BEST inside, sloping to WORST outside |
//! | `NearOrAbove` | WORST below the point, sloping up above it |
//! | `NearOrBelow` | WORST above the point, sloping up below it |
//! | `Step` | one score before the change point, another from it on |
//! | `Enumerated` | listed points only, WORST elsewhere |
//! | `Constant` | one score everywhere |
//! | `PiecewiseLinear` | interpolated curve, flat beyond its ends |
//!
//! Two-sided shapes (`V`, `StrictBetween*`, `PreferredBetween`) only
//! report BEST for a range query when the range reaches their basin;
//! otherwise the answer degrades to the nearer edge.

mod piecewise;

pub use piecewise::{check_valid_curve, ScorePoints};

use serde::{Deserialize, Serialize};

use crate::error::PlanResult;
use crate::models::{AspectType, AspectValue};

/// Lowest valid score.
pub const LOW_THRESHOLD: f64 = 0.0;
/// Highest valid score.
pub const HIGH_THRESHOLD: f64 = 1.0;
/// Best score.
pub const BEST: f64 = LOW_THRESHOLD;
/// Worst score.
pub const WORST: f64 = HIGH_THRESHOLD;
/// Typical satisfactory score.
pub const OK: f64 = 0.5;

/// An aspect value together with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectScorePoint {
    pub aspect_value: AspectValue,
    pub score: f64,
}

impl AspectScorePoint {
    pub fn new(aspect_value: AspectValue, score: f64) -> Self {
        Self {
            aspect_value,
            score,
        }
    }

    /// Convenience constructor from a type and scalar.
    pub fn of(aspect_type: AspectType, value: f64, score: f64) -> Self {
        Self::new(AspectValue::new(aspect_type, value), score)
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.aspect_value.value()
    }

    #[inline]
    pub fn aspect_type(&self) -> AspectType {
        self.aspect_value.aspect_type()
    }
}

/// Closed range between two scored points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectScoreRange {
    pub start: AspectScorePoint,
    pub end: AspectScorePoint,
}

impl AspectScoreRange {
    pub fn new(start: AspectScorePoint, end: AspectScorePoint) -> Self {
        Self { start, end }
    }
}

/// A preference curve over one aspect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScoringFunction {
    StrictValue {
        point: AspectValue,
    },
    PreferredValue {
        point: AspectValue,
        slope: f64,
    },
    StrictBetween {
        low: AspectValue,
        high: AspectValue,
    },
    StrictBetweenWithBest {
        low: AspectValue,
        best: AspectValue,
        high: AspectValue,
    },
    V {
        low: AspectValue,
        best: AspectValue,
        high: AspectValue,
        ok: f64,
    },
    PreferredBetween {
        low: AspectValue,
        high: AspectValue,
        slope: f64,
    },
    NearOrAbove {
        point: AspectValue,
        slope: f64,
    },
    NearOrBelow {
        point: AspectValue,
        slope: f64,
    },
    Step {
        point: AspectValue,
        pre_score: f64,
        post_score: f64,
    },
    Enumerated {
        points: ScorePoints,
    },
    Constant {
        score: f64,
        aspect_type: AspectType,
    },
    PiecewiseLinear {
        curve: ScorePoints,
    },
}

use ScoringFunction as SF;

fn scored(av: &AspectValue, score: f64) -> AspectScorePoint {
    AspectScorePoint::new(av.clone(), score)
}

fn half_width(slope: f64) -> f64 {
    if slope == 0.0 {
        0.0
    } else {
        1.0 / slope
    }
}

impl ScoringFunction {
    // ================================
    // Constructors
    // ================================

    /// BEST exactly at `value`, WORST elsewhere.
    pub fn strict_value(value: AspectValue) -> Self {
        SF::StrictValue { point: value }
    }

    /// Symmetric V around `value`: `min(WORST, slope * |v - value|)`.
    pub fn preferred_value(value: AspectValue, slope: f64) -> Self {
        SF::PreferredValue {
            point: value,
            slope,
        }
    }

    /// BEST inside `[low, high]`, WORST outside.
    pub fn strict_between(low: AspectValue, high: AspectValue) -> Self {
        SF::StrictBetween { low, high }
    }

    /// As [`strict_between`](Self::strict_between), with `best` reported as best.
    pub fn strict_between_with_best(
        low: AspectValue,
        best: AspectValue,
        high: AspectValue,
    ) -> Self {
        SF::StrictBetweenWithBest { low, best, high }
    }

    /// V hanging from a pedestal: `OK` at the edges, BEST at `best`.
    pub fn v_shaped(low: AspectValue, best: AspectValue, high: AspectValue) -> Self {
        Self::v_shaped_with_ok(low, best, high, OK)
    }

    /// V with a custom edge score.
    pub fn v_shaped_with_ok(
        low: AspectValue,
        best: AspectValue,
        high: AspectValue,
        ok: f64,
    ) -> Self {
        SF::V {
            low,
            best,
            high,
            ok,
        }
    }

    /// BEST inside `[low, high]`, rising with `slope` outside.
    pub fn preferred_between(low: AspectValue, high: AspectValue, slope: f64) -> Self {
        SF::PreferredBetween { low, high, slope }
    }

    /// WORST below `value`, rising with `slope` above it.
    pub fn near_or_above(value: AspectValue, slope: f64) -> Self {
        SF::NearOrAbove {
            point: value,
            slope,
        }
    }

    /// WORST above `value`, rising with `slope` below it.
    pub fn near_or_below(value: AspectValue, slope: f64) -> Self {
        SF::NearOrBelow {
            point: value,
            slope,
        }
    }

    /// `pre_score` before `change_point`, `post_score` from it on.
    pub fn step(change_point: AspectValue, pre_score: f64, post_score: f64) -> Self {
        SF::Step {
            point: change_point,
            pre_score,
            post_score,
        }
    }

    /// Discrete set of scored values.
    ///
    /// # Errors
    /// `InvalidCurve` when `points` is empty.
    pub fn enumerated(points: Vec<AspectScorePoint>) -> PlanResult<Self> {
        Ok(SF::Enumerated {
            points: ScorePoints::new(points)?,
        })
    }

    /// The same score for every value.
    pub fn constant(score: f64, aspect_type: AspectType) -> Self {
        SF::Constant { score, aspect_type }
    }

    /// Piecewise-linear curve, lenient.
    ///
    /// Curve problems other than emptiness are logged at error level and
    /// the function is built anyway; scores then follow the curve as given.
    ///
    /// # Errors
    /// `InvalidCurve` when `curve` is empty.
    pub fn piecewise_linear(curve: Vec<AspectScorePoint>) -> PlanResult<Self> {
        if let Err(err) = check_valid_curve(&curve) {
            tracing::error!(error = %err, points = curve.len(), "bad scoring function curve");
        }
        Ok(SF::PiecewiseLinear {
            curve: ScorePoints::new(curve)?,
        })
    }

    /// Piecewise-linear curve, strict.
    ///
    /// # Errors
    /// `InvalidCurve` on any curve violation.
    pub fn try_piecewise_linear(curve: Vec<AspectScorePoint>) -> PlanResult<Self> {
        check_valid_curve(&curve)?;
        Ok(SF::PiecewiseLinear {
            curve: ScorePoints::new(curve)?,
        })
    }

    // ================================
    // Queries
    // ================================

    /// Aspect this function scores.
    pub fn aspect_type(&self) -> AspectType {
        match self {
            SF::StrictValue { point }
            | SF::PreferredValue { point, .. }
            | SF::NearOrAbove { point, .. }
            | SF::NearOrBelow { point, .. }
            | SF::Step { point, .. } => point.aspect_type(),
            SF::StrictBetween { low, .. }
            | SF::StrictBetweenWithBest { low, .. }
            | SF::V { low, .. }
            | SF::PreferredBetween { low, .. } => low.aspect_type(),
            SF::Enumerated { points } => points.first().aspect_type(),
            SF::Constant { aspect_type, .. } => *aspect_type,
            SF::PiecewiseLinear { curve } => curve.first().aspect_type(),
        }
    }

    /// Score of `value`.
    pub fn score(&self, value: &AspectValue) -> f64 {
        let v = value.value();
        match self {
            SF::StrictValue { point } => {
                if v == point.value() {
                    BEST
                } else {
                    WORST
                }
            }
            SF::PreferredValue { point, slope } => (slope * (v - point.value()).abs()).min(WORST),
            SF::StrictBetween { low, high } | SF::StrictBetweenWithBest { low, high, .. } => {
                if value.is_between(low, high) {
                    BEST
                } else {
                    WORST
                }
            }
            SF::V {
                low,
                best,
                high,
                ok,
            } => {
                if !value.is_between(low, high) {
                    return WORST;
                }
                let b = best.value();
                if v == b {
                    return BEST;
                }
                let p = if v < b { low.value() } else { high.value() };
                // ok at p, BEST at b, linear between
                ok + (v - p) * (BEST - ok) / (b - p)
            }
            SF::PreferredBetween { low, high, slope } => {
                if value.is_less_than(low) {
                    (slope * low.minus(value)).min(WORST)
                } else if value.is_greater_than(high) {
                    (slope * value.minus(high)).min(WORST)
                } else {
                    BEST
                }
            }
            SF::NearOrAbove { point, slope } => {
                if value.is_less_than(point) {
                    WORST
                } else {
                    (slope * value.minus(point)).min(WORST)
                }
            }
            SF::NearOrBelow { point, slope } => {
                if value.is_greater_than(point) {
                    WORST
                } else {
                    (slope * point.minus(value)).min(WORST)
                }
            }
            SF::Step {
                point,
                pre_score,
                post_score,
            } => {
                if value.is_less_than(point) {
                    *pre_score
                } else {
                    *post_score
                }
            }
            SF::Enumerated { points } => points
                .as_slice()
                .iter()
                .find(|p| p.value() == v)
                .map_or(WORST, |p| p.score),
            SF::Constant { score, .. } => *score,
            SF::PiecewiseLinear { curve } => piecewise::score_at(curve, v),
        }
    }

    /// A value with the lowest score.
    ///
    /// Every shape except `Step`, `Enumerated` and `Constant` reports a
    /// BEST-scoring point; those three report their own lowest score.
    pub fn best(&self) -> AspectScorePoint {
        match self {
            SF::StrictValue { point }
            | SF::PreferredValue { point, .. }
            | SF::NearOrAbove { point, .. }
            | SF::NearOrBelow { point, .. } => scored(point, BEST),
            SF::StrictBetween { low, .. } | SF::PreferredBetween { low, .. } => scored(low, BEST),
            SF::StrictBetweenWithBest { best, .. } | SF::V { best, .. } => scored(best, BEST),
            SF::Step {
                point,
                pre_score,
                post_score,
            } => {
                let low_score = pre_score.min(*post_score);
                let at_point = self.score(point);
                if at_point == low_score {
                    return scored(point, low_score);
                }
                let p = point.value();
                if p == 0.0 {
                    return scored(point, at_point);
                }
                if p < 0.0 {
                    return scored(&point.dup(p - 1.0), low_score);
                }
                // somewhere in (0, p)
                let mut away = 1.0;
                while p - away <= 0.0 {
                    away *= 0.1;
                }
                scored(&point.dup(p - away), low_score)
            }
            SF::Enumerated { points } => {
                let mut best = points.first();
                for p in points.as_slice() {
                    if p.score < best.score {
                        best = p;
                    }
                }
                best.clone()
            }
            SF::Constant { score, aspect_type } => AspectScorePoint::of(*aspect_type, 0.0, *score),
            SF::PiecewiseLinear { curve } => piecewise::best(curve),
        }
    }

    /// Lowest-scoring point within `[lower, upper]`.
    ///
    /// `None` for `Enumerated` when no listed point is in range, and for
    /// `PiecewiseLinear` when the lowest score is WORST.
    pub fn min_in_range(
        &self,
        lower: &AspectValue,
        upper: &AspectValue,
    ) -> Option<AspectScorePoint> {
        let lb = || scored(lower, self.score(lower));
        let ub = || scored(upper, self.score(upper));
        let p = match self {
            SF::StrictValue { point } => {
                if point.is_between(lower, upper) {
                    scored(point, BEST)
                } else {
                    scored(lower, WORST)
                }
            }
            SF::PreferredValue { point, .. } => {
                if point.is_between(lower, upper) {
                    scored(point, BEST)
                } else if upper.is_less_than(point) {
                    ub()
                } else {
                    lb()
                }
            }
            SF::StrictBetween { low, high } => strict_between_min(low, high, lower, upper),
            SF::StrictBetweenWithBest { low, best, high } => {
                if best.is_between(lower, upper) {
                    scored(best, BEST)
                } else {
                    strict_between_min(low, high, lower, upper)
                }
            }
            SF::V {
                low,
                best,
                high,
                ok,
            } => {
                if best.is_between(lower, upper) {
                    scored(best, BEST)
                } else if low.is_greater_than(upper) {
                    scored(upper, WORST)
                } else if high.is_less_than(lower) {
                    scored(lower, WORST)
                } else if low.value() == upper.value() {
                    scored(upper, *ok)
                } else if high.value() == lower.value() {
                    scored(lower, *ok)
                } else if upper.is_less_than(best) {
                    // on the downslope
                    ub()
                } else {
                    lb()
                }
            }
            SF::PreferredBetween { low, high, .. } => {
                if low.is_between(lower, upper) && high.is_between(lower, upper) {
                    let half = lower.dup((low.value() + high.value()) / 2.0);
                    let s = self.score(&half);
                    scored(&half, s)
                } else if lower.is_between(low, high) {
                    lb()
                } else if upper.is_between(low, high) {
                    ub()
                } else {
                    let (l, u) = (lb(), ub());
                    if l.score < u.score {
                        l
                    } else {
                        u
                    }
                }
            }
            SF::NearOrAbove { point, .. } => {
                if point.is_between(lower, upper) {
                    scored(point, BEST)
                } else if point.is_greater_than(upper) {
                    scored(upper, WORST)
                } else {
                    lb()
                }
            }
            SF::NearOrBelow { point, .. } => {
                if point.is_between(lower, upper) {
                    scored(point, BEST)
                } else if point.is_greater_than(upper) {
                    ub()
                } else {
                    lb()
                }
            }
            SF::Step { .. } => {
                let (l, u) = (lb(), ub());
                if l.score < u.score {
                    l
                } else {
                    u
                }
            }
            SF::Enumerated { points } => {
                return enumerated_extreme(points, lower, upper, |s, found| s < found)
            }
            SF::Constant { score, .. } => scored(lower, *score),
            SF::PiecewiseLinear { curve } => return piecewise::min_in_range(curve, lower, upper),
        };
        Some(p)
    }

    /// Highest-scoring point within `[lower, upper]`.
    ///
    /// `None` for `Enumerated` when no listed point is in range, and for
    /// `PiecewiseLinear` when the highest score is BEST.
    pub fn max_in_range(
        &self,
        lower: &AspectValue,
        upper: &AspectValue,
    ) -> Option<AspectScorePoint> {
        let higher_end = || {
            let (l, u) = (self.score(lower), self.score(upper));
            if l > u {
                scored(lower, l)
            } else {
                scored(upper, u)
            }
        };
        let p = match self {
            SF::StrictValue { point } => {
                if point.value() == lower.value() && point.value() == upper.value() {
                    scored(point, BEST)
                } else {
                    scored(lower, WORST)
                }
            }
            SF::StrictBetween { low, high } | SF::StrictBetweenWithBest { low, high, .. } => {
                if !lower.is_between(low, high) {
                    scored(lower, WORST)
                } else if !upper.is_between(low, high) {
                    scored(upper, WORST)
                } else {
                    scored(lower, BEST)
                }
            }
            SF::PreferredValue { .. }
            | SF::V { .. }
            | SF::PreferredBetween { .. }
            | SF::NearOrAbove { .. }
            | SF::NearOrBelow { .. }
            | SF::Step { .. } => higher_end(),
            SF::Enumerated { points } => {
                return enumerated_extreme(points, lower, upper, |s, found| s > found)
            }
            SF::Constant { score, .. } => scored(upper, *score),
            SF::PiecewiseLinear { curve } => return piecewise::max_in_range(curve, lower, upper),
        };
        Some(p)
    }

    /// Sub-ranges of `[lower, upper]` whose score is better than WORST.
    ///
    /// Ranges are clipped to the query; endpoints carry their own scores.
    /// An empty vector means nothing in the query range is acceptable.
    pub fn valid_ranges(&self, lower: &AspectValue, upper: &AspectValue) -> Vec<AspectScoreRange> {
        let whole = || {
            vec![AspectScoreRange::new(
                scored(lower, self.score(lower)),
                scored(upper, self.score(upper)),
            )]
        };
        match self {
            SF::StrictValue { point } => {
                if point.is_between(lower, upper) {
                    vec![AspectScoreRange::new(scored(point, BEST), scored(point, BEST))]
                } else {
                    Vec::new()
                }
            }
            SF::PreferredValue { point, slope } => {
                if *slope <= 0.0 {
                    return whole();
                }
                let d = half_width(*slope);
                self.clipped(point.value() - d, point.value() + d, lower, upper)
            }
            SF::StrictBetween { low, high }
            | SF::StrictBetweenWithBest { low, high, .. }
            | SF::V { low, high, .. } => self.clipped(low.value(), high.value(), lower, upper),
            SF::PreferredBetween { low, high, slope } => {
                if *slope <= 0.0 {
                    return whole();
                }
                let d = half_width(*slope);
                self.clipped(low.value() - d, high.value() + d, lower, upper)
            }
            SF::NearOrAbove { point, slope } => {
                let (lb, ub) = (self.score(lower), self.score(upper));
                if lb < WORST && ub < WORST {
                    return whole();
                }
                if !point.is_between(lower, upper) && lb >= WORST && ub >= WORST {
                    return Vec::new();
                }
                let start = if lower.is_less_than(point) {
                    scored(point, self.score(point))
                } else {
                    scored(lower, lb)
                };
                let end = if ub < WORST {
                    scored(upper, ub)
                } else {
                    scored(&point.dup(point.value() + half_width(*slope)), WORST)
                };
                vec![AspectScoreRange::new(start, end)]
            }
            SF::NearOrBelow { point, slope } => {
                let (lb, ub) = (self.score(lower), self.score(upper));
                if lb < WORST && ub < WORST {
                    return whole();
                }
                if !point.is_between(lower, upper) && lb >= WORST && ub >= WORST {
                    return Vec::new();
                }
                let start = if lb < WORST {
                    scored(lower, lb)
                } else {
                    scored(&point.dup(point.value() - half_width(*slope)), WORST)
                };
                let end = if ub < WORST {
                    scored(upper, ub)
                } else {
                    scored(point, self.score(point))
                };
                vec![AspectScoreRange::new(start, end)]
            }
            SF::Step {
                point,
                pre_score,
                post_score,
            } => {
                let (lb, ub) = (self.score(lower), self.score(upper));
                if (*pre_score < WORST && *post_score < WORST) || (lb < WORST && ub < WORST) {
                    return whole();
                }
                if point.is_between(lower, upper) {
                    if *pre_score >= WORST {
                        vec![AspectScoreRange::new(
                            scored(point, *post_score),
                            scored(upper, *post_score),
                        )]
                    } else {
                        vec![AspectScoreRange::new(
                            scored(lower, *pre_score),
                            scored(point, *post_score),
                        )]
                    }
                } else {
                    Vec::new()
                }
            }
            SF::Enumerated { points } => points
                .as_slice()
                .iter()
                .filter(|p| p.aspect_value.is_between(lower, upper) && p.score < WORST)
                .map(|p| AspectScoreRange::new(p.clone(), p.clone()))
                .collect(),
            SF::Constant { score, .. } => {
                if *score < WORST {
                    whole()
                } else {
                    Vec::new()
                }
            }
            SF::PiecewiseLinear { curve } => piecewise::valid_ranges(curve, lower, upper),
        }
    }

    /// Range over which the function is differentiated.
    ///
    /// Unbounded for every shape but `PiecewiseLinear`, whose range runs
    /// from its first to its last curve point.
    pub fn defined_range(&self) -> AspectScoreRange {
        match self {
            SF::PiecewiseLinear { curve } => {
                AspectScoreRange::new(curve.first().clone(), curve.last().clone())
            }
            _ => {
                let t = self.aspect_type();
                let lo = AspectValue::new(t, f64::NEG_INFINITY);
                let hi = AspectValue::new(t, f64::INFINITY);
                AspectScoreRange::new(
                    scored(&lo, self.score(&lo)),
                    scored(&hi, self.score(&hi)),
                )
            }
        }
    }

    /// `[from, to]` intersected with the query range.
    fn clipped(
        &self,
        from: f64,
        to: f64,
        lower: &AspectValue,
        upper: &AspectValue,
    ) -> Vec<AspectScoreRange> {
        let s = from.max(lower.value());
        let e = to.min(upper.value());
        if s > e {
            return Vec::new();
        }
        let (sv, ev) = (lower.dup(s), lower.dup(e));
        vec![AspectScoreRange::new(
            scored(&sv, self.score(&sv)),
            scored(&ev, self.score(&ev)),
        )]
    }
}

fn strict_between_min(
    low: &AspectValue,
    high: &AspectValue,
    lower: &AspectValue,
    upper: &AspectValue,
) -> AspectScorePoint {
    if lower.is_between(low, high) {
        scored(lower, BEST)
    } else if upper.is_between(low, high) {
        scored(upper, BEST)
    } else if low.is_between(lower, upper) && high.is_between(lower, upper) {
        scored(&lower.dup((low.value() + high.value()) / 2.0), BEST)
    } else {
        scored(upper, WORST)
    }
}

fn enumerated_extreme(
    points: &ScorePoints,
    lower: &AspectValue,
    upper: &AspectValue,
    better: impl Fn(f64, f64) -> bool,
) -> Option<AspectScorePoint> {
    let mut found: Option<&AspectScorePoint> = None;
    for p in points.as_slice() {
        if p.aspect_value.is_between(lower, upper)
            && found.map_or(true, |f| better(p.score, f.score))
        {
            found = Some(p);
        }
    }
    found.cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(v: f64) -> AspectValue {
        AspectValue::new(AspectType::StartTime, v)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-10
    }

    fn all_shapes() -> Vec<ScoringFunction> {
        vec![
            SF::strict_value(t(50.0)),
            SF::preferred_value(t(50.0), 0.1),
            SF::strict_between(t(40.0), t(60.0)),
            SF::strict_between_with_best(t(40.0), t(55.0), t(60.0)),
            SF::v_shaped(t(40.0), t(50.0), t(60.0)),
            SF::preferred_between(t(40.0), t(60.0), 0.05),
            SF::near_or_above(t(50.0), 0.1),
            SF::near_or_below(t(50.0), 0.1),
            SF::piecewise_linear(vec![
                AspectScorePoint::new(t(0.0), 1.0),
                AspectScorePoint::new(t(50.0), 0.0),
                AspectScorePoint::new(t(100.0), 1.0),
            ])
            .unwrap(),
        ]
    }

    #[test]
    fn test_best_scores_best() {
        for sf in all_shapes() {
            let b = sf.best();
            assert_eq!(b.score, BEST, "{sf:?}");
            assert_eq!(sf.score(&b.aspect_value), BEST, "{sf:?}");
        }
    }

    #[test]
    fn test_scores_stay_in_unit_interval() {
        for sf in all_shapes() {
            for i in -20..=120 {
                let s = sf.score(&t(i as f64));
                assert!((BEST..=WORST).contains(&s), "{sf:?} at {i}: {s}");
            }
        }
    }

    // ---------------- single point ----------------

    #[test]
    fn test_strict_value() {
        let sf = SF::strict_value(t(50.0));
        assert_eq!(sf.score(&t(50.0)), BEST);
        assert_eq!(sf.score(&t(50.1)), WORST);
        assert_eq!(sf.min_in_range(&t(0.0), &t(100.0)).unwrap().score, BEST);
        let miss = sf.min_in_range(&t(60.0), &t(100.0)).unwrap();
        assert_eq!(miss.score, WORST);
        assert!(approx(miss.value(), 60.0));
        assert_eq!(sf.max_in_range(&t(50.0), &t(50.0)).unwrap().score, BEST);
        assert_eq!(sf.max_in_range(&t(0.0), &t(100.0)).unwrap().score, WORST);
        assert_eq!(sf.valid_ranges(&t(0.0), &t(100.0)).len(), 1);
        assert!(sf.valid_ranges(&t(60.0), &t(100.0)).is_empty());
    }

    #[test]
    fn test_preferred_value() {
        let sf = SF::preferred_value(t(50.0), 0.1);
        assert!(approx(sf.score(&t(45.0)), 0.5));
        assert_eq!(sf.score(&t(0.0)), WORST);

        let below = sf.min_in_range(&t(10.0), &t(40.0)).unwrap();
        assert!(approx(below.value(), 40.0));
        assert!(approx(below.score, 1.0));
        let above = sf.min_in_range(&t(52.0), &t(90.0)).unwrap();
        assert!(approx(above.value(), 52.0));
        assert!(approx(above.score, 0.2));

        let max = sf.max_in_range(&t(48.0), &t(55.0)).unwrap();
        assert!(approx(max.value(), 55.0));

        let r = sf.valid_ranges(&t(0.0), &t(100.0));
        assert!(approx(r[0].start.value(), 40.0));
        assert!(approx(r[0].end.value(), 60.0));
        let r = sf.valid_ranges(&t(45.0), &t(100.0));
        assert!(approx(r[0].start.value(), 45.0));
    }

    // ---------------- basins ----------------

    #[test]
    fn test_strict_between_min_edges() {
        let sf = SF::strict_between(t(40.0), t(60.0));
        // starts inside
        let p = sf.min_in_range(&t(50.0), &t(90.0)).unwrap();
        assert_eq!(p.score, BEST);
        assert!(approx(p.value(), 50.0));
        // ends inside
        let p = sf.min_in_range(&t(0.0), &t(45.0)).unwrap();
        assert_eq!(p.score, BEST);
        assert!(approx(p.value(), 45.0));
        // surrounds
        let p = sf.min_in_range(&t(0.0), &t(100.0)).unwrap();
        assert_eq!(p.score, BEST);
        assert!(approx(p.value(), 50.0));
        // disjoint
        let p = sf.min_in_range(&t(70.0), &t(90.0)).unwrap();
        assert_eq!(p.score, WORST);
        assert!(approx(p.value(), 90.0));
    }

    #[test]
    fn test_strict_between_max_edges() {
        let sf = SF::strict_between(t(40.0), t(60.0));
        let p = sf.max_in_range(&t(30.0), &t(50.0)).unwrap();
        assert_eq!(p.score, WORST);
        assert!(approx(p.value(), 30.0));
        let p = sf.max_in_range(&t(45.0), &t(70.0)).unwrap();
        assert_eq!(p.score, WORST);
        assert!(approx(p.value(), 70.0));
        let p = sf.max_in_range(&t(45.0), &t(55.0)).unwrap();
        assert_eq!(p.score, BEST);
    }

    #[test]
    fn test_strict_between_with_best() {
        let sf = SF::strict_between_with_best(t(40.0), t(55.0), t(60.0));
        assert!(approx(sf.best().value(), 55.0));
        let p = sf.min_in_range(&t(50.0), &t(58.0)).unwrap();
        assert!(approx(p.value(), 55.0));
        // best outside the query, falls back to the basin rules
        let p = sf.min_in_range(&t(41.0), &t(45.0)).unwrap();
        assert!(approx(p.value(), 41.0));
        assert_eq!(p.score, BEST);
    }

    #[test]
    fn test_v_score() {
        let sf = SF::v_shaped(t(40.0), t(50.0), t(60.0));
        assert_eq!(sf.score(&t(50.0)), BEST);
        assert!(approx(sf.score(&t(40.0)), OK));
        assert!(approx(sf.score(&t(60.0)), OK));
        assert!(approx(sf.score(&t(45.0)), 0.25));
        assert!(approx(sf.score(&t(57.5)), 0.375));
        assert_eq!(sf.score(&t(39.0)), WORST);
        assert_eq!(sf.score(&t(61.0)), WORST);
    }

    #[test]
    fn test_v_best_at_edge() {
        let sf = SF::v_shaped(t(40.0), t(60.0), t(60.0));
        assert_eq!(sf.score(&t(60.0)), BEST);
        assert!(approx(sf.score(&t(50.0)), 0.25));
    }

    #[test]
    fn test_v_min_in_range_edges() {
        let sf = SF::v_shaped(t(40.0), t(50.0), t(60.0));
        // best in range
        assert_eq!(sf.min_in_range(&t(45.0), &t(55.0)).unwrap().score, BEST);
        // range entirely below the V
        let p = sf.min_in_range(&t(0.0), &t(30.0)).unwrap();
        assert_eq!(p.score, WORST);
        assert!(approx(p.value(), 30.0));
        // range entirely above the V
        let p = sf.min_in_range(&t(70.0), &t(80.0)).unwrap();
        assert_eq!(p.score, WORST);
        assert!(approx(p.value(), 70.0));
        // ends on low edge
        let p = sf.min_in_range(&t(30.0), &t(40.0)).unwrap();
        assert!(approx(p.score, OK));
        assert!(approx(p.value(), 40.0));
        // starts on high edge
        let p = sf.min_in_range(&t(60.0), &t(70.0)).unwrap();
        assert!(approx(p.score, OK));
        assert!(approx(p.value(), 60.0));
        // on the downslope: upper end is nearest the best
        let p = sf.min_in_range(&t(30.0), &t(45.0)).unwrap();
        assert!(approx(p.value(), 45.0));
        assert!(approx(p.score, 0.25));
        // on the upslope: lower end is nearest the best
        let p = sf.min_in_range(&t(55.0), &t(70.0)).unwrap();
        assert!(approx(p.value(), 55.0));
        assert!(approx(p.score, 0.25));
    }

    #[test]
    fn test_v_max_in_range_is_higher_end() {
        let sf = SF::v_shaped(t(40.0), t(50.0), t(60.0));
        let p = sf.max_in_range(&t(45.0), &t(58.0)).unwrap();
        assert!(approx(p.value(), 58.0));
        assert!(approx(p.score, 0.4));
        let p = sf.max_in_range(&t(30.0), &t(52.0)).unwrap();
        assert_eq!(p.score, WORST);
        assert!(approx(p.value(), 30.0));
    }

    #[test]
    fn test_v_valid_ranges() {
        let sf = SF::v_shaped(t(40.0), t(50.0), t(60.0));
        let r = sf.valid_ranges(&t(0.0), &t(100.0));
        assert_eq!(r.len(), 1);
        assert!(approx(r[0].start.score, OK));
        assert!(approx(r[0].end.score, OK));
        assert!(sf.valid_ranges(&t(70.0), &t(100.0)).is_empty());
    }

    #[test]
    fn test_preferred_between() {
        let sf = SF::preferred_between(t(40.0), t(60.0), 0.05);
        assert_eq!(sf.score(&t(50.0)), BEST);
        assert!(approx(sf.score(&t(30.0)), 0.5));
        assert!(approx(sf.score(&t(70.0)), 0.5));
        assert_eq!(sf.score(&t(100.0)), WORST);

        // spans the basin: midpoint
        let p = sf.min_in_range(&t(0.0), &t(100.0)).unwrap();
        assert!(approx(p.value(), 50.0));
        assert_eq!(p.score, BEST);
        // begins in the basin
        let p = sf.min_in_range(&t(55.0), &t(100.0)).unwrap();
        assert!(approx(p.value(), 55.0));
        assert_eq!(p.score, BEST);
        // ends in the basin
        let p = sf.min_in_range(&t(0.0), &t(45.0)).unwrap();
        assert!(approx(p.value(), 45.0));
        // outside: nearer end
        let p = sf.min_in_range(&t(62.0), &t(80.0)).unwrap();
        assert!(approx(p.value(), 62.0));
        assert!(approx(p.score, 0.1));

        let p = sf.max_in_range(&t(30.0), &t(65.0)).unwrap();
        assert!(approx(p.value(), 30.0));

        let r = sf.valid_ranges(&t(0.0), &t(200.0));
        assert!(approx(r[0].start.value(), 20.0));
        assert!(approx(r[0].end.value(), 80.0));
    }

    // ---------------- one-sided ----------------

    #[test]
    fn test_near_or_above() {
        let sf = SF::near_or_above(t(50.0), 0.1);
        assert_eq!(sf.score(&t(49.0)), WORST);
        assert!(approx(sf.score(&t(55.0)), 0.5));

        assert_eq!(sf.min_in_range(&t(40.0), &t(60.0)).unwrap().score, BEST);
        let p = sf.min_in_range(&t(10.0), &t(20.0)).unwrap();
        assert_eq!(p.score, WORST);
        assert!(approx(p.value(), 20.0));
        let p = sf.min_in_range(&t(52.0), &t(70.0)).unwrap();
        assert!(approx(p.value(), 52.0));

        let r = sf.valid_ranges(&t(52.0), &t(55.0));
        assert!(approx(r[0].start.value(), 52.0));
        assert!(approx(r[0].end.value(), 55.0));
        let r = sf.valid_ranges(&t(0.0), &t(100.0));
        assert!(approx(r[0].start.value(), 50.0));
        assert!(approx(r[0].end.value(), 60.0));
        assert!(sf.valid_ranges(&t(0.0), &t(40.0)).is_empty());
    }

    #[test]
    fn test_near_or_below() {
        let sf = SF::near_or_below(t(50.0), 0.1);
        assert_eq!(sf.score(&t(51.0)), WORST);
        assert!(approx(sf.score(&t(45.0)), 0.5));

        let p = sf.min_in_range(&t(60.0), &t(70.0)).unwrap();
        assert_eq!(p.score, WORST);
        let p = sf.min_in_range(&t(10.0), &t(48.0)).unwrap();
        assert!(approx(p.value(), 48.0));
        assert!(approx(p.score, 0.2));

        let r = sf.valid_ranges(&t(0.0), &t(100.0));
        assert!(approx(r[0].start.value(), 40.0));
        assert!(approx(r[0].end.value(), 50.0));
        assert!(sf.valid_ranges(&t(60.0), &t(100.0)).is_empty());
    }

    // ---------------- step / enumerated / constant ----------------

    #[test]
    fn test_step() {
        let late_is_bad = SF::step(t(100.0), 0.0, 1.0);
        assert_eq!(late_is_bad.score(&t(99.0)), 0.0);
        assert_eq!(late_is_bad.score(&t(100.0)), 1.0);
        let b = late_is_bad.best();
        assert_eq!(b.score, 0.0);
        assert!(approx(b.value(), 99.0));
        assert_eq!(late_is_bad.score(&b.aspect_value), 0.0);

        let r = late_is_bad.valid_ranges(&t(0.0), &t(200.0));
        assert!(approx(r[0].start.value(), 0.0));
        assert!(approx(r[0].end.value(), 100.0));

        let early_is_bad = SF::step(t(100.0), 1.0, 0.2);
        assert!(approx(early_is_bad.best().value(), 100.0));
        let r = early_is_bad.valid_ranges(&t(0.0), &t(200.0));
        assert!(approx(r[0].start.value(), 100.0));
        assert!(approx(r[0].end.value(), 200.0));
        assert!(early_is_bad.valid_ranges(&t(0.0), &t(50.0)).is_empty());

        let p = early_is_bad.min_in_range(&t(0.0), &t(200.0)).unwrap();
        assert!(approx(p.value(), 200.0));
        let p = early_is_bad.max_in_range(&t(0.0), &t(200.0)).unwrap();
        assert!(approx(p.value(), 0.0));
    }

    #[test]
    fn test_step_best_near_zero() {
        let sf = SF::step(t(0.5), 0.0, 1.0);
        let b = sf.best();
        assert!(b.value() > 0.0 && b.value() < 0.5);
        assert_eq!(b.score, 0.0);
        let neg = SF::step(t(-3.0), 0.0, 1.0);
        assert!(approx(neg.best().value(), -4.0));
    }

    #[test]
    fn test_enumerated() {
        let sf = SF::enumerated(vec![
            AspectScorePoint::new(t(10.0), 0.4),
            AspectScorePoint::new(t(20.0), 0.1),
            AspectScorePoint::new(t(30.0), 0.7),
        ])
        .unwrap();
        assert_eq!(sf.score(&t(20.0)), 0.1);
        assert_eq!(sf.score(&t(25.0)), WORST);
        assert!(approx(sf.best().value(), 20.0));

        let p = sf.min_in_range(&t(0.0), &t(15.0)).unwrap();
        assert!(approx(p.value(), 10.0));
        let p = sf.max_in_range(&t(0.0), &t(100.0)).unwrap();
        assert!(approx(p.value(), 30.0));
        assert!(sf.min_in_range(&t(40.0), &t(50.0)).is_none());
        assert_eq!(sf.valid_ranges(&t(15.0), &t(35.0)).len(), 2);
        assert!(SF::enumerated(vec![]).is_err());
    }

    #[test]
    fn test_constant() {
        let sf = SF::constant(0.3, AspectType::Cost);
        let c = |v| AspectValue::new(AspectType::Cost, v);
        assert_eq!(sf.score(&c(123.0)), 0.3);
        assert!(approx(sf.min_in_range(&c(1.0), &c(9.0)).unwrap().value(), 1.0));
        assert!(approx(sf.max_in_range(&c(1.0), &c(9.0)).unwrap().value(), 9.0));
        assert_eq!(sf.best().score, 0.3);
        assert_eq!(sf.valid_ranges(&c(1.0), &c(9.0)).len(), 1);
        assert!(SF::constant(WORST, AspectType::Cost)
            .valid_ranges(&c(1.0), &c(9.0))
            .is_empty());
    }

    // ---------------- piecewise ----------------

    #[test]
    fn test_piecewise_lenient_and_strict() {
        let bad = vec![
            AspectScorePoint::new(t(10.0), 0.5),
            AspectScorePoint::new(t(5.0), 0.5),
        ];
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        assert!(SF::piecewise_linear(bad.clone()).is_ok());
        assert!(SF::try_piecewise_linear(bad).is_err());
        assert!(SF::piecewise_linear(vec![]).is_err());
    }

    #[test]
    fn test_piecewise_defined_range() {
        let shapes = all_shapes();
        let r = shapes[8].defined_range();
        assert!(approx(r.start.value(), 0.0));
        assert!(approx(r.end.value(), 100.0));
        let open = SF::strict_value(t(1.0)).defined_range();
        assert!(open.start.value().is_infinite());
    }

    #[test]
    fn test_serde_round_trip() {
        for sf in all_shapes() {
            let json = serde_json::to_string(&sf).unwrap();
            let back: ScoringFunction = serde_json::from_str(&json).unwrap();
            assert_eq!(back, sf);
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn curve_strategy() -> impl Strategy<Value = Vec<AspectScorePoint>> {
            prop::collection::vec((1.0f64..50.0, 0.0f64..=1.0), 2..8).prop_map(|steps| {
                let mut x = 0.0;
                steps
                    .into_iter()
                    .map(|(dx, s)| {
                        x += dx;
                        AspectScorePoint::new(t(x), s)
                    })
                    .collect()
            })
        }

        proptest! {
            #[test]
            fn piecewise_score_is_bracketed(curve in curve_strategy(), frac in 0.0f64..=1.0) {
                let sf = ScoringFunction::try_piecewise_linear(curve.clone()).unwrap();
                for w in curve.windows(2) {
                    let x = w[0].value() + frac * (w[1].value() - w[0].value());
                    let s = sf.score(&t(x));
                    let lo = w[0].score.min(w[1].score);
                    let hi = w[0].score.max(w[1].score);
                    prop_assert!(s >= lo - 1e-9 && s <= hi + 1e-9);
                }
            }

            #[test]
            fn piecewise_min_not_above_max(
                curve in curve_strategy(),
                a in 0.0f64..400.0,
                b in 0.0f64..400.0
            ) {
                let sf = ScoringFunction::try_piecewise_linear(curve).unwrap();
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                let min = sf.min_in_range(&t(lo), &t(hi));
                let max = sf.max_in_range(&t(lo), &t(hi));
                if let (Some(min), Some(max)) = (min, max) {
                    prop_assert!(min.score <= max.score);
                }
                for r in sf.valid_ranges(&t(lo), &t(hi)) {
                    prop_assert!(r.start.value() >= lo && r.end.value() <= hi);
                    let mid = t((r.start.value() + r.end.value()) / 2.0);
                    prop_assert!(r.start.value() == r.end.value() || sf.score(&mid) < WORST);
                }
            }
        }
    }
}
