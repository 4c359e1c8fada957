//! Numeric tunables of the planning core.
//!
//! The defaults suit typical planning workloads; a host may load
//! a different set from JSON (or any serde format) and hand it to the
//! components that take one.

use serde::{Deserialize, Serialize};

/// Confidence change below which an aggregate is considered unchanged.
pub const SIGNIFICANT_CONFIDENCE_RATING_DELTA: f64 = 0.0001;

/// Margin applied when computing a value that satisfies a constraint.
pub const CONSTRAINT_EPSILON: f64 = 1.0;

/// Largest gap (time units) bridged when combining like intervals.
pub const COMBINE_GAP: i64 = 1000;

/// Relative tolerance of `AspectValue::nearly_equals`.
pub const NEARLY_EQUAL_EPSILON: f64 = 1e-9;

/// Planning core configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Aggregator change-detection threshold on confidence.
    pub confidence_delta: f64,
    /// Constraint satisfying-value margin.
    pub constraint_epsilon: f64,
    /// Gap bridged by `combine_like_elements`.
    pub combine_gap: i64,
    /// Tolerance for nearly-equal aspect comparisons.
    pub nearly_equal_epsilon: f64,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            confidence_delta: SIGNIFICANT_CONFIDENCE_RATING_DELTA,
            constraint_epsilon: CONSTRAINT_EPSILON,
            combine_gap: COMBINE_GAP,
            nearly_equal_epsilon: NEARLY_EQUAL_EPSILON,
        }
    }
}

impl PlanConfig {
    /// Sets the aggregator confidence threshold.
    pub fn with_confidence_delta(mut self, delta: f64) -> Self {
        self.confidence_delta = delta;
        self
    }

    /// Sets the constraint margin.
    pub fn with_constraint_epsilon(mut self, epsilon: f64) -> Self {
        self.constraint_epsilon = epsilon;
        self
    }

    /// Sets the like-element combine gap.
    pub fn with_combine_gap(mut self, gap: i64) -> Self {
        self.combine_gap = gap;
        self
    }

    /// Sets the nearly-equal tolerance.
    pub fn with_nearly_equal_epsilon(mut self, epsilon: f64) -> Self {
        self.nearly_equal_epsilon = epsilon;
        self
    }
}
