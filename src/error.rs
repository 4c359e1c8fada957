//! Error type shared by the planning core.
//!
//! Every fallible boundary call returns [`PlanResult`]. Undefined
//! intermediate states (no subtask result yet, empty schedule) are not
//! errors; they are reported as `None` by the operation itself.

use thiserror::Error;

use crate::models::AspectType;

/// Result alias used across the crate.
pub type PlanResult<T> = Result<T, PlanError>;

/// Failure conditions of the planning core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanError {
    /// An aspect array holds a duplicate key or a non-numeric value.
    #[error("invalid aspect set: {reason}")]
    InvalidAspectSet { reason: String },

    /// Confidence rating outside `[0, 1]`.
    #[error("confidence rating {value} is outside [0, 1]")]
    InvalidConfidence { value: f64 },

    /// Lookup of an aspect the result does not define.
    #[error("aspect {aspect} is not defined in this result")]
    UndefinedAspect { aspect: AspectType },

    #[error("auxiliary query index {index} is out of range")]
    InvalidAuxiliaryQuery { index: usize },

    /// Piecewise-linear curve failed validation.
    #[error("invalid scoring curve: {reason}")]
    InvalidCurve { reason: String },

    /// Aspect type name or code registered twice.
    #[error("aspect type '{name}' is already registered")]
    DuplicateAspectType { name: String },

    /// Constraint end re-set, or absolute value mixed with a constraining task.
    #[error("constraint attachment: {reason}")]
    ConstraintAttachment { reason: String },

    /// Constrained and constraining aspects cannot be compared.
    #[error("incompatible constraint aspects {constrained} and {constraining}")]
    IncompatibleConstraintAspects {
        constrained: AspectType,
        constraining: AspectType,
    },

    #[error("task '{id}' is not known here")]
    UnknownTask { id: String },

    #[error("task '{id}' is already present")]
    DuplicateTask { id: String },

    #[error("task id cannot be empty")]
    EmptyTaskId,

    /// Element does not match the schedule's element type.
    #[error("schedule element type mismatch: expected {expected}, found {found}")]
    ElementTypeMismatch { expected: String, found: String },

    /// Operation only permitted on an empty schedule.
    #[error("schedule must be empty to {operation}")]
    ScheduleNotEmpty { operation: &'static str },

    /// Interval algebra requires value-bearing elements.
    #[error("schedule elements are not value-bearing")]
    NotValueBearing,

    #[error("aggregation '{id}' is not part of this composition")]
    UnknownAggregation { id: String },
}
