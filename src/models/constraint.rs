//! Pairwise constraints between task aspects.
//!
//! A constraint relates a *constrained* task aspect to either a
//! *constraining* task aspect or an absolute value, with an order and an
//! offset. The constraining side's value plus the offset is the reference
//! point; the order says where the constrained value must lie relative to
//! it.
//!
//! Both task references are set at most once. A constraint holding an
//! absolute value never gets a constraining task, and vice versa.
//!
//! # Reference
//! Brucker (2007), "Scheduling Algorithms", Ch. 2 (precedence relations)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::aspect::AspectType;
use super::task::OutcomeSource;
use crate::error::{PlanError, PlanResult};

static NEXT_CONSTRAINT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique constraint identifier from a process-wide monotonic counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstraintId(u64);

impl ConstraintId {
    /// Allocates the next identifier.
    pub fn next() -> Self {
        Self(NEXT_CONSTRAINT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// Where the constrained value lies relative to the reference point.
///
/// Non-temporal aspects use the comparison aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintOrder {
    Before = -1,
    Coincident = 0,
    After = 1,
}

impl ConstraintOrder {
    pub const LESS_THAN: ConstraintOrder = ConstraintOrder::Before;
    pub const EQUAL_TO: ConstraintOrder = ConstraintOrder::Coincident;
    pub const GREATER_THAN: ConstraintOrder = ConstraintOrder::After;

    /// Numeric code: -1, 0 or 1.
    #[inline]
    pub fn code(self) -> i8 {
        self as i8
    }

    /// Order for a numeric code.
    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            -1 => Some(ConstraintOrder::Before),
            0 => Some(ConstraintOrder::Coincident),
            1 => Some(ConstraintOrder::After),
            _ => None,
        }
    }
}

/// One end of a constraint: a live task aspect or a fixed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstraintEvent {
    Absolute {
        aspect_type: AspectType,
        value: f64,
    },
    Task {
        task_id: String,
        aspect_type: AspectType,
    },
}

impl ConstraintEvent {
    pub fn aspect_type(&self) -> AspectType {
        match self {
            ConstraintEvent::Absolute { aspect_type, .. }
            | ConstraintEvent::Task { aspect_type, .. } => *aspect_type,
        }
    }

    /// Task behind the event, `None` for absolute events.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            ConstraintEvent::Absolute { .. } => None,
            ConstraintEvent::Task { task_id, .. } => Some(task_id),
        }
    }

    /// Value from the task's estimated result.
    ///
    /// `None` when the task has no estimate, the estimate does not define
    /// the aspect, or the value is NaN.
    pub fn value(&self, outcomes: &dyn OutcomeSource) -> Option<f64> {
        match self {
            ConstraintEvent::Absolute { value, .. } => Some(*value).filter(|v| !v.is_nan()),
            ConstraintEvent::Task {
                task_id,
                aspect_type,
            } => outcomes
                .estimated_result(task_id)
                .and_then(|ar| ar.try_value(*aspect_type))
                .filter(|v| !v.is_nan()),
        }
    }

    /// Value from the task's received result.
    ///
    /// Absolute events return their fixed value.
    pub fn result_value(&self, outcomes: &dyn OutcomeSource) -> Option<f64> {
        match self {
            ConstraintEvent::Absolute { value, .. } => Some(*value).filter(|v| !v.is_nan()),
            ConstraintEvent::Task {
                task_id,
                aspect_type,
            } => outcomes
                .received_result(task_id)
                .and_then(|ar| ar.try_value(*aspect_type))
                .filter(|v| !v.is_nan()),
        }
    }
}

/// A directed relation between two task aspects, or a task aspect and a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    id: ConstraintId,
    order: ConstraintOrder,
    offset: f64,
    constrained_task: Option<String>,
    constrained_aspect: AspectType,
    constraining_task: Option<String>,
    constraining_aspect: AspectType,
    absolute_value: Option<f64>,
}

impl Constraint {
    /// Creates an unattached constraint on `aspect` with zero offset.
    pub fn new(aspect: AspectType, order: ConstraintOrder) -> Self {
        Self {
            id: ConstraintId::next(),
            order,
            offset: 0.0,
            constrained_task: None,
            constrained_aspect: aspect,
            constraining_task: None,
            constraining_aspect: aspect,
            absolute_value: None,
        }
    }

    /// Creates a task-to-task constraint.
    pub fn between(
        constrained_task: impl Into<String>,
        constrained_aspect: AspectType,
        constraining_task: impl Into<String>,
        constraining_aspect: AspectType,
        order: ConstraintOrder,
    ) -> Self {
        let mut c = Self::new(constrained_aspect, order);
        c.constrained_task = Some(constrained_task.into());
        c.constraining_task = Some(constraining_task.into());
        c.constraining_aspect = constraining_aspect;
        c
    }

    /// Creates a constraint against a fixed value of the same aspect.
    pub fn absolute(
        constrained_task: impl Into<String>,
        aspect: AspectType,
        value: f64,
        order: ConstraintOrder,
    ) -> Self {
        let mut c = Self::new(aspect, order);
        c.constrained_task = Some(constrained_task.into());
        c.absolute_value = Some(value);
        c
    }

    /// Sets the offset added to the constraining value.
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    // ================================
    // Accessors
    // ================================

    #[inline]
    pub fn id(&self) -> ConstraintId {
        self.id
    }

    #[inline]
    pub fn order(&self) -> ConstraintOrder {
        self.order
    }

    #[inline]
    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn constrained_task(&self) -> Option<&str> {
        self.constrained_task.as_deref()
    }

    pub fn constraining_task(&self) -> Option<&str> {
        self.constraining_task.as_deref()
    }

    #[inline]
    pub fn constrained_aspect(&self) -> AspectType {
        self.constrained_aspect
    }

    #[inline]
    pub fn constraining_aspect(&self) -> AspectType {
        self.constraining_aspect
    }

    pub fn absolute_value(&self) -> Option<f64> {
        self.absolute_value
    }

    /// Whether the constraining side is a fixed value.
    pub fn is_absolute(&self) -> bool {
        self.absolute_value.is_some()
    }

    /// Whether `task_id` is either end of this constraint.
    pub fn involves(&self, task_id: &str) -> bool {
        self.constrained_task() == Some(task_id) || self.constraining_task() == Some(task_id)
    }

    // ================================
    // Setters
    // ================================

    /// Attaches the constraining task.
    ///
    /// # Errors
    /// `ConstraintAttachment` if the constraint is absolute or the
    /// constraining task is already set.
    pub fn set_constraining_task(&mut self, task_id: impl Into<String>) -> PlanResult<()> {
        if self.is_absolute() {
            return Err(PlanError::ConstraintAttachment {
                reason: "constraint is absolute".into(),
            });
        }
        if self.constraining_task.is_some() {
            return Err(PlanError::ConstraintAttachment {
                reason: "constraining task already set".into(),
            });
        }
        self.constraining_task = Some(task_id.into());
        Ok(())
    }

    /// Attaches the constrained task.
    ///
    /// # Errors
    /// `ConstraintAttachment` if the constrained task is already set.
    pub fn set_constrained_task(&mut self, task_id: impl Into<String>) -> PlanResult<()> {
        if self.constrained_task.is_some() {
            return Err(PlanError::ConstraintAttachment {
                reason: "constrained task already set".into(),
            });
        }
        self.constrained_task = Some(task_id.into());
        Ok(())
    }

    /// Makes the constraint absolute.
    ///
    /// # Errors
    /// `ConstraintAttachment` if a constraining task is set.
    pub fn set_absolute_value(&mut self, value: f64) -> PlanResult<()> {
        if self.constraining_task.is_some() {
            return Err(PlanError::ConstraintAttachment {
                reason: "constraining task has already been set".into(),
            });
        }
        self.absolute_value = Some(value);
        Ok(())
    }

    pub fn set_order(&mut self, order: ConstraintOrder) {
        self.order = order;
    }

    pub fn set_offset(&mut self, offset: f64) {
        self.offset = offset;
    }

    pub fn set_constrained_aspect(&mut self, aspect: AspectType) {
        self.constrained_aspect = aspect;
    }

    pub fn set_constraining_aspect(&mut self, aspect: AspectType) {
        self.constraining_aspect = aspect;
    }

    // ================================
    // Events
    // ================================

    /// The constraining end.
    ///
    /// # Errors
    /// `ConstraintAttachment` when neither a task nor a value is set.
    pub fn constraining_event(&self) -> PlanResult<ConstraintEvent> {
        if let Some(value) = self.absolute_value {
            return Ok(ConstraintEvent::Absolute {
                aspect_type: self.constraining_aspect,
                value,
            });
        }
        match &self.constraining_task {
            Some(task_id) => Ok(ConstraintEvent::Task {
                task_id: task_id.clone(),
                aspect_type: self.constraining_aspect,
            }),
            None => Err(PlanError::ConstraintAttachment {
                reason: "the constraining task is not set".into(),
            }),
        }
    }

    /// The constrained end.
    ///
    /// # Errors
    /// `ConstraintAttachment` when the constrained task is not set.
    pub fn constrained_event(&self) -> PlanResult<ConstraintEvent> {
        match &self.constrained_task {
            Some(task_id) => Ok(ConstraintEvent::Task {
                task_id: task_id.clone(),
                aspect_type: self.constrained_aspect,
            }),
            None => Err(PlanError::ConstraintAttachment {
                reason: "the constrained task is not set".into(),
            }),
        }
    }

    /// A constrained value that satisfies this constraint.
    ///
    /// `constraining + offset`, moved by `epsilon` up for `Before` and
    /// down for `After`. `None` while the constraining value is undefined.
    ///
    /// # Errors
    /// `ConstraintAttachment` when the constraining end is not set.
    pub fn compute_valid_constrained_value(
        &self,
        outcomes: &dyn OutcomeSource,
        epsilon: f64,
    ) -> PlanResult<Option<f64>> {
        let Some(reference) = self.constraining_event()?.value(outcomes) else {
            return Ok(None);
        };
        let v = reference + self.offset;
        Ok(Some(match self.order {
            ConstraintOrder::Before => v + epsilon,
            ConstraintOrder::Coincident => v,
            ConstraintOrder::After => v - epsilon,
        }))
    }

    /// Whether a pair of defined values breaks this constraint.
    ///
    /// `diff = constrained - constraining + offset`; `Before` breaks on
    /// `diff <= 0`, `After` on `diff >= 0`, `Coincident` on `diff == 0`.
    pub fn is_broken_by(&self, constrained: f64, constraining: f64) -> bool {
        let diff = constrained - constraining + self.offset;
        match self.order {
            ConstraintOrder::Before => diff <= 0.0,
            ConstraintOrder::After => diff >= 0.0,
            ConstraintOrder::Coincident => diff == 0.0,
        }
    }

    /// Whether the two aspects can be compared.
    ///
    /// Equal aspects always can; differing aspects need a start or end
    /// time on one side.
    pub fn has_compatible_aspects(&self) -> bool {
        let timed = |a: AspectType| matches!(a, AspectType::StartTime | AspectType::EndTime);
        self.constrained_aspect == self.constraining_aspect
            || timed(self.constrained_aspect)
            || timed(self.constraining_aspect)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let constrained = self.constrained_task().unwrap_or("?");
        write!(f, "{} {}.{} {:?} ", self.id, constrained, self.constrained_aspect, self.order)?;
        match (self.absolute_value, self.constraining_task()) {
            (Some(v), _) => write!(f, "{v}")?,
            (None, Some(t)) => write!(f, "{t}.{}", self.constraining_aspect)?,
            (None, None) => f.write_str("?")?,
        }
        if self.offset != 0.0 {
            write!(f, " offset {}", self.offset)?;
        }
        Ok(())
    }
}
