//! Planning domain models.
//!
//! Provides the value types the planning core computes over: aspects and
//! their registry, allocation results, tasks with preferences, pairwise
//! constraints, and interval schedules.
//!
//! # Domain Mappings
//!
//! | u-plan | Logistics | Manufacturing | Healthcare |
//! |--------|-----------|---------------|------------|
//! | Task | Shipment | Job/Order | Patient Case |
//! | AllocationResult | Movement plan outcome | Routing outcome | Booking outcome |
//! | Constraint | Leg ordering | Operation precedence | Procedure order |
//! | Schedule | Inventory curve | Capacity profile | Bed occupancy |

mod allocation_result;
mod aspect;
pub mod aspect_registry;
mod constraint;
mod schedule;
mod task;

pub use allocation_result::{AllocationResult, AuxiliaryQueries};
pub use aspect::{
    aspect_sets_equal, aspect_sets_nearly_equal, aspect_sets_nearly_equal_within,
    check_aspect_set, nearly_equal, AspectType, AspectValue, AuxiliaryQueryType, ExtensionCode,
    ValueKind, AQTYPE_COUNT, CORE_ASPECT_COUNT, STANDARD_ASPECT_COUNT,
};
pub use aspect_registry::AspectTypeRegistry;
pub use constraint::{Constraint, ConstraintEvent, ConstraintId, ConstraintOrder};
pub use schedule::{ElementType, Schedule, ScheduleElement, DEFAULT_SCHEDULE_TYPE};
pub use task::{OutcomeSource, Preference, Task, TaskBoard};
