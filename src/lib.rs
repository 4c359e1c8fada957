//! Planning core for multi-aspect task allocation.
//!
//! Provides the value model a planner reasons over: how an allocation
//! turned out (allocation results across aspects such as time, cost and
//! risk), how good that outcome is (scoring functions), how outcomes roll
//! up through a task hierarchy (aggregation and distribution), which
//! orderings must hold between tasks (constraints), and how value-bearing
//! time intervals combine (schedule interval algebra).
//!
//! # Modules
//!
//! - **`models`**: Domain types: `AspectValue`, `AllocationResult`, `Task`,
//!   `TaskBoard`, `Constraint`, `Schedule`
//! - **`scoring`**: `ScoringFunction` shapes mapping an aspect value to a
//!   score in `[0, 1]`
//! - **`aggregation`**: Workflow reduce (`AllocationResultAggregator`) and
//!   composition broadcast (`AllocationResultDistributor`)
//! - **`workflow`**: Subtasks, constraints and the aggregate result of an
//!   expansion
//! - **`composition`**: Parent tasks combined into one task
//! - **`intervals`**: Simplify, combine, add and subtract value schedules
//! - **`validation`**: Structural checks (duplicate IDs, unknown tasks,
//!   ordering cycles)
//! - **`config`**: Numeric tunables (`PlanConfig`)
//! - **`error`**: `PlanError`, `PlanResult`
//!
//! # Architecture
//!
//! Everything is synchronous and in-process. Containers store task IDs
//! and read outcomes through the `OutcomeSource` trait, so they never own
//! each other. Logging goes through `tracing`; no subscriber is installed.
//!
//! # References
//!
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems"
//! - Smith, S. F. (1994), "OPIS: A Methodology and Architecture for
//!   Reactive Scheduling"

pub mod aggregation;
pub mod composition;
pub mod config;
pub mod error;
pub mod intervals;
pub mod models;
pub mod scoring;
pub mod validation;
pub mod workflow;

pub use config::PlanConfig;
pub use error::{PlanError, PlanResult};
