//! Task model and outcome lookup.
//!
//! A task is a unit of work handed to an allocator. It carries preferences
//! (one scoring function per aspect) and, once planned, an estimated and a
//! received [`AllocationResult`].
//!
//! Containers that only need "what is this task's current outcome" depend on
//! the [`OutcomeSource`] trait rather than on task storage. [`TaskBoard`] is
//! the in-memory implementation, an id-keyed arena of tasks.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::allocation_result::AllocationResult;
use super::aspect::{AspectType, AspectValue};
use crate::error::{PlanError, PlanResult};
use crate::scoring::ScoringFunction;

/// Weighted scoring function for one aspect of a task's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    aspect_type: AspectType,
    scoring_function: ScoringFunction,
    weight: f64,
}

impl Preference {
    /// Creates a preference with weight 1.0.
    pub fn new(aspect_type: AspectType, scoring_function: ScoringFunction) -> Self {
        Self {
            aspect_type,
            scoring_function,
            weight: 1.0,
        }
    }

    /// Sets the relative weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    #[inline]
    pub fn aspect_type(&self) -> AspectType {
        self.aspect_type
    }

    pub fn scoring_function(&self) -> &ScoringFunction {
        &self.scoring_function
    }

    #[inline]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// The most preferred value.
    pub fn best(&self) -> AspectValue {
        self.scoring_function.best().aspect_value
    }

    /// Score of `value` under this preference, unweighted.
    pub fn score(&self, value: &AspectValue) -> f64 {
        self.scoring_function.score(value)
    }
}

/// A unit of work with preferences and outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Preferences, at most one per aspect type.
    pub preferences: Vec<Preference>,
    /// Outcome the planner currently expects.
    #[serde(skip)]
    pub estimated_result: Option<Arc<AllocationResult>>,
    /// Outcome reported back by the allocator.
    #[serde(skip)]
    pub received_result: Option<Arc<AllocationResult>>,
}

impl Task {
    /// Creates a task with the given ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            preferences: Vec::new(),
            estimated_result: None,
            received_result: None,
        }
    }

    /// Sets the task name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a preference, replacing any existing one for the same aspect.
    pub fn with_preference(mut self, preference: Preference) -> Self {
        self.preferences
            .retain(|p| p.aspect_type() != preference.aspect_type());
        self.preferences.push(preference);
        self
    }

    /// Sets the estimated result.
    pub fn with_estimated_result(mut self, result: AllocationResult) -> Self {
        self.estimated_result = Some(Arc::new(result));
        self
    }

    /// Sets the received result.
    pub fn with_received_result(mut self, result: AllocationResult) -> Self {
        self.received_result = Some(Arc::new(result));
        self
    }

    /// Preference for `aspect_type`, if any.
    pub fn preference(&self, aspect_type: AspectType) -> Option<&Preference> {
        self.preferences
            .iter()
            .find(|p| p.aspect_type() == aspect_type)
    }

    /// Weighted mean preference score of `result`.
    ///
    /// Only preferences whose aspect the result defines contribute.
    /// Returns `None` when none do or the weights sum to zero.
    pub fn weighted_score(&self, result: &AllocationResult) -> Option<f64> {
        let mut total = 0.0;
        let mut weights = 0.0;
        for p in &self.preferences {
            if let Ok(av) = result.aspect_value(p.aspect_type()) {
                total += p.weight() * p.score(&av);
                weights += p.weight();
            }
        }
        if weights > 0.0 {
            Some(total / weights)
        } else {
            None
        }
    }
}

/// Current outcome of a task, looked up by ID.
pub trait OutcomeSource: Send + Sync {
    /// Outcome the planner currently expects for `task_id`.
    fn estimated_result(&self, task_id: &str) -> Option<Arc<AllocationResult>>;

    /// Outcome reported back for `task_id`.
    fn received_result(&self, task_id: &str) -> Option<Arc<AllocationResult>>;
}

/// In-memory task store keyed by ID.
#[derive(Debug, Default)]
pub struct TaskBoard {
    tasks: RwLock<HashMap<String, Task>>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task.
    ///
    /// # Errors
    /// `EmptyTaskId` for an empty ID, `DuplicateTask` if the ID is taken.
    pub fn insert(&self, task: Task) -> PlanResult<()> {
        if task.id.is_empty() {
            return Err(PlanError::EmptyTaskId);
        }
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&task.id) {
            return Err(PlanError::DuplicateTask { id: task.id });
        }
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    /// Removes and returns a task.
    pub fn remove(&self, id: &str) -> Option<Task> {
        self.tasks.write().remove(id)
    }

    /// Snapshot of a task.
    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// Sorted IDs of all tasks.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tasks.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Replaces the estimated result of a task.
    ///
    /// # Errors
    /// `UnknownTask` if no task has this ID.
    pub fn set_estimated_result(
        &self,
        id: &str,
        result: Option<Arc<AllocationResult>>,
    ) -> PlanResult<()> {
        let mut tasks = self.tasks.write();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| PlanError::UnknownTask { id: id.to_string() })?;
        task.estimated_result = result;
        Ok(())
    }

    /// Replaces the received result of a task.
    ///
    /// # Errors
    /// `UnknownTask` if no task has this ID.
    pub fn set_received_result(
        &self,
        id: &str,
        result: Option<Arc<AllocationResult>>,
    ) -> PlanResult<()> {
        let mut tasks = self.tasks.write();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| PlanError::UnknownTask { id: id.to_string() })?;
        task.received_result = result;
        Ok(())
    }
}

impl OutcomeSource for TaskBoard {
    fn estimated_result(&self, task_id: &str) -> Option<Arc<AllocationResult>> {
        self.tasks
            .read()
            .get(task_id)
            .and_then(|t| t.estimated_result.clone())
    }

    fn received_result(&self, task_id: &str) -> Option<Arc<AllocationResult>> {
        self.tasks
            .read()
            .get(task_id)
            .and_then(|t| t.received_result.clone())
    }
}
