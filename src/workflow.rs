//! Workflows: a parent task's expansion into subtasks.
//!
//! A [`Workflow`] owns the ordered subtask list, the constraints between
//! subtasks, and the aggregate [`AllocationResult`] last computed from the
//! subtasks' estimated results.
//!
//! # Outcomes
//! The workflow stores task IDs only. Current results are looked up
//! through an [`OutcomeSource`] (usually a
//! [`TaskBoard`](crate::models::TaskBoard)) passed to each call that needs
//! them.
//!
//! # Concurrency
//! All state sits behind one lock. Enumeration methods return snapshots,
//! so a concurrent removal never invalidates a caller's iteration.
//!
//! # Constraint checks
//! Violation testing compares values exactly, while
//! [`Constraint::compute_valid_constrained_value`] moves its answer by a
//! margin. Both behaviors are kept as they are.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::aggregation::{AllocationResultAggregator, DefaultAggregator, TaskScoreTable};
use crate::config::PlanConfig;
use crate::error::{PlanError, PlanResult};
use crate::models::{AllocationResult, Constraint, ConstraintId, OutcomeSource};

/// One subtask's entry in [`SubtaskResults`].
#[derive(Debug, Clone)]
pub struct SubtaskResult {
    pub task_id: String,
    /// Whether the subtask was reported changed since the last read.
    pub changed: bool,
    /// The subtask's current estimated result.
    pub result: Option<Arc<AllocationResult>>,
}

/// Snapshot of every subtask's result plus the aggregate.
#[derive(Debug, Clone, Default)]
pub struct SubtaskResults {
    pub subtasks: Vec<SubtaskResult>,
    pub aggregate: Option<Arc<AllocationResult>>,
}

impl SubtaskResults {
    /// IDs of subtasks flagged as changed.
    pub fn changed_task_ids(&self) -> Vec<&str> {
        self.subtasks
            .iter()
            .filter(|s| s.changed)
            .map(|s| s.task_id.as_str())
            .collect()
    }
}

struct WorkflowState {
    parent_task: Option<String>,
    subtasks: Vec<String>,
    constraints: Vec<Constraint>,
    aggregator: Arc<dyn AllocationResultAggregator>,
    /// False once a caller has installed its own aggregator.
    default_aggregator: bool,
    /// Rebuilt lazily after the subtask list changes.
    table: Option<TaskScoreTable>,
    changed: HashSet<String>,
    result: Option<Arc<AllocationResult>>,
    propagating: bool,
}

/// Subtasks, constraints and aggregate result of one expansion.
pub struct Workflow {
    id: String,
    config: PlanConfig,
    state: Mutex<WorkflowState>,
}

impl Workflow {
    /// Creates an empty workflow using the default aggregator.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            config: PlanConfig::default(),
            state: Mutex::new(WorkflowState {
                parent_task: None,
                subtasks: Vec::new(),
                constraints: Vec::new(),
                aggregator: Arc::new(DefaultAggregator::new()),
                default_aggregator: true,
                table: None,
                changed: HashSet::new(),
                result: None,
                propagating: true,
            }),
        }
    }

    /// Uses `config` for the constraint margin and, unless another
    /// aggregator was installed, the default aggregator's thresholds.
    pub fn with_config(mut self, config: PlanConfig) -> Self {
        let state = self.state.get_mut();
        if state.default_aggregator {
            state.aggregator = Arc::new(DefaultAggregator::with_config(&config));
        }
        self.config = config;
        self
    }

    /// Sets the parent task.
    pub fn with_parent_task(self, task_id: impl Into<String>) -> Self {
        self.state.lock().parent_task = Some(task_id.into());
        self
    }

    /// Sets the aggregator.
    pub fn with_aggregator(self, aggregator: Arc<dyn AllocationResultAggregator>) -> Self {
        self.set_allocation_result_aggregator(aggregator);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &PlanConfig {
        &self.config
    }

    pub fn parent_task(&self) -> Option<String> {
        self.state.lock().parent_task.clone()
    }

    pub fn set_parent_task(&self, task_id: impl Into<String>) {
        self.state.lock().parent_task = Some(task_id.into());
    }

    /// Replaces the aggregator used by later aggregations.
    pub fn set_allocation_result_aggregator(
        &self,
        aggregator: Arc<dyn AllocationResultAggregator>,
    ) {
        let mut state = self.state.lock();
        state.aggregator = aggregator;
        state.default_aggregator = false;
    }

    /// Whether changes propagate down to the subtasks. Defaults to `true`.
    pub fn is_propagating_to_subtasks(&self) -> bool {
        self.state.lock().propagating
    }

    pub fn set_propagating_to_subtasks(&self, propagating: bool) {
        self.state.lock().propagating = propagating;
    }

    // ================================
    // Subtasks
    // ================================

    /// Subtask IDs in insertion order.
    pub fn subtasks(&self) -> Vec<String> {
        self.state.lock().subtasks.clone()
    }

    pub fn subtask_count(&self) -> usize {
        self.state.lock().subtasks.len()
    }

    pub fn contains_task(&self, task_id: &str) -> bool {
        self.state.lock().subtasks.iter().any(|t| t == task_id)
    }

    /// Appends a subtask.
    ///
    /// # Errors
    /// `EmptyTaskId` for an empty ID, `DuplicateTask` if already present.
    pub fn add_task(&self, task_id: impl Into<String>) -> PlanResult<()> {
        let task_id = task_id.into();
        if task_id.is_empty() {
            return Err(PlanError::EmptyTaskId);
        }
        let mut state = self.state.lock();
        if state.subtasks.contains(&task_id) {
            return Err(PlanError::DuplicateTask { id: task_id });
        }
        state.subtasks.push(task_id);
        state.table = None;
        state.changed.clear();
        Ok(())
    }

    /// Removes a subtask. Returns `false` if it was not present.
    pub fn remove_task(&self, task_id: &str) -> bool {
        let mut state = self.state.lock();
        let Some(pos) = state.subtasks.iter().position(|t| t == task_id) else {
            tracing::warn!(
                workflow = %self.id,
                task = task_id,
                "removing a task that is not a subtask"
            );
            return false;
        };
        state.subtasks.remove(pos);
        state.changed.remove(task_id);
        state.table = None;
        true
    }

    /// Replaces all subtasks. Nothing changes if any ID is rejected.
    ///
    /// # Errors
    /// `EmptyTaskId` or `DuplicateTask` for the first bad ID.
    pub fn set_tasks<I, S>(&self, task_ids: I) -> PlanResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next: Vec<String> = Vec::new();
        for id in task_ids {
            let id = id.into();
            if id.is_empty() {
                return Err(PlanError::EmptyTaskId);
            }
            if next.contains(&id) {
                return Err(PlanError::DuplicateTask { id });
            }
            next.push(id);
        }
        let mut state = self.state.lock();
        state.subtasks = next;
        state.table = None;
        state.changed.clear();
        Ok(())
    }

    /// Removes and returns every subtask.
    pub fn clear_sub_tasks(&self) -> Vec<String> {
        let mut state = self.state.lock();
        state.table = None;
        state.changed.clear();
        std::mem::take(&mut state.subtasks)
    }

    // ================================
    // Constraints
    // ================================

    fn check_constraint(constraint: &Constraint) -> PlanResult<()> {
        if !constraint.has_compatible_aspects() {
            return Err(PlanError::IncompatibleConstraintAspects {
                constrained: constraint.constrained_aspect(),
                constraining: constraint.constraining_aspect(),
            });
        }
        constraint.constrained_event()?;
        constraint.constraining_event()?;
        Ok(())
    }

    /// Appends a constraint and returns its ID.
    ///
    /// # Errors
    /// `IncompatibleConstraintAspects` when the aspects cannot be compared,
    /// `ConstraintAttachment` when either end is unset.
    pub fn add_constraint(&self, constraint: Constraint) -> PlanResult<ConstraintId> {
        Self::check_constraint(&constraint)?;
        let id = constraint.id();
        self.state.lock().constraints.push(constraint);
        Ok(id)
    }

    /// Removes a constraint by ID.
    pub fn remove_constraint(&self, id: ConstraintId) -> Option<Constraint> {
        let mut state = self.state.lock();
        let pos = state.constraints.iter().position(|c| c.id() == id)?;
        Some(state.constraints.remove(pos))
    }

    /// Replaces all constraints. Nothing changes if any is rejected.
    ///
    /// # Errors
    /// As [`add_constraint`](Self::add_constraint).
    pub fn set_constraints(&self, constraints: Vec<Constraint>) -> PlanResult<()> {
        for c in &constraints {
            Self::check_constraint(c)?;
        }
        self.state.lock().constraints = constraints;
        Ok(())
    }

    /// All constraints in insertion order.
    pub fn constraints(&self) -> Vec<Constraint> {
        self.state.lock().constraints.clone()
    }

    /// Constraints with `task_id` on either end.
    pub fn task_constraints(&self, task_id: &str) -> Vec<Constraint> {
        self.state
            .lock()
            .constraints
            .iter()
            .filter(|c| c.involves(task_id))
            .cloned()
            .collect()
    }

    /// Constraints from `constraining` onto `constrained`.
    pub fn pair_constraints(&self, constrained: &str, constraining: &str) -> Vec<Constraint> {
        self.state
            .lock()
            .constraints
            .iter()
            .filter(|c| {
                c.constrained_task() == Some(constrained)
                    && c.constraining_task() == Some(constraining)
            })
            .cloned()
            .collect()
    }

    /// Whether the received outcome of the constrained task breaks `c`.
    ///
    /// `false` while either value is undefined.
    pub fn is_constraint_violated(&self, c: &Constraint, outcomes: &dyn OutcomeSource) -> bool {
        let (Ok(constraining), Ok(constrained)) = (c.constraining_event(), c.constrained_event())
        else {
            return false;
        };
        let Some(reference) = constraining.value(outcomes) else {
            return false;
        };
        let Some(actual) = constrained.result_value(outcomes) else {
            return false;
        };
        c.is_broken_by(actual, reference)
    }

    /// Whether the estimated outcome of the constrained task breaks `c`,
    /// or is still undefined.
    ///
    /// `false` while the constraining value is undefined.
    pub fn is_constraint_pending_or_violated(
        &self,
        c: &Constraint,
        outcomes: &dyn OutcomeSource,
    ) -> bool {
        let (Ok(constraining), Ok(constrained)) = (c.constraining_event(), c.constrained_event())
        else {
            return false;
        };
        let Some(reference) = constraining.value(outcomes) else {
            return false;
        };
        match constrained.value(outcomes) {
            Some(estimate) => c.is_broken_by(estimate, reference),
            None => true,
        }
    }

    /// First constraint, in insertion order, that is pending or violated.
    pub fn next_pending_constraint(&self, outcomes: &dyn OutcomeSource) -> Option<Constraint> {
        self.constraints()
            .into_iter()
            .find(|c| self.is_constraint_pending_or_violated(c, outcomes))
    }

    /// Whether any constraint is violated.
    pub fn constraint_violation(&self, outcomes: &dyn OutcomeSource) -> bool {
        self.constraints()
            .iter()
            .any(|c| self.is_constraint_violated(c, outcomes))
    }

    /// Every violated constraint, in insertion order.
    pub fn violated_constraints(&self, outcomes: &dyn OutcomeSource) -> Vec<Constraint> {
        self.constraints()
            .into_iter()
            .filter(|c| self.is_constraint_violated(c, outcomes))
            .collect()
    }

    /// Value the constrained task should take to satisfy `c`.
    ///
    /// # Errors
    /// `ConstraintAttachment` when the constraining end is unset.
    pub fn valid_constrained_value(
        &self,
        c: &Constraint,
        outcomes: &dyn OutcomeSource,
    ) -> PlanResult<Option<f64>> {
        c.compute_valid_constrained_value(outcomes, self.config.constraint_epsilon)
    }

    // ================================
    // Aggregation
    // ================================

    /// Recomputes the aggregate result from the subtasks' estimates.
    ///
    /// `changed` names the subtasks whose results triggered this call;
    /// they are reported by the next [`subtask_results`](Self::subtask_results).
    /// Returns `None` while there are no subtasks or the aggregator cannot
    /// produce a result.
    pub fn aggregate_allocation_results<S: AsRef<str>>(
        &self,
        outcomes: &dyn OutcomeSource,
        changed: &[S],
    ) -> Option<Arc<AllocationResult>> {
        let mut state = self.state.lock();
        if state.subtasks.is_empty() {
            return None;
        }
        let state = &mut *state;
        let table = state
            .table
            .get_or_insert_with(|| TaskScoreTable::new(state.subtasks.iter().cloned()));
        for i in 0..table.len() {
            let estimate = table.task_id(i).and_then(|id| outcomes.estimated_result(id));
            table.set_result(i, estimate);
        }

        let result = state
            .aggregator
            .calculate(&self.id, table, state.result.as_ref());
        tracing::debug!(
            workflow = %self.id,
            aggregator = state.aggregator.name(),
            defined = result.is_some(),
            "aggregated subtask results"
        );
        state.result = result.clone();
        state
            .changed
            .extend(changed.iter().map(|s| s.as_ref().to_string()));
        result
    }

    /// The last aggregate result.
    pub fn allocation_result(&self) -> Option<Arc<AllocationResult>> {
        self.state.lock().result.clone()
    }

    /// Current per-subtask results and change flags.
    ///
    /// Clears the changed set.
    pub fn subtask_results(&self, outcomes: &dyn OutcomeSource) -> SubtaskResults {
        let mut state = self.state.lock();
        let subtasks = state
            .subtasks
            .iter()
            .map(|id| SubtaskResult {
                task_id: id.clone(),
                changed: state.changed.contains(id),
                result: outcomes.estimated_result(id),
            })
            .collect();
        state.changed.clear();
        SubtaskResults {
            subtasks,
            aggregate: state.result.clone(),
        }
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Workflow")
            .field("id", &self.id)
            .field("parent_task", &state.parent_task)
            .field("subtasks", &state.subtasks.len())
            .field("constraints", &state.constraints.len())
            .field("aggregator", &state.aggregator.name())
            .finish()
    }
}
