//! Structural validation of tasks and workflows.
//!
//! Reports every problem found rather than stopping at the first.
//! Detects:
//! - Duplicate or empty task IDs
//! - Preferences with unusable weights
//! - Subtasks and constraint ends that name unknown tasks
//! - Circular ordering among task-to-task constraints
//!
//! # Reference
//! Cormen et al. (2009), "Introduction to Algorithms", Ch. 22.4 (Topological Sort)

use std::collections::{HashMap, HashSet};

use crate::models::{ConstraintOrder, Task, TaskBoard};
use crate::workflow::Workflow;

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Two tasks share the same ID, or an ID is empty.
    DuplicateId,
    /// A preference weight is negative or not finite.
    InvalidWeight,
    /// A workflow has no subtasks.
    EmptyWorkflow,
    /// A subtask is not a known task.
    UnknownTask,
    /// A constraint end names a task outside the workflow.
    InvalidConstraintReference,
    /// Ordering constraints form a cycle.
    CyclicDependency,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

fn finish(errors: Vec<ValidationError>) -> ValidationResult {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validates a batch of tasks.
///
/// Checks:
/// 1. No empty task IDs
/// 2. No duplicate task IDs
/// 3. Every preference weight is finite and non-negative
pub fn validate_tasks(tasks: &[Task]) -> ValidationResult {
    let mut errors = Vec::new();
    let mut ids = HashSet::new();

    for task in tasks {
        if task.id.is_empty() {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                "Task with empty ID",
            ));
        } else if !ids.insert(task.id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate task ID: {}", task.id),
            ));
        }

        for p in &task.preferences {
            if !p.weight().is_finite() || p.weight() < 0.0 {
                errors.push(ValidationError::new(
                    ValidationErrorKind::InvalidWeight,
                    format!(
                        "Task '{}' weights {} by {}",
                        task.id,
                        p.aspect_type(),
                        p.weight()
                    ),
                ));
            }
        }
    }

    finish(errors)
}

/// Validates a workflow against the tasks it refers to.
///
/// Checks:
/// 1. The workflow has at least one subtask
/// 2. Every subtask is on `tasks`
/// 3. Every constraint end is a subtask of the workflow
/// 4. Before/after constraints between subtasks do not form a cycle
pub fn validate_workflow(workflow: &Workflow, tasks: &TaskBoard) -> ValidationResult {
    let mut errors = Vec::new();
    let subtasks = workflow.subtasks();
    let members: HashSet<&str> = subtasks.iter().map(String::as_str).collect();

    if subtasks.is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::EmptyWorkflow,
            format!("Workflow '{}' has no subtasks", workflow.id()),
        ));
    }

    for id in &subtasks {
        if !tasks.contains(id) {
            errors.push(ValidationError::new(
                ValidationErrorKind::UnknownTask,
                format!("Workflow '{}' lists unknown task '{id}'", workflow.id()),
            ));
        }
    }

    let constraints = workflow.constraints();
    for c in &constraints {
        for end in [c.constrained_task(), c.constraining_task()].into_iter().flatten() {
            if !members.contains(end) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::InvalidConstraintReference,
                    format!("Constraint {} references '{end}' outside the workflow", c.id()),
                ));
            }
        }
    }

    // Edge a -> b: a must happen first.
    let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
    for c in &constraints {
        let (Some(constrained), Some(constraining)) = (c.constrained_task(), c.constraining_task())
        else {
            continue;
        };
        match c.order() {
            ConstraintOrder::Before => adj.entry(constraining).or_default().push(constrained),
            ConstraintOrder::After => adj.entry(constrained).or_default().push(constraining),
            ConstraintOrder::Coincident => {}
        }
    }
    if let Some(cycle_err) = detect_cycles(&subtasks, &adj) {
        errors.push(cycle_err);
    }

    finish(errors)
}

/// Detects cycles in the ordering graph using DFS.
///
/// # Algorithm
/// Topological sort via DFS. If a back-edge is found (visiting a node
/// currently in the recursion stack), a cycle exists.
fn detect_cycles(nodes: &[String], adj: &HashMap<&str, Vec<&str>>) -> Option<ValidationError> {
    let mut visited = HashSet::new();
    let mut in_stack = HashSet::new();

    for node in nodes {
        let node = node.as_str();
        if !visited.contains(node) && has_cycle_dfs(node, adj, &mut visited, &mut in_stack) {
            return Some(ValidationError::new(
                ValidationErrorKind::CyclicDependency,
                format!("Circular ordering detected involving task '{node}'"),
            ));
        }
    }

    None
}

fn has_cycle_dfs<'a>(
    node: &'a str,
    adj: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    in_stack: &mut HashSet<&'a str>,
) -> bool {
    visited.insert(node);
    in_stack.insert(node);

    if let Some(neighbors) = adj.get(node) {
        for &next in neighbors {
            if in_stack.contains(next) {
                return true; // Back edge → cycle
            }
            if !visited.contains(next) && has_cycle_dfs(next, adj, visited, in_stack) {
                return true;
            }
        }
    }

    in_stack.remove(node);
    false
}
