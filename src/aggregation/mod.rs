//! Workflow-level reduce and broadcast of allocation results.
//!
//! An [`AllocationResultAggregator`] folds the results of a workflow's
//! subtasks (a [`TaskScoreTable`]) into one aggregate result. An
//! [`AllocationResultDistributor`] goes the other way, splitting the result
//! of a combined task back across the parent tasks it was built from.
//!
//! Both are pluggable: workflows and compositions hold them as
//! `Arc<dyn Trait>` and default to [`DefaultAggregator`] and
//! [`DefaultDistributor`].
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use u_plan::aggregation::{AllocationResultAggregator, DefaultAggregator, TaskScoreTable};
//! use u_plan::models::{AllocationResult, AspectType};
//!
//! let mut table = TaskScoreTable::new(["a", "b"]);
//! for (i, cost) in [10.0, 20.0].into_iter().enumerate() {
//!     let ar = AllocationResult::from_pairs(1.0, true, &[AspectType::Cost], &[cost]).unwrap();
//!     table.set_result(i, Some(Arc::new(ar)));
//! }
//! let total = DefaultAggregator::new().calculate("wf", &table, None).unwrap();
//! assert_eq!(total.value(AspectType::Cost).unwrap(), 30.0);
//! ```

mod default;
mod distributor;
mod simple;

pub use default::{cached_key_patterns, DefaultAggregator};
pub use distributor::DefaultDistributor;
pub use simple::SimpleAspectValueAggregator;

use std::fmt::Debug;
use std::sync::Arc;

use crate::models::{
    aspect_sets_equal, AllocationResult, AspectValue, AuxiliaryQueries, AuxiliaryQueryType,
    AQTYPE_COUNT,
};

/// One row of a [`TaskScoreTable`].
#[derive(Debug, Clone)]
pub struct ScoreRow {
    pub task_id: String,
    pub result: Option<Arc<AllocationResult>>,
}

/// Task IDs paired with their current results, in workflow order.
#[derive(Debug, Clone, Default)]
pub struct TaskScoreTable {
    rows: Vec<ScoreRow>,
}

impl TaskScoreTable {
    /// Creates a table with no results yet.
    pub fn new<I, S>(task_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rows: task_ids
                .into_iter()
                .map(|id| ScoreRow {
                    task_id: id.into(),
                    result: None,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ScoreRow] {
        &self.rows
    }

    pub fn task_id(&self, index: usize) -> Option<&str> {
        self.rows.get(index).map(|r| r.task_id.as_str())
    }

    /// Result at `index`, `None` when absent or out of range.
    pub fn result(&self, index: usize) -> Option<&Arc<AllocationResult>> {
        self.rows.get(index).and_then(|r| r.result.as_ref())
    }

    /// Result of the first row for `task_id`.
    pub fn result_for(&self, task_id: &str) -> Option<&Arc<AllocationResult>> {
        self.rows
            .iter()
            .find(|r| r.task_id == task_id)
            .and_then(|r| r.result.as_ref())
    }

    /// Replaces the result at `index`. Out-of-range indices are ignored.
    pub fn set_result(&mut self, index: usize, result: Option<Arc<AllocationResult>>) {
        if let Some(row) = self.rows.get_mut(index) {
            row.result = result;
        }
    }

    /// Every row's result, or `None` if any row has none.
    pub fn all_results(&self) -> Option<Vec<&Arc<AllocationResult>>> {
        self.rows.iter().map(|r| r.result.as_ref()).collect()
    }
}

/// Folds subtask results into one workflow result.
///
/// Implementations return `None` when the table is empty or any subtask has
/// no result yet, and return `previous` itself (the same `Arc`) when the
/// fold does not differ from it.
pub trait AllocationResultAggregator: Send + Sync + Debug {
    /// Aggregator name.
    fn name(&self) -> &'static str;

    fn calculate(
        &self,
        workflow_id: &str,
        table: &TaskScoreTable,
        previous: Option<&Arc<AllocationResult>>,
    ) -> Option<Arc<AllocationResult>>;
}

/// Splits a combined result back across parent tasks.
pub trait AllocationResultDistributor: Send + Sync + Debug {
    /// Distributor name.
    fn name(&self) -> &'static str;

    /// One row per parent, in `parents` order.
    fn calculate(&self, parents: &[String], aggregate: Option<&AllocationResult>)
        -> TaskScoreTable;
}

// ================================
// Shared fold helpers
// ================================

#[derive(Debug, Clone, Default, PartialEq)]
enum AuxSlot {
    #[default]
    Undefined,
    Value(String),
    Conflict,
}

/// Auxiliary query summary over a set of results.
///
/// The first value seen for a query wins; a different value later clears
/// the query for the rest of the fold.
#[derive(Debug, Default)]
pub(crate) struct AuxSummary {
    slots: [AuxSlot; AQTYPE_COUNT],
}

impl AuxSummary {
    pub(crate) fn fold(&mut self, ar: &AllocationResult) {
        let Some(queries) = ar.auxiliary_queries() else {
            return;
        };
        for (slot, data) in self.slots.iter_mut().zip(queries) {
            let Some(data) = data else { continue };
            match slot {
                AuxSlot::Undefined => *slot = AuxSlot::Value(data),
                AuxSlot::Value(seen) if *seen != data => *slot = AuxSlot::Conflict,
                _ => {}
            }
        }
    }

    pub(crate) fn finish(self) -> AuxiliaryQueries {
        self.slots.map(|slot| match slot {
            AuxSlot::Value(v) => Some(v),
            _ => None,
        })
    }
}

/// Whether a freshly folded result matches `previous`.
pub(crate) fn unchanged(
    previous: &AllocationResult,
    aspects: &[AspectValue],
    confidence: f64,
    success: bool,
    aux: &AuxiliaryQueries,
    confidence_delta: f64,
) -> bool {
    let prev_aux = previous.auxiliary_queries().unwrap_or_default();
    previous.is_success() == success
        && (previous.confidence_rating() - confidence).abs() <= confidence_delta
        && aspect_sets_equal(previous.aspects(), aspects)
        && prev_aux == *aux
}

/// Builds the aggregate result and attaches the auxiliary queries.
pub(crate) fn assemble(
    workflow_id: &str,
    confidence: f64,
    success: bool,
    aspects: Vec<AspectValue>,
    aux: AuxiliaryQueries,
) -> Option<Arc<AllocationResult>> {
    match AllocationResult::new(confidence, success, aspects) {
        Ok(ar) => {
            for (q, data) in AuxiliaryQueryType::ALL.into_iter().zip(aux) {
                if let Some(data) = data {
                    ar.add_auxiliary_query_info(q, data);
                }
            }
            Some(Arc::new(ar))
        }
        Err(err) => {
            tracing::warn!(workflow = workflow_id, error = %err, "aggregate result rejected");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AspectType;

    fn ar(cost: f64) -> Arc<AllocationResult> {
        Arc::new(AllocationResult::from_pairs(1.0, true, &[AspectType::Cost], &[cost]).unwrap())
    }

    #[test]
    fn test_table_rows() {
        let mut t = TaskScoreTable::new(["a", "b"]);
        assert_eq!(t.len(), 2);
        assert!(t.all_results().is_none());
        t.set_result(0, Some(ar(1.0)));
        t.set_result(5, Some(ar(9.0)));
        assert!(t.result(0).is_some());
        assert!(t.result_for("b").is_none());
        t.set_result(1, Some(ar(2.0)));
        assert_eq!(t.all_results().map(|v| v.len()), Some(2));
        assert_eq!(t.task_id(1), Some("b"));
    }

    #[test]
    fn test_aux_summary_first_wins_conflict_clears() {
        let a = ar(1.0).as_ref().clone();
        a.add_auxiliary_query_info(AuxiliaryQueryType::PortName, "NORFOLK");
        a.add_auxiliary_query_info(AuxiliaryQueryType::Overtime, "2h");
        let b = ar(1.0).as_ref().clone();
        b.add_auxiliary_query_info(AuxiliaryQueryType::PortName, "OAKLAND");
        b.add_auxiliary_query_info(AuxiliaryQueryType::Overtime, "2h");
        let c = ar(1.0).as_ref().clone();
        c.add_auxiliary_query_info(AuxiliaryQueryType::PortName, "NORFOLK");

        let mut s = AuxSummary::default();
        for r in [&a, &b, &c] {
            s.fold(r);
        }
        let aux = s.finish();
        assert_eq!(aux[AuxiliaryQueryType::PortName.index()], None);
        assert_eq!(aux[AuxiliaryQueryType::Overtime.index()].as_deref(), Some("2h"));
    }
}
