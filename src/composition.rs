//! Compositions: many parent tasks combined into one task.
//!
//! Each parent is linked to the composition through an [`Aggregation`]
//! record. The combined task's result flows back to the parents through an
//! [`AllocationResultDistributor`].
//!
//! Records live in the composition's own arena and are addressed by
//! [`AggregationId`]; the parent and combined tasks are addressed by task
//! ID. Nothing holds an owning reference to the other side, so either can
//! be torn down first.
//!
//! # Removal
//! When an aggregation is withdrawn, the composition reports the knock-on
//! removals to a [`Publisher`]:
//!
//! - **Propagating** (default): the first withdrawal performs a one-shot
//!   mass clean-up. Every other aggregation is removed and its parent task
//!   marked changed, then the combined task is removed. Later withdrawals
//!   of the already removed aggregations are no-ops.
//! - **Not propagating**: only the withdrawn aggregation is detached. Its
//!   parent stays attached while another aggregation still links it, and
//!   the combined task is removed once it has no parents.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::aggregation::{AllocationResultDistributor, DefaultDistributor, TaskScoreTable};
use crate::error::{PlanError, PlanResult};
use crate::models::OutcomeSource;

static NEXT_AGGREGATION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of an [`Aggregation`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregationId(u64);

impl AggregationId {
    fn next() -> Self {
        Self(NEXT_AGGREGATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AggregationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AG{}", self.0)
    }
}

/// Link from one parent task into a composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub id: AggregationId,
    /// The parent task being combined.
    pub task_id: String,
}

/// Something a composition asks its host to remove or re-examine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlanObject {
    Task(String),
    Aggregation(AggregationId),
}

/// Sink for the knock-on effects of a composition change.
pub trait Publisher {
    fn publish_remove(&self, object: PlanObject);

    fn publish_change(&self, object: PlanObject);
}

struct CompositionState {
    aggregations: Vec<Aggregation>,
    distributor: Arc<dyn AllocationResultDistributor>,
    propagating: bool,
    clean_up_pending: bool,
}

/// Parent tasks combined into one task.
pub struct Composition {
    combined_task: String,
    state: Mutex<CompositionState>,
}

impl Composition {
    /// Creates a composition for `combined_task` with the default distributor.
    pub fn new(combined_task: impl Into<String>) -> Self {
        Self {
            combined_task: combined_task.into(),
            state: Mutex::new(CompositionState {
                aggregations: Vec::new(),
                distributor: Arc::new(DefaultDistributor::new()),
                propagating: true,
                clean_up_pending: true,
            }),
        }
    }

    /// Sets the distributor.
    pub fn with_distributor(self, distributor: Arc<dyn AllocationResultDistributor>) -> Self {
        self.state.lock().distributor = distributor;
        self
    }

    pub fn combined_task(&self) -> &str {
        &self.combined_task
    }

    pub fn set_distributor(&self, distributor: Arc<dyn AllocationResultDistributor>) {
        self.state.lock().distributor = distributor;
    }

    pub fn distributor(&self) -> Arc<dyn AllocationResultDistributor> {
        Arc::clone(&self.state.lock().distributor)
    }

    pub fn is_propagating(&self) -> bool {
        self.state.lock().propagating
    }

    pub fn set_propagating(&self, propagating: bool) {
        self.state.lock().propagating = propagating;
    }

    // ================================
    // Aggregations
    // ================================

    /// Links `task_id` into this composition.
    pub fn add_aggregation(&self, task_id: impl Into<String>) -> AggregationId {
        let task_id = task_id.into();
        let id = AggregationId::next();
        self.state.lock().aggregations.push(Aggregation { id, task_id });
        id
    }

    /// Replaces every aggregation, one per task ID.
    pub fn set_aggregations<I, S>(&self, task_ids: I) -> Vec<AggregationId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let aggregations: Vec<Aggregation> = task_ids
            .into_iter()
            .map(|t| Aggregation {
                id: AggregationId::next(),
                task_id: t.into(),
            })
            .collect();
        let ids = aggregations.iter().map(|a| a.id).collect();
        self.state.lock().aggregations = aggregations;
        ids
    }

    /// Removes and returns every aggregation.
    pub fn clear_aggregations(&self) -> Vec<Aggregation> {
        std::mem::take(&mut self.state.lock().aggregations)
    }

    pub fn aggregations(&self) -> Vec<Aggregation> {
        self.state.lock().aggregations.clone()
    }

    pub fn aggregation(&self, id: AggregationId) -> Option<Aggregation> {
        self.state
            .lock()
            .aggregations
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    /// Parent task of every aggregation, in aggregation order.
    pub fn parent_tasks(&self) -> Vec<String> {
        self.state
            .lock()
            .aggregations
            .iter()
            .map(|a| a.task_id.clone())
            .collect()
    }

    /// Parents still attached to the combined task, each once, in order
    /// of first aggregation.
    pub fn combined_parents(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut seen = HashSet::new();
        state
            .aggregations
            .iter()
            .filter(|a| seen.insert(a.task_id.as_str()))
            .map(|a| a.task_id.clone())
            .collect()
    }

    /// Splits the combined task's estimated result across the parents.
    pub fn calculate_distribution(&self, outcomes: &dyn OutcomeSource) -> TaskScoreTable {
        let (parents, distributor) = {
            let state = self.state.lock();
            let parents: Vec<String> =
                state.aggregations.iter().map(|a| a.task_id.clone()).collect();
            (parents, Arc::clone(&state.distributor))
        };
        let combined = outcomes.estimated_result(&self.combined_task);
        distributor.calculate(&parents, combined.as_deref())
    }

    // ================================
    // Clean-up
    // ================================

    /// Whether the mass clean-up has not happened yet.
    pub fn should_do_mass_clean_up(&self) -> bool {
        self.state.lock().clean_up_pending
    }

    /// Marks the mass clean-up as done.
    pub fn cleaned_up(&self) {
        self.state.lock().clean_up_pending = false;
    }

    /// Atomically reads and clears the clean-up latch.
    pub fn doing_clean_up(&self) -> bool {
        std::mem::replace(&mut self.state.lock().clean_up_pending, false)
    }

    /// Withdraws an aggregation and publishes the resulting removals.
    ///
    /// # Errors
    /// `UnknownAggregation` if `id` is not linked here (and the clean-up
    /// has not already detached everything).
    pub fn remove_aggregation(
        &self,
        id: AggregationId,
        publisher: &dyn Publisher,
    ) -> PlanResult<()> {
        let mut state = self.state.lock();
        let pos = state.aggregations.iter().position(|a| a.id == id);

        if state.propagating {
            if !state.clean_up_pending {
                return Ok(());
            }
            if pos.is_none() {
                return Err(PlanError::UnknownAggregation { id: id.to_string() });
            }
            state.clean_up_pending = false;
            let removed = std::mem::take(&mut state.aggregations);
            drop(state);

            tracing::debug!(
                combined = %self.combined_task,
                aggregations = removed.len(),
                "composition mass clean-up"
            );
            for other in removed.into_iter().filter(|a| a.id != id) {
                publisher.publish_remove(PlanObject::Aggregation(other.id));
                publisher.publish_change(PlanObject::Task(other.task_id));
            }
            publisher.publish_remove(PlanObject::Task(self.combined_task.clone()));
            return Ok(());
        }

        let pos = pos.ok_or_else(|| PlanError::UnknownAggregation { id: id.to_string() })?;
        let removed = state.aggregations.remove(pos);
        let orphaned = state.aggregations.is_empty();
        drop(state);
        tracing::debug!(
            combined = %self.combined_task,
            parent = %removed.task_id,
            orphaned,
            "aggregation detached"
        );

        if orphaned {
            publisher.publish_remove(PlanObject::Task(self.combined_task.clone()));
        }
        Ok(())
    }
}

impl fmt::Debug for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Composition")
            .field("combined_task", &self.combined_task)
            .field("aggregations", &state.aggregations.len())
            .field("distributor", &state.distributor.name())
            .field("propagating", &state.propagating)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AllocationResult, AspectType, Task, TaskBoard};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(&'static str, PlanObject)>>,
    }

    impl Publisher for Recorder {
        fn publish_remove(&self, object: PlanObject) {
            self.events.lock().push(("remove", object));
        }

        fn publish_change(&self, object: PlanObject) {
            self.events.lock().push(("change", object));
        }
    }

    fn composition(parents: &[&str]) -> (Composition, Vec<AggregationId>) {
        let c = Composition::new("MP");
        let ids = c.set_aggregations(parents.iter().copied());
        (c, ids)
    }

    #[test]
    fn test_parents_follow_aggregations() {
        let (c, _) = composition(&["A", "B"]);
        c.add_aggregation("C");
        assert_eq!(c.parent_tasks(), vec!["A", "B", "C"]);
        assert_eq!(c.combined_parents().len(), 3);
        assert_eq!(c.clear_aggregations().len(), 3);
        assert!(c.parent_tasks().is_empty());
        assert!(c.combined_parents().is_empty());
    }

    #[test]
    fn test_combined_parents_are_unique() {
        let (c, _) = composition(&["A", "B", "A"]);
        assert_eq!(c.parent_tasks(), vec!["A", "B", "A"]);
        assert_eq!(c.combined_parents(), vec!["A", "B"]);
    }

    #[test]
    fn test_shared_parent_stays_attached() {
        let (c, ids) = composition(&["A", "A"]);
        c.set_propagating(false);
        let rec = Recorder::default();

        c.remove_aggregation(ids[0], &rec).unwrap();
        assert_eq!(c.aggregations().len(), 1);
        assert_eq!(c.combined_parents(), vec!["A"]);
        assert!(rec.events.lock().is_empty());

        c.remove_aggregation(ids[1], &rec).unwrap();
        assert!(c.combined_parents().is_empty());
        assert_eq!(
            rec.events.lock().as_slice(),
            &[("remove", PlanObject::Task("MP".into()))]
        );
    }

    #[test]
    fn test_propagating_mass_clean_up() {
        let (c, ids) = composition(&["A", "B", "C"]);
        let rec = Recorder::default();

        c.remove_aggregation(ids[0], &rec).unwrap();
        let events = rec.events.lock().clone();
        assert_eq!(
            events,
            vec![
                ("remove", PlanObject::Aggregation(ids[1])),
                ("change", PlanObject::Task("B".into())),
                ("remove", PlanObject::Aggregation(ids[2])),
                ("change", PlanObject::Task("C".into())),
                ("remove", PlanObject::Task("MP".into())),
            ]
        );
        assert!(c.aggregations().is_empty());
        assert!(c.combined_parents().is_empty());

        // The notifications for the removed aggregations do nothing more.
        c.remove_aggregation(ids[1], &rec).unwrap();
        assert_eq!(rec.events.lock().len(), 5);
    }

    #[test]
    fn test_non_propagating_detaches_one() {
        let (c, ids) = composition(&["A", "B"]);
        c.set_propagating(false);
        let rec = Recorder::default();

        c.remove_aggregation(ids[0], &rec).unwrap();
        assert!(rec.events.lock().is_empty());
        assert_eq!(c.combined_parents(), vec!["B"]);

        c.remove_aggregation(ids[1], &rec).unwrap();
        assert_eq!(
            rec.events.lock().as_slice(),
            &[("remove", PlanObject::Task("MP".into()))]
        );
        match c.remove_aggregation(ids[1], &rec) {
            Err(PlanError::UnknownAggregation { .. }) => {}
            other => panic!("expected UnknownAggregation, got {other:?}"),
        }
    }

    #[test]
    fn test_clean_up_latch() {
        let c = Composition::new("MP");
        assert!(c.should_do_mass_clean_up());
        assert!(c.doing_clean_up());
        assert!(!c.doing_clean_up());
        assert!(!c.should_do_mass_clean_up());
    }

    #[test]
    fn test_calculate_distribution() {
        let board = TaskBoard::new();
        let combined = AllocationResult::from_pairs(
            1.0,
            true,
            &[AspectType::Cost, AspectType::Quantity],
            &[90.0, 30.0],
        )
        .unwrap();
        board
            .insert(Task::new("MP").with_estimated_result(combined))
            .unwrap();
        let (c, _) = composition(&["A", "B", "C"]);

        let table = c.calculate_distribution(&board);
        assert_eq!(table.len(), 3);
        let share = table.result_for("B").unwrap();
        assert!((share.value(AspectType::Cost).unwrap() - 30.0).abs() < 1e-10);
        assert!((share.value(AspectType::Quantity).unwrap() - 10.0).abs() < 1e-10);

        let empty = TaskBoard::new();
        assert!(c.calculate_distribution(&empty).result(0).is_none());
        assert!(format!("{c:?}").contains("Default"));
    }
}
