//! Even-split distributor.

use std::sync::Arc;

use super::{AllocationResultDistributor, TaskScoreTable};
use crate::models::{AllocationResult, AspectType, AuxiliaryQueryType};

/// Copies the combined result to every parent, splitting cost and
/// quantity evenly by parent count.
#[derive(Debug, Clone, Default)]
pub struct DefaultDistributor;

impl DefaultDistributor {
    pub fn new() -> Self {
        Self
    }

    fn share(aggregate: &AllocationResult, parents: usize) -> Option<AllocationResult> {
        let n = parents as f64;
        let aspects = aggregate
            .aspects()
            .iter()
            .map(|av| match av.aspect_type() {
                AspectType::Cost | AspectType::Quantity => av.dup(av.value() / n),
                _ => av.clone(),
            })
            .collect();
        let confidence = aggregate.confidence_rating();
        let share = match AllocationResult::new(confidence, aggregate.is_success(), aspects) {
            Ok(ar) => ar,
            Err(err) => {
                tracing::warn!(error = %err, "cannot split combined result");
                return None;
            }
        };
        for q in AuxiliaryQueryType::ALL {
            if let Some(data) = aggregate.auxiliary_query(q) {
                share.add_auxiliary_query_info(q, data);
            }
        }
        Some(share)
    }
}

impl AllocationResultDistributor for DefaultDistributor {
    fn name(&self) -> &'static str {
        "Default"
    }

    fn calculate(
        &self,
        parents: &[String],
        aggregate: Option<&AllocationResult>,
    ) -> TaskScoreTable {
        let mut table = TaskScoreTable::new(parents.iter().cloned());
        if parents.is_empty() {
            return table;
        }
        let share = aggregate
            .and_then(|ar| Self::share(ar, parents.len()))
            .map(Arc::new);
        for i in 0..parents.len() {
            table.set_result(i, share.clone());
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parents(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("P{i}")).collect()
    }

    #[test]
    fn test_cost_and_quantity_split() {
        let combined = AllocationResult::from_pairs(
            0.8,
            true,
            &[AspectType::Cost, AspectType::Quantity, AspectType::EndTime],
            &[90.0, 30.0, 500.0],
        )
        .unwrap()
        .with_auxiliary_query(AuxiliaryQueryType::PortName, "NORFOLK");

        let table = DefaultDistributor::new().calculate(&parents(3), Some(&combined));
        assert_eq!(table.len(), 3);
        for i in 0..3 {
            let r = table.result(i).unwrap();
            assert!((r.value(AspectType::Cost).unwrap() - 30.0).abs() < 1e-10);
            assert!((r.value(AspectType::Quantity).unwrap() - 10.0).abs() < 1e-10);
            assert!((r.value(AspectType::EndTime).unwrap() - 500.0).abs() < 1e-10);
            assert!((r.confidence_rating() - 0.8).abs() < 1e-10);
            assert_eq!(
                r.auxiliary_query(AuxiliaryQueryType::PortName).as_deref(),
                Some("NORFOLK")
            );
        }
        assert_eq!(table.task_id(2), Some("P2"));
    }

    #[test]
    fn test_no_parents_or_no_aggregate() {
        let d = DefaultDistributor::new();
        assert!(d.calculate(&[], None).is_empty());

        let table = d.calculate(&parents(2), None);
        assert_eq!(table.len(), 2);
        assert!(table.result(0).is_none());
        assert!(table.result(1).is_none());
    }
}
