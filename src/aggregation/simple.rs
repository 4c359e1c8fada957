//! Key-driven aggregator.
//!
//! Unlike [`DefaultAggregator`](super::DefaultAggregator), this folds every
//! aspect the subtasks define, keyed by aspect type plus asset so typed
//! quantities are summed per asset. Start time folds by min; end time,
//! danger and risk by max; everything else is summed. Duration is then
//! derived from start and end, and customer satisfaction is averaged over
//! the results that define it.

use std::sync::Arc;

use super::{assemble, unchanged, AllocationResultAggregator, AuxSummary, TaskScoreTable};
use crate::models::{AllocationResult, AspectType, AspectValue};

/// Aggregator folding all aspects by key.
#[derive(Debug, Clone, Default)]
pub struct SimpleAspectValueAggregator;

impl SimpleAspectValueAggregator {
    pub fn new() -> Self {
        Self
    }
}

fn fold_into(acc: &mut Vec<AspectValue>, av: &AspectValue) {
    let Some(existing) = acc.iter_mut().find(|a| a.key() == av.key()) else {
        acc.push(av.clone());
        return;
    };
    let (a, b) = (existing.value(), av.value());
    let folded = match av.aspect_type() {
        AspectType::StartTime => a.min(b),
        AspectType::EndTime | AspectType::Danger | AspectType::Risk => a.max(b),
        _ => a + b,
    };
    *existing = existing.dup(folded);
}

impl AllocationResultAggregator for SimpleAspectValueAggregator {
    fn name(&self) -> &'static str {
        "Simple"
    }

    fn calculate(
        &self,
        workflow_id: &str,
        table: &TaskScoreTable,
        previous: Option<&Arc<AllocationResult>>,
    ) -> Option<Arc<AllocationResult>> {
        if table.is_empty() {
            return None;
        }
        let results = table.all_results()?;

        let mut aspects: Vec<AspectValue> = Vec::new();
        let mut satisfaction_count = 0usize;
        let mut rating = 0.0;
        let mut success = true;
        let mut aux = AuxSummary::default();

        for ar in &results {
            rating += ar.confidence_rating();
            success &= ar.is_success();
            aux.fold(ar);
            for av in ar.aspects() {
                if av.aspect_type() == AspectType::CustomerSatisfaction {
                    satisfaction_count += 1;
                }
                fold_into(&mut aspects, av);
            }
        }

        let find = |aspects: &[AspectValue], t: AspectType| {
            aspects
                .iter()
                .find(|a| a.aspect_type() == t)
                .map(AspectValue::value)
        };
        if let (Some(s), Some(e)) = (
            find(&aspects, AspectType::StartTime),
            find(&aspects, AspectType::EndTime),
        ) {
            let duration = AspectValue::new(AspectType::Duration, e - s);
            match aspects
                .iter_mut()
                .find(|a| a.aspect_type() == AspectType::Duration)
            {
                Some(slot) => *slot = duration,
                None => aspects.push(duration),
            }
        }
        if let Some(cs) = aspects
            .iter_mut()
            .find(|a| a.aspect_type() == AspectType::CustomerSatisfaction)
        {
            *cs = cs.dup(cs.value() / satisfaction_count as f64);
        }

        let confidence = rating / results.len() as f64;
        let aux = aux.finish();
        if let Some(prev) = previous {
            // Exact confidence comparison.
            if unchanged(prev, &aspects, confidence, success, &aux, 0.0) {
                return Some(Arc::clone(prev));
            }
        }
        assemble(workflow_id, confidence, success, aspects, aux)
    }
}
