//! Standard-aspect aggregator.
//!
//! Folds the standard aspects of every subtask result with a fixed policy
//! per aspect:
//!
//! | Aspect | Fold |
//! |--------|------|
//! | start time, readiness | min |
//! | end time, danger, risk | max |
//! | cost, quantity, interval, total quantity, total shipments | sum |
//! | customer satisfaction | mean over results that define it |
//! | duration | end − start, when both are defined |
//!
//! Other aspects are ignored. Confidence is the mean rating and success
//! the conjunction of all subtask flags.
//!
//! The aspect types present in an aggregate depend only on which
//! standard aspects the subtasks define, so the type list is cached per
//! presence bitmask in a process-wide map.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use super::{assemble, unchanged, AllocationResultAggregator, AuxSummary, TaskScoreTable};
use crate::config::{PlanConfig, SIGNIFICANT_CONFIDENCE_RATING_DELTA};
use crate::models::{AllocationResult, AspectType, AspectValue, STANDARD_ASPECT_COUNT};

static KEY_CACHE: OnceLock<Mutex<HashMap<u32, Arc<[AspectType]>>>> = OnceLock::new();

fn key_cache() -> &'static Mutex<HashMap<u32, Arc<[AspectType]>>> {
    KEY_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Aspect types present under `mask`, in code order.
fn keys_for(mask: u32) -> Arc<[AspectType]> {
    let mut cache = key_cache().lock();
    Arc::clone(cache.entry(mask).or_insert_with(|| {
        let keys: Arc<[AspectType]> = (0..STANDARD_ASPECT_COUNT as u32)
            .filter(|code| mask & (1 << code) != 0)
            .map(AspectType::from_code)
            .collect();
        tracing::debug!(mask, aspects = keys.len(), "cached aggregate key pattern");
        keys
    }))
}

/// Number of distinct presence patterns cached so far.
pub fn cached_key_patterns() -> usize {
    key_cache().lock().len()
}

#[derive(Clone, Copy)]
enum Fold {
    Min,
    Max,
    Sum,
    Mean,
}

fn fold_of(aspect: AspectType) -> Option<Fold> {
    use AspectType::*;
    match aspect {
        StartTime | Readiness => Some(Fold::Min),
        EndTime | Danger | Risk => Some(Fold::Max),
        Cost | Quantity | Interval | TotalQuantity | TotalShipments => Some(Fold::Sum),
        CustomerSatisfaction => Some(Fold::Mean),
        _ => None,
    }
}

/// Default workflow aggregator.
#[derive(Debug, Clone)]
pub struct DefaultAggregator {
    confidence_delta: f64,
}

impl Default for DefaultAggregator {
    fn default() -> Self {
        Self {
            confidence_delta: SIGNIFICANT_CONFIDENCE_RATING_DELTA,
        }
    }
}

impl DefaultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an aggregator using the thresholds of `config`.
    pub fn with_config(config: &PlanConfig) -> Self {
        Self {
            confidence_delta: config.confidence_delta,
        }
    }

    /// Confidence change treated as significant.
    pub fn confidence_delta(&self) -> f64 {
        self.confidence_delta
    }
}

impl AllocationResultAggregator for DefaultAggregator {
    fn name(&self) -> &'static str {
        "Default"
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

        let mut acc: [Option<f64>; STANDARD_ASPECT_COUNT] = [None; STANDARD_ASPECT_COUNT];
        let mut satisfaction_count = 0usize;
        let mut rating = 0.0;
        let mut success = true;
        let mut aux = AuxSummary::default();

        for ar in &results {
            rating += ar.confidence_rating();
            success &= ar.is_success();
            aux.fold(ar);

            for av in ar.aspects() {
                let Some(fold) = fold_of(av.aspect_type()) else {
                    continue;
                };
                let v = av.value();
                let slot = &mut acc[av.aspect_type().code() as usize];
                *slot = Some(match (*slot, fold) {
                    (None, _) => v,
                    (Some(a), Fold::Min) => a.min(v),
                    (Some(a), Fold::Max) => a.max(v),
                    (Some(a), Fold::Sum | Fold::Mean) => a + v,
                });
                if let Fold::Mean = fold {
                    satisfaction_count += 1;
                }
            }
        }

        let cs = AspectType::CustomerSatisfaction.code() as usize;
        if let Some(total) = acc[cs] {
            acc[cs] = Some(total / satisfaction_count as f64);
        }
        let (start, end) = (
            acc[AspectType::StartTime.code() as usize],
            acc[AspectType::EndTime.code() as usize],
        );
        if let (Some(s), Some(e)) = (start, end) {
            acc[AspectType::Duration.code() as usize] = Some(e - s);
        }

        let mask = acc
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_some())
            .fold(0u32, |m, (i, _)| m | (1 << i));
        let aspects: Vec<AspectValue> = keys_for(mask)
            .iter()
            .filter_map(|t| acc[t.code() as usize].map(|v| AspectValue::new(*t, v)))
            .collect();
        let confidence = rating / results.len() as f64;
        let aux = aux.finish();

        if let Some(prev) = previous {
            if unchanged(prev, &aspects, confidence, success, &aux, self.confidence_delta) {
                tracing::trace!(workflow = workflow_id, "aggregate unchanged");
                return Some(Arc::clone(prev));
            }
        }
        assemble(workflow_id, confidence, success, aspects, aux)
    }
}
