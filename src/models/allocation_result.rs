//! Allocation results: immutable multi-aspect outcome snapshots.
//!
//! An [`AllocationResult`] records how well an allocation went: a success
//! flag, a confidence rating in `[0, 1]`, one [`AspectValue`] per aspect
//! (the rollup), optionally a time-ordered sequence of per-phase aspect
//! arrays, and optional auxiliary query strings.
//!
//! # Concurrency
//! All fields are fixed at construction except two narrow regions guarded
//! by one per-instance lock: the single-slot lookup memo used by
//! [`AllocationResult::value`] and friends, and the copy-on-write
//! auxiliary query array. The array is replaced, never edited in place,
//! so readers always see a complete snapshot.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::aspect::{
    aspect_sets_nearly_equal_within, check_aspect_set, AspectType, AspectValue, AuxiliaryQueryType,
    AQTYPE_COUNT,
};
use super::task::Preference;
use crate::config::{PlanConfig, NEARLY_EQUAL_EPSILON};
use crate::error::{PlanError, PlanResult};

/// Auxiliary query strings indexed by [`AuxiliaryQueryType::index`].
pub type AuxiliaryQueries = [Option<String>; AQTYPE_COUNT];

#[derive(Debug, Default)]
struct ResultState {
    /// Last looked-up type and where it was found.
    memo: Option<(AspectType, Option<usize>)>,
    aux: Option<Arc<AuxiliaryQueries>>,
}

/// Immutable outcome of an allocation.
#[derive(Debug, Serialize, Deserialize)]
#[serde(try_from = "AllocationResultRepr", into = "AllocationResultRepr")]
pub struct AllocationResult {
    success: bool,
    confidence: f64,
    aspects: Vec<AspectValue>,
    phased: Option<Vec<Vec<AspectValue>>>,
    state: Mutex<ResultState>,
}

fn check_confidence(confidence: f64) -> PlanResult<()> {
    if (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(PlanError::InvalidConfidence { value: confidence })
    }
}

impl AllocationResult {
    /// Creates a non-phased result.
    ///
    /// # Errors
    /// `InvalidAspectSet` on duplicate keys or NaN values,
    /// `InvalidConfidence` outside `[0, 1]`.
    pub fn new(confidence: f64, success: bool, aspects: Vec<AspectValue>) -> PlanResult<Self> {
        check_confidence(confidence)?;
        check_aspect_set(&aspects)?;
        Ok(Self::assemble(confidence, success, aspects, None, None))
    }

    /// Creates a non-phased result from parallel type and value slices.
    pub fn from_pairs(
        confidence: f64,
        success: bool,
        types: &[AspectType],
        values: &[f64],
    ) -> PlanResult<Self> {
        if types.len() != values.len() {
            return Err(PlanError::InvalidAspectSet {
                reason: format!("{} types but {} values", types.len(), values.len()),
            });
        }
        let aspects = types
            .iter()
            .zip(values)
            .map(|(t, v)| AspectValue::new(*t, *v))
            .collect();
        Self::new(confidence, success, aspects)
    }

    /// Creates a phased result: a rollup plus one aspect collection per phase.
    ///
    /// Each phase may be any iterable of values (a vec, a set, ...). Every
    /// phase is validated independently of the others.
    pub fn phased<I, P>(
        confidence: f64,
        success: bool,
        rollup: Vec<AspectValue>,
        phases: I,
    ) -> PlanResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: IntoIterator<Item = AspectValue>,
    {
        check_confidence(confidence)?;
        check_aspect_set(&rollup)?;
        let mut phase_arrays = Vec::new();
        for phase in phases {
            let arr: Vec<AspectValue> = phase.into_iter().collect();
            check_aspect_set(&arr)?;
            phase_arrays.push(arr);
        }
        Ok(Self::assemble(
            confidence,
            success,
            rollup,
            Some(phase_arrays),
            None,
        ))
    }

    /// Merges two results, `dominant` winning on shared aspects.
    ///
    /// Aspects match on their key: the type, plus the asset for typed
    /// quantities. The aspects of `other` not present in `dominant` come first, then
    /// all of `dominant`'s. Confidence is the length-weighted average
    /// `(c1 * len1 + c2 * (n - len1)) / n` over the merged length `n`
    /// (the dominant confidence when `n == 0`). Success is the logical OR.
    /// Auxiliary queries are `dominant`'s, with `other`'s filling empty
    /// slots. The merged result is never phased.
    pub fn merge(dominant: &AllocationResult, other: &AllocationResult) -> Self {
        let mut aspects: Vec<AspectValue> = other
            .aspects
            .iter()
            .filter(|o| dominant.aspects.iter().all(|d| d.key() != o.key()))
            .cloned()
            .collect();
        aspects.extend(dominant.aspects.iter().cloned());

        let n = aspects.len();
        let len1 = dominant.aspects.len();
        let confidence = if n == 0 {
            dominant.confidence
        } else {
            (dominant.confidence * len1 as f64 + other.confidence * (n - len1) as f64) / n as f64
        };

        let aux = match (dominant.aux_snapshot(), other.aux_snapshot()) {
            (Some(d), Some(o)) => {
                let mut merged = (*d).clone();
                for (slot, theirs) in merged.iter_mut().zip(o.iter()) {
                    if slot.is_none() {
                        slot.clone_from(theirs);
                    }
                }
                Some(Arc::new(merged))
            }
            (d, o) => d.or(o),
        };

        Self::assemble(
            confidence,
            dominant.success || other.success,
            aspects,
            None,
            aux,
        )
    }

    fn assemble(
        confidence: f64,
        success: bool,
        aspects: Vec<AspectValue>,
        phased: Option<Vec<Vec<AspectValue>>>,
        aux: Option<Arc<AuxiliaryQueries>>,
    ) -> Self {
        Self {
            success,
            confidence,
            aspects,
            phased,
            state: Mutex::new(ResultState { memo: None, aux }),
        }
    }

    /// Attaches an auxiliary query value, builder style.
    pub fn with_auxiliary_query(self, query: AuxiliaryQueryType, data: impl Into<String>) -> Self {
        self.add_auxiliary_query_info(query, data);
        self
    }

    // ================================
    // Inspection
    // ================================

    #[inline]
    pub fn is_success(&self) -> bool {
        self.success
    }

    #[inline]
    pub fn confidence_rating(&self) -> f64 {
        self.confidence
    }

    #[inline]
    pub fn is_phased(&self) -> bool {
        self.phased.is_some()
    }

    /// Rollup aspects, borrowed.
    pub fn aspects(&self) -> &[AspectValue] {
        &self.aspects
    }

    /// Aspect types of the rollup, in storage order.
    pub fn aspect_types(&self) -> Vec<AspectType> {
        self.aspects.iter().map(AspectValue::aspect_type).collect()
    }

    /// Rollup scalars, in storage order.
    pub fn results(&self) -> Vec<f64> {
        self.aspects.iter().map(AspectValue::value).collect()
    }

    /// A fresh copy of the rollup.
    pub fn aspect_value_results(&self) -> Vec<AspectValue> {
        self.aspects.clone()
    }

    /// Copies of the phase arrays; a non-phased result has the rollup as
    /// its only phase.
    pub fn phased_results(&self) -> Vec<Vec<AspectValue>> {
        match &self.phased {
            Some(phases) => phases.clone(),
            None => vec![self.aspects.clone()],
        }
    }

    fn index_of(&self, aspect: AspectType) -> Option<usize> {
        let mut state = self.state.lock();
        if let Some((t, idx)) = state.memo {
            if t == aspect {
                return idx;
            }
        }
        let idx = self.aspects.iter().position(|a| a.aspect_type() == aspect);
        state.memo = Some((aspect, idx));
        idx
    }

    /// Scalar stored under the full key `(aspect, asset)`.
    ///
    /// Typed quantities share one aspect type and differ by asset; this
    /// reaches each of them, where [`try_value`](Self::try_value) only
    /// sees the first of the type. Merging matches on the same key.
    pub fn value_for_key(&self, aspect: AspectType, asset: Option<&str>) -> Option<f64> {
        self.aspects
            .iter()
            .find(|a| a.key() == (aspect, asset))
            .map(AspectValue::value)
    }

    /// Every rollup value of `aspect`, in storage order.
    pub fn aspect_values_of(&self, aspect: AspectType) -> Vec<AspectValue> {
        self.aspects
            .iter()
            .filter(|a| a.aspect_type() == aspect)
            .cloned()
            .collect()
    }

    /// Whether the rollup defines `aspect`.
    pub fn is_defined(&self, aspect: AspectType) -> bool {
        self.index_of(aspect).is_some()
    }

    /// Scalar of the first value of `aspect`, `None` when undefined.
    pub fn try_value(&self, aspect: AspectType) -> Option<f64> {
        self.index_of(aspect).map(|i| self.aspects[i].value())
    }

    /// Scalar of `aspect`.
    ///
    /// # Errors
    /// `UndefinedAspect` when the result does not define it.
    pub fn value(&self, aspect: AspectType) -> PlanResult<f64> {
        self.try_value(aspect)
            .ok_or(PlanError::UndefinedAspect { aspect })
    }

    /// Full value of `aspect`.
    ///
    /// # Errors
    /// `UndefinedAspect` when the result does not define it.
    pub fn aspect_value(&self, aspect: AspectType) -> PlanResult<AspectValue> {
        self.index_of(aspect)
            .map(|i| self.aspects[i].clone())
            .ok_or(PlanError::UndefinedAspect { aspect })
    }

    // ================================
    // Auxiliary queries
    // ================================

    fn aux_snapshot(&self) -> Option<Arc<AuxiliaryQueries>> {
        self.state.lock().aux.clone()
    }

    /// Value recorded for `query`.
    pub fn auxiliary_query(&self, query: AuxiliaryQueryType) -> Option<String> {
        self.state
            .lock()
            .aux
            .as_ref()
            .and_then(|a| a[query.index()].clone())
    }

    /// Snapshot of all auxiliary query values.
    pub fn auxiliary_queries(&self) -> Option<AuxiliaryQueries> {
        self.aux_snapshot().map(|a| (*a).clone())
    }

    /// Records `data` for `query`, replacing the array with an edited copy.
    pub fn add_auxiliary_query_info(&self, query: AuxiliaryQueryType, data: impl Into<String>) {
        let mut state = self.state.lock();
        let mut next: AuxiliaryQueries = match &state.aux {
            Some(current) => (**current).clone(),
            None => Default::default(),
        };
        next[query.index()] = Some(data.into());
        state.aux = Some(Arc::new(next));
    }

    // ================================
    // Comparison
    // ================================

    /// Deep structural equality.
    ///
    /// Compares success, phasing, exact confidence, rollups (order-free,
    /// nearly equal), phases in order, and auxiliary queries by content.
    pub fn is_equal(&self, other: &AllocationResult) -> bool {
        self.is_equal_within(other, NEARLY_EQUAL_EPSILON)
    }

    /// [`is_equal`](Self::is_equal) with aspect values compared within
    /// `config.nearly_equal_epsilon`.
    pub fn is_equal_with(&self, other: &AllocationResult, config: &PlanConfig) -> bool {
        self.is_equal_within(other, config.nearly_equal_epsilon)
    }

    fn is_equal_within(&self, other: &AllocationResult, epsilon: f64) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if self.success != other.success
            || self.is_phased() != other.is_phased()
            || self.confidence != other.confidence
            || !aspect_sets_nearly_equal_within(&self.aspects, &other.aspects, epsilon)
        {
            return false;
        }
        if let (Some(a), Some(b)) = (&self.phased, &other.phased) {
            if a.len() != b.len()
                || !a
                    .iter()
                    .zip(b)
                    .all(|(pa, pb)| aspect_sets_nearly_equal_within(pa, pb, epsilon))
            {
                return false;
            }
        }
        let empty: AuxiliaryQueries = Default::default();
        let mine = self.aux_snapshot();
        let theirs = other.aux_snapshot();
        mine.as_deref().unwrap_or(&empty) == theirs.as_deref().unwrap_or(&empty)
    }

    /// Rollup values that differ from what `preferences` asked for.
    ///
    /// A value is reported when no preference covers its type, or when
    /// its scalar differs from that preference's best point.
    pub fn difference(&self, preferences: &[Preference]) -> Vec<AspectValue> {
        self.aspects
            .iter()
            .filter(|av| {
                match preferences
                    .iter()
                    .find(|p| p.aspect_type() == av.aspect_type())
                {
                    None => true,
                    Some(p) => p.best().value() != av.value(),
                }
            })
            .cloned()
            .collect()
    }
}

impl Clone for AllocationResult {
    fn clone(&self) -> Self {
        Self::assemble(
            self.confidence,
            self.success,
            self.aspects.clone(),
            self.phased.clone(),
            self.aux_snapshot(),
        )
    }
}

impl fmt::Display for AllocationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AllocationResult[success={}, confidence={}, [",
            self.success, self.confidence
        )?;
        for (i, av) in self.aspects.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{av}")?;
        }
        f.write_str("]")?;
        if let Some(phases) = &self.phased {
            write!(f, " phases={}", phases.len())?;
        }
        f.write_str("]")
    }
}

/// Wire form of [`AllocationResult`]; deserialization re-validates and
/// starts with an empty memo.
#[derive(Serialize, Deserialize)]
struct AllocationResultRepr {
    success: bool,
    confidence: f64,
    aspects: Vec<AspectValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    phased: Option<Vec<Vec<AspectValue>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auxiliary_queries: Option<AuxiliaryQueries>,
}

impl From<AllocationResult> for AllocationResultRepr {
    fn from(ar: AllocationResult) -> Self {
        let auxiliary_queries = ar.auxiliary_queries();
        Self {
            success: ar.success,
            confidence: ar.confidence,
            aspects: ar.aspects,
            phased: ar.phased,
            auxiliary_queries,
        }
    }
}

impl TryFrom<AllocationResultRepr> for AllocationResult {
    type Error = PlanError;

    fn try_from(repr: AllocationResultRepr) -> Result<Self, Self::Error> {
        let ar = match repr.phased {
            Some(phases) => {
                AllocationResult::phased(repr.confidence, repr.success, repr.aspects, phases)?
            }
            None => AllocationResult::new(repr.confidence, repr.success, repr.aspects)?,
        };
        if let Some(aux) = repr.auxiliary_queries {
            ar.state.lock().aux = Some(Arc::new(aux));
        }
        Ok(ar)
    }
}
