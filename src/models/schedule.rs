//! Schedules: ordered collections of time intervals.
//!
//! A [`Schedule`] keeps its elements sorted by `(start, end)`. Each element
//! spans `[start, end)` in milliseconds and may carry a scalar value (a
//! quantity, a rate, ...). The schedule's [`ElementType`] is fixed at
//! creation and checked on every insert, so a value schedule never holds a
//! plain interval.
//!
//! All queries return snapshots; the schedule may be modified from another
//! thread while a caller walks a result.
//!
//! # Reference
//! Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 3

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PlanError, PlanResult};

/// Schedule type label used when none is given.
pub const DEFAULT_SCHEDULE_TYPE: &str = "OTHER";

/// A time interval `[start, end)`, optionally carrying a value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleElement {
    /// Start time (ms), inclusive.
    pub start: i64,
    /// End time (ms), exclusive.
    pub end: i64,
    /// Scalar carried over the interval.
    pub value: Option<f64>,
}

impl ScheduleElement {
    /// Creates a plain interval.
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            start,
            end,
            value: None,
        }
    }

    /// Creates a value-bearing interval.
    pub fn with_value(start: i64, end: i64, value: f64) -> Self {
        Self {
            start,
            end,
            value: Some(value),
        }
    }

    /// Same kind of element over a new span with a new value.
    pub fn new_element(&self, start: i64, end: i64, value: f64) -> Self {
        match self.value {
            Some(_) => Self::with_value(start, end, value),
            None => Self::new(start, end),
        }
    }

    /// Duration (end - start) in ms.
    #[inline]
    pub fn duration_ms(&self) -> i64 {
        self.end - self.start
    }

    pub fn element_type(&self) -> ElementType {
        match self.value {
            Some(_) => ElementType::WithValue,
            None => ElementType::Plain,
        }
    }

    /// Whether the two spans share any instant.
    #[inline]
    pub fn overlaps(&self, other: &ScheduleElement) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Whether `t` falls in `[start, end)`.
    #[inline]
    pub fn contains_time(&self, t: i64) -> bool {
        self.start <= t && t < self.end
    }
}

/// Kind of element a schedule holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ElementType {
    /// Bare intervals. Value-bearing elements are accepted too.
    #[default]
    Plain,
    /// Intervals that each carry a value.
    WithValue,
}

impl ElementType {
    /// Whether a schedule of this type may hold an element of type `other`.
    pub fn accepts(self, other: ElementType) -> bool {
        self == ElementType::Plain || self == other
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Plain => f.write_str("ScheduleElement"),
            ElementType::WithValue => f.write_str("ScheduleElementWithValue"),
        }
    }
}

#[derive(Debug, Clone)]
struct ScheduleInner {
    schedule_type: String,
    element_type: ElementType,
    elements: Vec<ScheduleElement>,
}

impl ScheduleInner {
    fn check(&self, el: &ScheduleElement) -> PlanResult<()> {
        if self.element_type.accepts(el.element_type()) {
            Ok(())
        } else {
            Err(PlanError::ElementTypeMismatch {
                expected: self.element_type.to_string(),
                found: el.element_type().to_string(),
            })
        }
    }

    fn insert(&mut self, el: ScheduleElement) {
        let at = self
            .elements
            .partition_point(|e| (e.start, e.end) <= (el.start, el.end));
        self.elements.insert(at, el);
    }
}

/// Sorted, lock-protected collection of schedule elements.
#[derive(Debug, Serialize, Deserialize)]
#[serde(try_from = "ScheduleRepr", into = "ScheduleRepr")]
pub struct Schedule {
    inner: RwLock<ScheduleInner>,
}

impl Schedule {
    /// Creates an empty schedule of the given element type.
    pub fn new(element_type: ElementType) -> Self {
        Self {
            inner: RwLock::new(ScheduleInner {
                schedule_type: DEFAULT_SCHEDULE_TYPE.to_string(),
                element_type,
                elements: Vec::new(),
            }),
        }
    }

    /// Creates an empty value schedule.
    pub fn with_values() -> Self {
        Self::new(ElementType::WithValue)
    }

    /// Creates a schedule holding `elements`.
    ///
    /// # Errors
    /// `ElementTypeMismatch` if an element does not fit `element_type`.
    pub fn from_elements(
        element_type: ElementType,
        elements: impl IntoIterator<Item = ScheduleElement>,
    ) -> PlanResult<Self> {
        let s = Self::new(element_type);
        s.add_all(elements)?;
        Ok(s)
    }

    /// Sets the schedule type label, builder style.
    ///
    /// # Errors
    /// `ScheduleNotEmpty` if the schedule has elements.
    pub fn labelled(self, schedule_type: impl Into<String>) -> PlanResult<Self> {
        self.set_schedule_type(schedule_type)?;
        Ok(self)
    }

    // ================================
    // Metadata
    // ================================

    pub fn schedule_type(&self) -> String {
        self.inner.read().schedule_type.clone()
    }

    /// Sets the schedule type label.
    ///
    /// # Errors
    /// `ScheduleNotEmpty` if the schedule has elements.
    pub fn set_schedule_type(&self, schedule_type: impl Into<String>) -> PlanResult<()> {
        let mut inner = self.inner.write();
        if !inner.elements.is_empty() {
            return Err(PlanError::ScheduleNotEmpty {
                operation: "set the schedule type",
            });
        }
        inner.schedule_type = schedule_type.into();
        Ok(())
    }

    pub fn element_type(&self) -> ElementType {
        self.inner.read().element_type
    }

    /// Changes the element type.
    ///
    /// # Errors
    /// `ElementTypeMismatch` if a current element does not fit `element_type`.
    pub fn set_element_type(&self, element_type: ElementType) -> PlanResult<()> {
        let mut inner = self.inner.write();
        if let Some(bad) = inner
            .elements
            .iter()
            .find(|e| !element_type.accepts(e.element_type()))
        {
            return Err(PlanError::ElementTypeMismatch {
                expected: element_type.to_string(),
                found: bad.element_type().to_string(),
            });
        }
        inner.element_type = element_type;
        Ok(())
    }

    // ================================
    // Mutation
    // ================================

    /// Inserts an element at its sorted position.
    ///
    /// # Errors
    /// `ElementTypeMismatch` if the element does not fit the schedule.
    pub fn add(&self, element: ScheduleElement) -> PlanResult<()> {
        let mut inner = self.inner.write();
        inner.check(&element)?;
        inner.insert(element);
        Ok(())
    }

    /// Inserts every element, or none if any fails the type check.
    pub fn add_all(&self, elements: impl IntoIterator<Item = ScheduleElement>) -> PlanResult<()> {
        let elements: Vec<ScheduleElement> = elements.into_iter().collect();
        let mut inner = self.inner.write();
        for el in &elements {
            inner.check(el)?;
        }
        for el in elements {
            inner.insert(el);
        }
        Ok(())
    }

    /// Removes one element equal to `element`. Returns whether one was found.
    pub fn remove(&self, element: &ScheduleElement) -> bool {
        let mut inner = self.inner.write();
        match inner.elements.iter().position(|e| e == element) {
            Some(i) => {
                inner.elements.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.inner.write().elements.clear();
    }

    /// Replaces all elements.
    ///
    /// # Errors
    /// `ElementTypeMismatch` if any element does not fit; the schedule is
    /// left unchanged.
    pub fn set_elements(
        &self,
        elements: impl IntoIterator<Item = ScheduleElement>,
    ) -> PlanResult<()> {
        let mut elements: Vec<ScheduleElement> = elements.into_iter().collect();
        let mut inner = self.inner.write();
        for el in &elements {
            inner.check(el)?;
        }
        elements.sort_by(|a, b| (a.start, a.end).cmp(&(b.start, b.end)));
        inner.elements = elements;
        Ok(())
    }

    // ================================
    // Queries
    // ================================

    pub fn len(&self) -> usize {
        self.inner.read().elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().elements.is_empty()
    }

    /// Earliest start, `None` when empty.
    pub fn start_time(&self) -> Option<i64> {
        self.inner.read().elements.first().map(|e| e.start)
    }

    /// Latest end, `None` when empty.
    pub fn end_time(&self) -> Option<i64> {
        self.inner.read().elements.iter().map(|e| e.end).max()
    }

    /// Snapshot of all elements in order.
    pub fn all_elements(&self) -> Vec<ScheduleElement> {
        self.inner.read().elements.clone()
    }

    /// Elements active at `t` (`start <= t < end`).
    pub fn elements_with_time(&self, t: i64) -> Vec<ScheduleElement> {
        self.filter(|e| e.contains_time(t))
    }

    /// Elements overlapping `[start, end)`.
    pub fn overlapping(&self, start: i64, end: i64) -> Vec<ScheduleElement> {
        self.filter(|e| e.start < end && e.end > start)
    }

    /// Elements enclosed by `[start, end]`.
    pub fn encapsulated(&self, start: i64, end: i64) -> Vec<ScheduleElement> {
        self.filter(|e| e.start >= start && e.end <= end)
    }

    /// Elements matching `pred`, in order.
    pub fn filter(&self, pred: impl Fn(&ScheduleElement) -> bool) -> Vec<ScheduleElement> {
        self.inner
            .read()
            .elements
            .iter()
            .filter(|e| pred(e))
            .copied()
            .collect()
    }

    /// An empty schedule with the same type label and element type.
    pub fn empty_like(&self) -> Schedule {
        let inner = self.inner.read();
        Schedule {
            inner: RwLock::new(ScheduleInner {
                schedule_type: inner.schedule_type.clone(),
                element_type: inner.element_type,
                elements: Vec::new(),
            }),
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new(ElementType::Plain)
    }
}

impl Clone for Schedule {
    fn clone(&self) -> Self {
        Self {
            inner: RwLock::new(self.inner.read().clone()),
        }
    }
}

impl PartialEq for Schedule {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let (a, b) = (self.inner.read(), other.inner.read());
        a.schedule_type == b.schedule_type
            && a.element_type == b.element_type
            && a.elements == b.elements
    }
}

/// Wire form of [`Schedule`].
#[derive(Serialize, Deserialize)]
struct ScheduleRepr {
    #[serde(default = "default_schedule_type")]
    schedule_type: String,
    #[serde(default)]
    element_type: ElementType,
    elements: Vec<ScheduleElement>,
}

fn default_schedule_type() -> String {
    DEFAULT_SCHEDULE_TYPE.to_string()
}

impl From<Schedule> for ScheduleRepr {
    fn from(s: Schedule) -> Self {
        let inner = s.inner.into_inner();
        Self {
            schedule_type: inner.schedule_type,
            element_type: inner.element_type,
            elements: inner.elements,
        }
    }
}

impl TryFrom<ScheduleRepr> for Schedule {
    type Error = PlanError;

    fn try_from(repr: ScheduleRepr) -> Result<Self, Self::Error> {
        let s = Schedule::new(repr.element_type);
        s.set_schedule_type(repr.schedule_type)?;
        s.set_elements(repr.elements)?;
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schedule {
        Schedule::from_elements(
            ElementType::WithValue,
            vec![
                ScheduleElement::with_value(5000, 8000, 3.0),
                ScheduleElement::with_value(0, 5000, 1.0),
                ScheduleElement::with_value(1000, 4000, 2.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_sorted_on_insert() {
        let s = sample();
        let starts: Vec<i64> = s.all_elements().iter().map(|e| e.start).collect();
        assert_eq!(starts, vec![0, 1000, 5000]);
        s.add(ScheduleElement::with_value(0, 2000, 9.0)).unwrap();
        let first_two: Vec<(i64, i64)> = s
            .all_elements()
            .iter()
            .take(2)
            .map(|e| (e.start, e.end))
            .collect();
        assert_eq!(first_two, vec![(0, 2000), (0, 5000)]);
    }

    #[test]
    fn test_bounds() {
        let s = sample();
        assert_eq!(s.start_time(), Some(0));
        assert_eq!(s.end_time(), Some(8000));
        let empty = Schedule::with_values();
        assert_eq!(empty.start_time(), None);
        assert_eq!(empty.end_time(), None);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_time_queries() {
        let s = sample();
        assert_eq!(s.elements_with_time(1000).len(), 2);
        // end is exclusive
        assert_eq!(s.elements_with_time(5000).len(), 1);
        assert_eq!(s.overlapping(3999, 5001).len(), 3);
        assert_eq!(s.overlapping(4000, 5000).len(), 1);
        assert_eq!(s.encapsulated(0, 5000).len(), 2);
        assert_eq!(s.filter(|e| e.value == Some(3.0)).len(), 1);
    }

    #[test]
    fn test_element_type_enforced() {
        let s = Schedule::with_values();
        match s.add(ScheduleElement::new(0, 10)) {
            Err(PlanError::ElementTypeMismatch { expected, found }) => {
                assert_eq!(expected, "ScheduleElementWithValue");
                assert_eq!(found, "ScheduleElement");
            }
            other => panic!("expected ElementTypeMismatch, got {other:?}"),
        }
        let plain = Schedule::new(ElementType::Plain);
        plain.add(ScheduleElement::with_value(0, 10, 1.0)).unwrap();
        plain.set_element_type(ElementType::WithValue).unwrap();
        plain.set_element_type(ElementType::Plain).unwrap();
        plain.add(ScheduleElement::new(0, 10)).unwrap();
        assert!(plain.set_element_type(ElementType::WithValue).is_err());
    }

    #[test]
    fn test_add_all_is_atomic() {
        let s = Schedule::with_values();
        let res = s.add_all(vec![
            ScheduleElement::with_value(0, 10, 1.0),
            ScheduleElement::new(10, 20),
        ]);
        assert!(res.is_err());
        assert!(s.is_empty());
    }

    #[test]
    fn test_schedule_type_only_while_empty() {
        let s = Schedule::with_values();
        assert_eq!(s.schedule_type(), "OTHER");
        s.set_schedule_type("INVENTORY").unwrap();
        s.add(ScheduleElement::with_value(0, 1, 1.0)).unwrap();
        match s.set_schedule_type("TOTAL_CAPACITY") {
            Err(PlanError::ScheduleNotEmpty { .. }) => {}
            other => panic!("expected ScheduleNotEmpty, got {other:?}"),
        }
        s.clear();
        s.set_schedule_type("TOTAL_CAPACITY").unwrap();
    }

    #[test]
    fn test_remove_and_set_elements() {
        let s = sample();
        assert!(s.remove(&ScheduleElement::with_value(1000, 4000, 2.0)));
        assert!(!s.remove(&ScheduleElement::with_value(1000, 4000, 2.0)));
        assert_eq!(s.len(), 2);
        s.set_elements(vec![
            ScheduleElement::with_value(9, 10, 1.0),
            ScheduleElement::with_value(1, 2, 1.0),
        ])
        .unwrap();
        assert_eq!(s.start_time(), Some(1));
    }

    #[test]
    fn test_snapshot_survives_mutation() {
        let s = sample();
        let snap = s.all_elements();
        s.clear();
        assert_eq!(snap.len(), 3);
    }

    #[test]
    fn test_serde_round_trip() {
        let s = sample().labelled("x");
        assert!(s.is_err());
        let s = Schedule::with_values().labelled("INVENTORY").unwrap();
        s.add_all(sample().all_elements()).unwrap();
        let json = serde_json::to_string(&s).unwrap();
        let back: Schedule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
        assert_eq!(back.schedule_type(), "INVENTORY");
    }

    #[test]
    fn test_deserialize_checks_element_type() {
        let json = r#"{"element_type":"WithValue","elements":[{"start":0,"end":1,"value":null}]}"#;
        assert!(serde_json::from_str::<Schedule>(json).is_err());
    }
}
