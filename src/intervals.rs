//! Interval algebra over value-bearing schedules.
//!
//! A value schedule describes a step curve: at time `t` its level is the
//! sum of the values of the elements covering `t`. The operations here
//! rewrite schedules without changing that curve.
//!
//! - [`simplify`]: split overlapping elements so the output is sorted and
//!   pairwise disjoint.
//! - [`combine_like_elements`]: merge neighbors that carry the same value.
//!   Run it after `simplify`, never before.
//! - [`add_schedules`] / [`subtract_schedules`]: pointwise sum and
//!   difference of two curves.
//!
//! # Algorithm
//! `simplify` consumes elements in start order against one pending span.
//! When the next element overlaps the pending span, the overlap becomes the
//! new pending span with the summed value, the part before it is emitted,
//! and the part after the shorter end is pushed back. Pushed-back spans
//! are kept ordered by decreasing start and re-enter the stream as soon as
//! the input reaches their start, so consumption stays in start order.
//!
//! Each element is visited a bounded number of times per overlap, giving
//! O(n·k) for n elements with at most k overlapping at any instant.

use crate::config::PlanConfig;
use crate::error::{PlanError, PlanResult};
use crate::models::{ElementType, Schedule, ScheduleElement};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Span {
    start: i64,
    end: i64,
    value: f64,
}

impl Span {
    fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && self.end > other.start
    }

    fn element(self) -> ScheduleElement {
        ScheduleElement::with_value(self.start, self.end, self.value)
    }
}

#[derive(Debug, Default)]
struct Sweep {
    pending: Option<Span>,
    /// Ordered by decreasing start; the next to re-enter is last.
    pushback: Vec<Span>,
    out: Vec<Span>,
}

impl Sweep {
    fn push_back(&mut self, span: Span) {
        let at = self
            .pushback
            .iter()
            .position(|p| span.start > p.start)
            .unwrap_or(self.pushback.len());
        self.pushback.insert(at, span);
    }

    fn apply(&mut self, span: Span) {
        while let Some(last) = self.pushback.last().copied() {
            if last.start > span.start {
                break;
            }
            self.pushback.pop();
            self.consume(last);
        }
        self.consume(span);
    }

    fn consume(&mut self, span: Span) {
        let Some(pending) = self.pending else {
            self.pending = Some(span);
            return;
        };
        if !pending.overlaps(&span) {
            self.out.push(pending);
            self.pending = Some(span);
            return;
        }

        if pending.start < span.start {
            self.out.push(Span {
                start: pending.start,
                end: span.start,
                value: pending.value,
            });
        }
        let lesser = if pending.end < span.end {
            self.push_back(Span {
                start: pending.end,
                end: span.end,
                value: span.value,
            });
            pending.end
        } else {
            if pending.end > span.end {
                self.push_back(Span {
                    start: span.end,
                    end: pending.end,
                    value: pending.value,
                });
            }
            span.end
        };
        self.pending = Some(Span {
            start: span.start,
            end: lesser,
            value: pending.value + span.value,
        });
    }

    fn finish(mut self) -> Vec<Span> {
        while let Some(last) = self.pushback.pop() {
            self.consume(last);
        }
        if let Some(pending) = self.pending.take() {
            self.out.push(pending);
        }
        self.out
    }
}

fn spans(elements: &[ScheduleElement]) -> PlanResult<Vec<Span>> {
    elements
        .iter()
        .map(|e| {
            e.value
                .map(|value| Span {
                    start: e.start,
                    end: e.end,
                    value,
                })
                .ok_or(PlanError::NotValueBearing)
        })
        .collect()
}

/// Disjoint elements with the same value curve as `elements`.
///
/// The output is sorted by start, and no two output elements overlap.
///
/// # Errors
/// `NotValueBearing` if any element has no value.
pub fn simplify_elements(elements: &[ScheduleElement]) -> PlanResult<Vec<ScheduleElement>> {
    let mut input = spans(elements)?;
    input.sort_by_key(|s| s.start);
    let mut sweep = Sweep::default();
    for span in input {
        sweep.apply(span);
    }
    Ok(sweep.finish().into_iter().map(Span::element).collect())
}

/// A schedule with disjoint elements and the same value curve.
///
/// The result keeps the type label and element type of `schedule`.
///
/// # Errors
/// `NotValueBearing` if any element has no value.
pub fn simplify(schedule: &Schedule) -> PlanResult<Schedule> {
    let out = schedule.empty_like();
    out.set_elements(simplify_elements(&schedule.all_elements())?)?;
    Ok(out)
}

/// Merges consecutive elements that carry the same value and are at most
/// `gap` apart.
///
/// Elements are read in schedule order. The merged element spans from the
/// first start to the last end of its run.
///
/// # Errors
/// `NotValueBearing` for a plain schedule or any element without a value.
pub fn combine_like_elements(schedule: &Schedule, gap: i64) -> PlanResult<Schedule> {
    if schedule.element_type() != ElementType::WithValue {
        return Err(PlanError::NotValueBearing);
    }
    let input = spans(&schedule.all_elements())?;
    let mut merged: Vec<Span> = Vec::new();
    for span in input {
        match merged.last_mut() {
            Some(run) if span.start <= run.end.saturating_add(gap) && span.value == run.value => {
                run.end = span.end;
            }
            _ => merged.push(span),
        }
    }
    let out = schedule.empty_like();
    out.set_elements(merged.into_iter().map(Span::element))?;
    Ok(out)
}

/// [`combine_like_elements`] bridging gaps up to `config.combine_gap`.
///
/// # Errors
/// As [`combine_like_elements`].
pub fn combine_like_elements_with(
    schedule: &Schedule,
    config: &PlanConfig,
) -> PlanResult<Schedule> {
    combine_like_elements(schedule, config.combine_gap)
}

/// Pointwise sum of two value schedules.
///
/// # Errors
/// `NotValueBearing` if either schedule holds an element without a value.
pub fn add_schedules(a: &Schedule, b: &Schedule) -> PlanResult<Schedule> {
    let mut elements = a.all_elements();
    elements.extend(b.all_elements());
    let out = a.empty_like();
    out.set_elements(simplify_elements(&elements)?)?;
    Ok(out)
}

/// Pointwise difference `a - b` of two value schedules.
///
/// # Errors
/// `NotValueBearing` if either schedule holds an element without a value.
pub fn subtract_schedules(a: &Schedule, b: &Schedule) -> PlanResult<Schedule> {
    let mut elements = a.all_elements();
    for e in b.all_elements() {
        let value = e.value.ok_or(PlanError::NotValueBearing)?;
        elements.push(e.new_element(e.start, e.end, -value));
    }
    let out = a.empty_like();
    out.set_elements(simplify_elements(&elements)?)?;
    Ok(out)
}

/// Sum of the element values. Plain elements count as zero.
pub fn sum_elements<'a>(elements: impl IntoIterator<Item = &'a ScheduleElement>) -> f64 {
    elements.into_iter().filter_map(|e| e.value).sum()
}

/// Integral of the value curve over `[start, end)`.
pub fn integral(elements: &[ScheduleElement], start: i64, end: i64) -> f64 {
    elements
        .iter()
        .filter_map(|e| {
            let value = e.value?;
            let overlap = e.end.min(end) - e.start.max(start);
            (overlap > 0).then(|| value * overlap as f64)
        })
        .sum()
}
