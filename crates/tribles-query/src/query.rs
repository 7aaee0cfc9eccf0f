//! The multi-way join engine.
//!
//! A depth-first, backtracking leapfrog intersection: slot `d` of the query
//! is bound at search depth `d`, by every cursor whose constraint touches
//! that slot. At each depth the cursors are aligned circularly (each one
//! seeks to the current candidate; a miss makes its value the new
//! candidate) until all of them agree, and the search then descends. When a
//! depth runs dry its cursors are popped and the enclosing depth advances.
//!
//! The search is an explicit state machine driven by [`Query::next`]; it
//! suspends only when a row is produced, so a consumer can stop at any
//! point without signalling the engine. No intermediate join result is
//! ever materialized.
//!
//! ## Projection
//!
//! With `projection_count = k < variable_count`, rows are still produced
//! only after every slot is bound, but afterwards the search rewinds just
//! to depth `k - 1`. Every distinct assignment of the first `k` slots that
//! has at least one full solution is therefore emitted exactly once, and
//! the remaining slots of that row hold the first solution found.
//! `projection_count = 0` is an existence check: at most one row.

use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::constraint::{Constraint, Cursor};
use crate::error::QueryError;
use crate::trace::{NoTrace, SearchEvent, TraceJournal, TraceMode, WithTrace};
use crate::trible::Value;

// ============================================================================
// Options and rows
// ============================================================================

/// Shape of a query: how many slots, how many are projected, and the
/// enumeration direction of each slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub variable_count: usize,
    /// Defaults to `variable_count`.
    #[serde(default)]
    pub projection_count: Option<usize>,
    /// One flag per slot; empty means all ascending.
    #[serde(default)]
    pub ascending: Vec<bool>,
}

impl QueryOptions {
    pub fn new(variable_count: usize) -> Self {
        Self {
            variable_count,
            projection_count: None,
            ascending: Vec::new(),
        }
    }

    pub fn project(mut self, projection_count: usize) -> Self {
        self.projection_count = Some(projection_count);
        self
    }

    pub fn directions(mut self, ascending: Vec<bool>) -> Self {
        self.ascending = ascending;
        self
    }

    /// Enumerate `slot` in descending byte order.
    pub fn descend(mut self, slot: usize) -> Self {
        if self.ascending.is_empty() {
            self.ascending = vec![true; self.variable_count];
        }
        if let Some(flag) = self.ascending.get_mut(slot) {
            *flag = false;
        }
        self
    }

    fn validate(&self) -> Result<(usize, Vec<bool>), QueryError> {
        let projection_count = self.projection_count.unwrap_or(self.variable_count);
        if projection_count > self.variable_count {
            return Err(QueryError::ProjectionOutOfRange {
                projection_count,
                variable_count: self.variable_count,
            });
        }
        let ascending = if self.ascending.is_empty() {
            vec![true; self.variable_count]
        } else if self.ascending.len() == self.variable_count {
            self.ascending.clone()
        } else {
            return Err(QueryError::DirectionCountMismatch {
                expected: self.variable_count,
                actual: self.ascending.len(),
            });
        };
        Ok((projection_count, ascending))
    }
}

/// One solution: a value per slot, addressed by slot index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Binding(Vec<Value>);

impl Binding {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&Value> {
        self.0.get(slot)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// The first `k` slots.
    pub fn projected(&self, k: usize) -> &[Value] {
        &self.0[..k.min(self.0.len())]
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

impl Index<usize> for Binding {
    type Output = Value;

    fn index(&self, slot: usize) -> &Value {
        &self.0[slot]
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Depth 0 has not been pushed yet.
    Start,
    /// Align the cursors of the current depth.
    Align,
    /// A row was emitted; rewind to the projection boundary.
    Resume,
    Done,
}

/// A lazy, single-pass sequence of [`Binding`]s.
pub struct Query<M: TraceMode = NoTrace> {
    cursors: Vec<Box<dyn Cursor>>,
    /// Cursor ids registered at each depth.
    depths: Vec<Vec<usize>>,
    ascending: Vec<bool>,
    bindings: Vec<Value>,
    depth: usize,
    /// `None` for the existence check.
    projection_depth: Option<usize>,
    phase: Phase,
    emitted: usize,
    journal: TraceJournal<M, SearchEvent>,
}

/// Start a query over `constraints`.
pub fn query(
    constraints: &[Box<dyn Constraint>],
    options: &QueryOptions,
) -> Result<Query, QueryError> {
    Query::new(constraints, options)
}

/// Like [`query`], recording every search step.
pub fn query_traced(
    constraints: &[Box<dyn Constraint>],
    options: &QueryOptions,
) -> Result<Query<WithTrace>, QueryError> {
    Query::new(constraints, options)
}

/// Whether `constraints` have at least one solution.
pub fn exists(constraints: &[Box<dyn Constraint>], variable_count: usize) -> Result<bool, QueryError> {
    let options = QueryOptions::new(variable_count).project(0);
    Ok(query(constraints, &options)?.next().is_some())
}

impl<M: TraceMode> Query<M> {
    pub fn new(constraints: &[Box<dyn Constraint>], options: &QueryOptions) -> Result<Self, QueryError> {
        let (projection_count, ascending) = options.validate()?;
        let variable_count = options.variable_count;

        let mut cursors: Vec<Box<dyn Cursor>> = Vec::with_capacity(constraints.len());
        let mut depths: Vec<Vec<usize>> = vec![Vec::new(); variable_count];
        let mut empty = false;
        for constraint in constraints {
            let mut variables = constraint.variables();
            variables.sort_unstable();
            variables.dedup();
            for &slot in &variables {
                if slot >= variable_count {
                    return Err(QueryError::SlotOutOfRange {
                        slot,
                        variable_count,
                    });
                }
            }

            let cursor = constraint.cursor();
            empty |= !cursor.is_valid();
            let id = cursors.len();
            cursors.push(cursor);
            for slot in variables {
                depths[slot].push(id);
            }
        }
        if let Some(slot) = depths.iter().position(Vec::is_empty) {
            return Err(QueryError::UnconstrainedSlot { slot });
        }

        tracing::debug!(
            constraints = constraints.len(),
            variable_count,
            projection_count,
            empty,
            "query prepared"
        );

        let phase = if empty || variable_count == 0 {
            Phase::Done
        } else {
            Phase::Start
        };
        Ok(Self {
            cursors,
            depths,
            ascending,
            bindings: vec![Value::ZERO; variable_count],
            depth: 0,
            projection_depth: projection_count.checked_sub(1),
            phase,
            emitted: 0,
            journal: TraceJournal::new(),
        })
    }

    pub fn variable_count(&self) -> usize {
        self.bindings.len()
    }

    /// Rows produced so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn is_exhausted(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn trace(&self) -> &M::Journal<Vec<SearchEvent>> {
        self.journal.entries()
    }

    pub fn into_trace(self) -> M::Journal<Vec<SearchEvent>> {
        self.journal.into_entries()
    }

    fn push_depth(&mut self) {
        let ascending = self.ascending[self.depth];
        for &id in &self.depths[self.depth] {
            self.cursors[id].push(ascending);
        }
        let depth = self.depth;
        self.journal.record(|| SearchEvent::Push { depth });
    }

    fn pop_depth(&mut self) {
        for &id in &self.depths[self.depth] {
            self.cursors[id].pop();
        }
        let depth = self.depth;
        self.journal.record(|| SearchEvent::Backtrack { depth });
    }

    /// Advance the shared position of the current depth. All of its
    /// cursors agreed before the deeper scope was entered, so moving any
    /// one of them moves the depth.
    fn next_first(&mut self) {
        let id = self.depths[self.depth][0];
        self.cursors[id].next();
    }

    /// Leapfrog the cursors of the current depth to a common value.
    fn align(&mut self) -> Option<Value> {
        let ids = &self.depths[self.depth];
        let n = ids.len();
        let mut origin = 0;
        let mut candidate = self.cursors[ids[origin]].peek()?;
        let mut i = origin;
        loop {
            i = (i + 1) % n;
            if i == origin {
                return Some(candidate);
            }
            let cursor = &mut self.cursors[ids[i]];
            if !cursor.seek(&candidate) {
                candidate = cursor.peek()?;
                origin = i;
            }
        }
    }

    fn finish(&mut self) {
        self.phase = Phase::Done;
        self.journal.record(|| SearchEvent::Exhausted);
        tracing::debug!(emitted = self.emitted, "query exhausted");
    }

    /// Run the search until the next row or the end.
    pub fn advance(&mut self) -> Option<Binding> {
        let max_depth = self.bindings.len().checked_sub(1)?;
        loop {
            match self.phase {
                Phase::Done => return None,
                Phase::Start => {
                    self.push_depth();
                    self.phase = Phase::Align;
                }
                Phase::Resume => {
                    let Some(boundary) = self.projection_depth else {
                        self.finish();
                        return None;
                    };
                    while self.depth > boundary {
                        self.pop_depth();
                        self.depth -= 1;
                    }
                    self.next_first();
                    self.phase = Phase::Align;
                }
                Phase::Align => match self.align() {
                    Some(candidate) => {
                        self.bindings[self.depth] = candidate;
                        let depth = self.depth;
                        self.journal.record(|| SearchEvent::Accept { depth });
                        if depth == max_depth {
                            self.phase = Phase::Resume;
                            self.emitted += 1;
                            self.journal.record(|| SearchEvent::Emit);
                            tracing::trace!(row = self.emitted, "query emitted row");
                            return Some(Binding(self.bindings.clone()));
                        }
                        self.depth += 1;
                        self.push_depth();
                    }
                    None => {
                        if self.depth == 0 {
                            self.finish();
                            return None;
                        }
                        self.pop_depth();
                        self.depth -= 1;
                        self.next_first();
                    }
                },
            }
        }
    }
}

impl<M: TraceMode> Iterator for Query<M> {
    type Item = Binding;

    fn next(&mut self) -> Option<Binding> {
        self.advance()
    }
}

impl<M: TraceMode> std::iter::FusedIterator for Query<M> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{CollectionConstraint, ConstantConstraint, TripleConstraint};
    use crate::trible::{Id, Trible};
    use crate::tribleset::TribleSet;

    fn id(n: u128) -> Value {
        Value::from_id(Id::from_u128(n))
    }

    fn fact(e: u128, a: u128, v: u128) -> Trible {
        Trible::new(Id::from_u128(e), Id::from_u128(a), Value::from_u128(v))
    }

    #[test]
    fn collections_intersect() {
        let constraints: Vec<Box<dyn Constraint>> = vec![
            Box::new(CollectionConstraint::new(0, [id(1), id(3), id(5), id(7)])),
            Box::new(CollectionConstraint::new(0, [id(3), id(4), id(5)])),
            Box::new(CollectionConstraint::new(0, [id(5), id(3), id(9)])),
        ];
        let rows: Vec<Value> = query(&constraints, &QueryOptions::new(1))
            .unwrap()
            .map(|b| b[0])
            .collect();
        assert_eq!(rows, vec![id(3), id(5)]);
    }

    #[test]
    fn unconstrained_slot_is_a_setup_error() {
        let constraints: Vec<Box<dyn Constraint>> =
            vec![Box::new(ConstantConstraint::new(0, id(1)))];
        assert_eq!(
            query(&constraints, &QueryOptions::new(2)).err(),
            Some(QueryError::UnconstrainedSlot { slot: 1 })
        );
    }

    #[test]
    fn out_of_range_slot_is_a_setup_error() {
        let constraints: Vec<Box<dyn Constraint>> =
            vec![Box::new(ConstantConstraint::new(3, id(1)))];
        assert_eq!(
            query(&constraints, &QueryOptions::new(1)).err(),
            Some(QueryError::SlotOutOfRange {
                slot: 3,
                variable_count: 1
            })
        );
    }

    #[test]
    fn option_validation() {
        let constraints: Vec<Box<dyn Constraint>> =
            vec![Box::new(ConstantConstraint::new(0, id(1)))];
        assert!(matches!(
            query(&constraints, &QueryOptions::new(1).project(2)),
            Err(QueryError::ProjectionOutOfRange { .. })
        ));
        assert!(matches!(
            query(&constraints, &QueryOptions::new(1).directions(vec![true, false])),
            Err(QueryError::DirectionCountMismatch {
                expected: 1,
                actual: 2
            })
        ));
    }

    #[test]
    fn zero_variables_yield_nothing() {
        let mut q = query(&[], &QueryOptions::new(0)).unwrap();
        assert_eq!(q.next(), None);
        assert!(q.is_exhausted());
    }

    #[test]
    fn projection_zero_is_an_existence_check() {
        let set = TribleSet::from_tribles([fact(1, 2, 3), fact(4, 2, 5)]);
        let constraints: Vec<Box<dyn Constraint>> =
            vec![Box::new(TripleConstraint::new(&set, [0, 1, 2]))];
        let rows: Vec<_> = query(&constraints, &QueryOptions::new(3).project(0))
            .unwrap()
            .collect();
        assert_eq!(rows.len(), 1);
        assert!(exists(&constraints, 3).unwrap());

        let constraints: Vec<Box<dyn Constraint>> = vec![
            Box::new(TripleConstraint::new(&set, [0, 1, 2])),
            Box::new(ConstantConstraint::new(1, id(9))),
        ];
        assert!(!exists(&constraints, 3).unwrap());
    }

    #[test]
    fn trace_shows_no_realignment_without_backtrack() {
        let set = TribleSet::from_tribles([fact(1, 2, 3), fact(1, 2, 4)]);
        let constraints: Vec<Box<dyn Constraint>> =
            vec![Box::new(TripleConstraint::new(&set, [0, 1, 2]))];
        let mut q = query_traced(&constraints, &QueryOptions::new(3)).unwrap();
        assert_eq!(q.by_ref().count(), 2);
        let trace = q.into_trace();
        let accepts_at_zero = trace
            .iter()
            .filter(|e| **e == SearchEvent::Accept { depth: 0 })
            .count();
        assert_eq!(accepts_at_zero, 1);
        assert_eq!(trace.last(), Some(&SearchEvent::Exhausted));
        assert_eq!(
            trace.iter().filter(|e| **e == SearchEvent::Emit).count(),
            2
        );
    }
}
