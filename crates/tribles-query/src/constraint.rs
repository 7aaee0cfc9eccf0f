//! Constraints and the cursors they hand to the join engine.
//!
//! A [`Constraint`] names the variable slots it restricts and produces a
//! fresh [`Cursor`] per query. Cursors speak in 32-byte [`Value`]s: a
//! 16-byte id bound to a slot is presented left-padded, exactly as it is
//! stored in a trible's value position, so cursors over different roles
//! agree on one byte order.
//!
//! Cursors own nothing but handles to immutable index snapshots; dropping
//! a query mid-iteration needs no cleanup.

use crate::error::QueryError;
use crate::index::{IndexCursor, SortedIndex};
use crate::ordering::{classify, distinct_slots, IndexOrdering};
use crate::trible::{Value, VALUE_SIZE};
use crate::tribleset::TribleSet;

/// Scoped sorted iteration, uniform across all constraint variants.
pub trait Cursor: Send {
    /// `false` once the current scope is exhausted.
    fn is_valid(&self) -> bool;

    /// The current value; `None` when invalid. Idempotent.
    fn peek(&self) -> Option<Value>;

    /// Advance to the next distinct value in scope order.
    fn next(&mut self);

    /// Move to the first value at or past `target` in scope order; `true`
    /// iff that value equals `target`.
    fn seek(&mut self, target: &Value) -> bool;

    /// Descend into the scope below the current value.
    fn push(&mut self, ascending: bool);

    /// Return to the enclosing scope.
    fn pop(&mut self);
}

pub trait Constraint {
    /// The slots this constraint restricts, in increasing order.
    fn variables(&self) -> Vec<usize>;

    fn cursor(&self) -> Box<dyn Cursor>;
}

// ============================================================================
// Constant
// ============================================================================

/// Binds one slot to one fixed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantConstraint {
    variable: usize,
    constant: Value,
}

impl ConstantConstraint {
    pub fn new(variable: usize, constant: Value) -> Self {
        Self { variable, constant }
    }

    /// Fails when `bytes` is not exactly one value wide.
    pub fn from_bytes(variable: usize, bytes: &[u8]) -> Result<Self, QueryError> {
        Ok(Self::new(variable, Value::try_from(bytes)?))
    }
}

impl Constraint for ConstantConstraint {
    fn variables(&self) -> Vec<usize> {
        vec![self.variable]
    }

    fn cursor(&self) -> Box<dyn Cursor> {
        Box::new(ConstantCursor {
            constant: self.constant,
            valid: true,
            ascending: true,
        })
    }
}

#[derive(Debug, Clone)]
struct ConstantCursor {
    constant: Value,
    valid: bool,
    ascending: bool,
}

impl Cursor for ConstantCursor {
    fn is_valid(&self) -> bool {
        self.valid
    }

    fn peek(&self) -> Option<Value> {
        self.valid.then_some(self.constant)
    }

    fn next(&mut self) {
        self.valid = false;
    }

    fn seek(&mut self, target: &Value) -> bool {
        if !self.valid {
            return false;
        }
        match self.constant.cmp(target) {
            std::cmp::Ordering::Equal => true,
            std::cmp::Ordering::Less => {
                // Ascending: the target lies beyond the only value.
                if self.ascending {
                    self.valid = false;
                }
                false
            }
            std::cmp::Ordering::Greater => {
                if !self.ascending {
                    self.valid = false;
                }
                false
            }
        }
    }

    fn push(&mut self, ascending: bool) {
        self.ascending = ascending;
    }

    fn pop(&mut self) {
        self.valid = true;
    }
}

// ============================================================================
// Collection / Index
// ============================================================================

/// Enumerates the 32-byte keys of a value index.
#[derive(Debug, Clone)]
struct ValueIndexCursor<V> {
    cursor: IndexCursor<V>,
}

impl<V: Send + Sync> Cursor for ValueIndexCursor<V> {
    fn is_valid(&self) -> bool {
        self.cursor.is_valid()
    }

    fn peek(&self) -> Option<Value> {
        self.cursor.peek().map(Value::from_infix)
    }

    fn next(&mut self) {
        self.cursor.next();
    }

    fn seek(&mut self, target: &Value) -> bool {
        self.cursor.seek(&target.0)
    }

    fn push(&mut self, ascending: bool) {
        self.cursor.push(VALUE_SIZE, ascending);
    }

    fn pop(&mut self) {
        self.cursor.pop();
    }
}

/// Binds one slot to a finite set of values, indexed privately.
#[derive(Debug, Clone)]
pub struct CollectionConstraint {
    variable: usize,
    index: SortedIndex,
}

impl CollectionConstraint {
    pub fn new(variable: usize, values: impl IntoIterator<Item = Value>) -> Self {
        let keys = values
            .into_iter()
            .map(|v| Box::<[u8]>::from(&v.0[..]))
            .collect();
        Self {
            variable,
            index: SortedIndex::from_unsorted_keys(VALUE_SIZE, keys),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl Constraint for CollectionConstraint {
    fn variables(&self) -> Vec<usize> {
        vec![self.variable]
    }

    fn cursor(&self) -> Box<dyn Cursor> {
        Box::new(ValueIndexCursor {
            cursor: self.index.cursor(),
        })
    }
}

/// Binds one slot to the keys of an existing value index. The index is
/// shared, not copied; its payloads are ignored.
#[derive(Debug, Clone)]
pub struct IndexConstraint<V = ()> {
    variable: usize,
    index: SortedIndex<V>,
}

impl<V> IndexConstraint<V> {
    pub fn new(variable: usize, index: &SortedIndex<V>) -> Result<Self, QueryError> {
        if index.width() != VALUE_SIZE && !index.is_empty() {
            return Err(QueryError::InvalidWidth {
                expected: VALUE_SIZE,
                actual: index.width(),
            });
        }
        Ok(Self {
            variable,
            index: index.clone(),
        })
    }
}

impl<V: Send + Sync + 'static> Constraint for IndexConstraint<V> {
    fn variables(&self) -> Vec<usize> {
        vec![self.variable]
    }

    fn cursor(&self) -> Box<dyn Cursor> {
        Box::new(ValueIndexCursor {
            cursor: self.index.cursor(),
        })
    }
}

// ============================================================================
// Triple pattern
// ============================================================================

/// Binds the distinct slots of an `[entity, attribute, value]` pattern
/// against the matching ordering of a [`TribleSet`].
#[derive(Debug, Clone)]
pub struct TripleConstraint {
    pattern: [usize; 3],
    ordering: IndexOrdering,
    index: SortedIndex,
}

impl TripleConstraint {
    pub fn new(set: &TribleSet, pattern: [usize; 3]) -> Self {
        let ordering = classify(pattern);
        Self {
            pattern,
            ordering,
            index: set.index(ordering).clone(),
        }
    }

    pub fn ordering(&self) -> IndexOrdering {
        self.ordering
    }

    pub fn pattern(&self) -> [usize; 3] {
        self.pattern
    }
}

impl Constraint for TripleConstraint {
    fn variables(&self) -> Vec<usize> {
        distinct_slots(self.pattern)
    }

    fn cursor(&self) -> Box<dyn Cursor> {
        Box::new(TripleCursor {
            schedule: self.ordering.infix_schedule(),
            cursor: self.index.cursor(),
            depth: 0,
        })
    }
}

/// Walks one ordering's keys, one schedule entry per pushed depth.
#[derive(Debug, Clone)]
struct TripleCursor {
    schedule: &'static [usize],
    cursor: IndexCursor,
    depth: usize,
}

impl TripleCursor {
    fn infix_len(&self) -> usize {
        self.schedule.get(self.depth).copied().unwrap_or(0)
    }
}

impl Cursor for TripleCursor {
    fn is_valid(&self) -> bool {
        self.cursor.is_valid()
    }

    fn peek(&self) -> Option<Value> {
        self.cursor.peek().map(Value::from_infix)
    }

    fn next(&mut self) {
        self.cursor.next();
    }

    fn seek(&mut self, target: &Value) -> bool {
        let (pad, infix) = target.0.split_at(VALUE_SIZE - self.infix_len());
        if pad.iter().any(|&b| b != 0) {
            // `target` is wider than any infix at this depth: past the end
            // ascending, at or before every remaining infix descending.
            if self.cursor.is_ascending() {
                self.cursor.exhaust();
            }
            return false;
        }
        self.cursor.seek(infix)
    }

    fn push(&mut self, ascending: bool) {
        self.depth += 1;
        debug_assert!(self.depth < self.schedule.len());
        let len = self.infix_len();
        self.cursor.push(len, ascending);
    }

    fn pop(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.cursor.pop();
    }
}
