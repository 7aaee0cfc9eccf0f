//! # tribles-query
//!
//! Worst-case optimal multi-way joins over fixed-width tribles.
//!
//! A trible is a 64-byte fact: a 16-byte entity id, a 16-byte attribute id
//! and a 32-byte value. A [`TribleSet`] indexes its facts under 13 byte
//! orderings, one per way of assigning an `(entity, attribute, value)`
//! pattern to query variables, so every pattern is answered by walking a
//! single sorted index.
//!
//! Queries are conjunctions of [`Constraint`]s over numbered variable
//! slots. The engine binds slot 0, then slot 1, and so on, intersecting all
//! cursors that touch a slot by leapfrogging, and yields a lazy sequence of
//! [`Binding`]s.
//!
//! ```
//! use tribles_query::{query, Constraint, Id, QueryOptions, Trible, TribleSet, TripleConstraint, Value};
//!
//! let set = TribleSet::from_tribles([
//!     Trible::new(Id::from_u128(1), Id::from_u128(10), Value::from_u128(7)),
//!     Trible::new(Id::from_u128(2), Id::from_u128(10), Value::from_u128(8)),
//! ]);
//! let constraints: Vec<Box<dyn Constraint>> =
//!     vec![Box::new(TripleConstraint::new(&set, [0, 1, 2]))];
//! let rows: Vec<_> = query(&constraints, &QueryOptions::new(3)).unwrap().collect();
//! assert_eq!(rows.len(), 2);
//! ```
//!
//! [`VariableContext`] offers the same engine behind named variables.

// ============================================================================
// Modules
// ============================================================================

pub mod constraint;
pub mod error;
pub mod index;
pub mod ordering;
pub mod query;
pub mod trace;
pub mod trible;
pub mod tribleset;
pub mod variables;

// ============================================================================
// Re-exports
// ============================================================================

pub use constraint::{
    CollectionConstraint, ConstantConstraint, Constraint, Cursor, IndexConstraint, TripleConstraint,
};
pub use error::{IndexError, QueryError};
pub use index::{IndexBuilder, IndexCursor, SortedIndex};
pub use ordering::{classify, distinct_slots, signature, IndexOrdering, INDEX_COUNT};
pub use query::{exists, query, query_traced, Binding, Query, QueryOptions};
pub use trace::{NoTrace, SearchEvent, TraceMode, WithTrace};
pub use trible::{equal_id, Id, Trible, Value, ID_SIZE, TRIBLE_SIZE, VALUE_SIZE};
pub use tribleset::TribleSet;
pub use variables::{
    short_string, short_string_value, Plan, Row, Rows, Term, ValueKind, Variable, VariableContext,
};
