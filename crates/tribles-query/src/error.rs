//! Setup-time errors.
//!
//! Every misuse the engine can detect is reported before the first search
//! step. Once a [`crate::Query`] exists it never fails: an unsatisfiable
//! query and a query over an empty set both just end.

use crate::variables::ValueKind;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("expected a {expected}-byte field, got {actual} bytes")]
    InvalidWidth { expected: usize, actual: usize },

    #[error("constraint touches slot {slot}, but the query only has {variable_count} variables")]
    SlotOutOfRange { slot: usize, variable_count: usize },

    #[error("slot {slot} is not constrained by any constraint")]
    UnconstrainedSlot { slot: usize },

    #[error("projection of {projection_count} slots exceeds the {variable_count} query variables")]
    ProjectionOutOfRange {
        projection_count: usize,
        variable_count: usize,
    },

    #[error("expected {expected} direction flags, got {actual}")]
    DirectionCountMismatch { expected: usize, actual: usize },

    #[error("slot {slot} is already occupied by another variable")]
    SlotOccupied { slot: usize },

    #[error("variable `{variable}` is used with incompatible value kinds {existing:?} and {requested:?}")]
    IncompatibleKinds {
        variable: String,
        existing: ValueKind,
        requested: ValueKind,
    },
}

/// Errors raised while assembling a [`crate::SortedIndex`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("index keys are {expected} bytes wide, got a {actual}-byte key")]
    KeyWidth { expected: usize, actual: usize },

    #[error("cannot combine indexes of key width {left} and {right}")]
    WidthMismatch { left: usize, right: usize },
}
