//! Optional search traces.
//!
//! The join engine is generic over a [`TraceMode`]. With [`NoTrace`] (the
//! default) the event closures are never evaluated and the journal is `()`,
//! so untraced queries pay nothing. With [`WithTrace`] every push, accept,
//! backtrack and emission is recorded, which is how tests observe that a
//! depth is never re-aligned without an enclosing backtrack.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// Compile-time switch for whether the engine records search events.
pub trait TraceMode {
    /// What a journal holds: `()` when disabled, `P` when enabled.
    type Journal<P>;

    /// Conditionally evaluate `produce`. Must not evaluate it when disabled.
    fn capture<P>(produce: impl FnOnce() -> P) -> Self::Journal<P>;

    fn with_mut<P>(journal: &mut Self::Journal<P>, f: impl FnOnce(&mut P));
}

#[derive(Debug)]
pub enum NoTrace {}

impl TraceMode for NoTrace {
    type Journal<P> = ();

    #[inline]
    fn capture<P>(_produce: impl FnOnce() -> P) -> Self::Journal<P> {}

    #[inline]
    fn with_mut<P>(_journal: &mut Self::Journal<P>, _f: impl FnOnce(&mut P)) {}
}

#[derive(Debug)]
pub enum WithTrace {}

impl TraceMode for WithTrace {
    type Journal<P> = P;

    #[inline]
    fn capture<P>(produce: impl FnOnce() -> P) -> Self::Journal<P> {
        produce()
    }

    #[inline]
    fn with_mut<P>(journal: &mut Self::Journal<P>, f: impl FnOnce(&mut P)) {
        f(journal)
    }
}

/// One step of the join search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SearchEvent {
    /// All cursors of `depth` descended into a new scope.
    Push { depth: usize },
    /// The cursors of `depth` agreed on a candidate.
    Accept { depth: usize },
    /// `depth` ran dry; its cursors were popped.
    Backtrack { depth: usize },
    /// A solution row was produced.
    Emit,
    /// The search is over.
    Exhausted,
}

/// Accumulates events only when `M = WithTrace`.
#[derive(Debug)]
pub struct TraceJournal<M: TraceMode, Entry> {
    entries: M::Journal<Vec<Entry>>,
    _phantom: PhantomData<Entry>,
}

impl<M: TraceMode, Entry> TraceJournal<M, Entry> {
    pub fn new() -> Self {
        Self {
            entries: M::capture(Vec::new),
            _phantom: PhantomData,
        }
    }

    pub fn record(&mut self, produce: impl FnOnce() -> Entry) {
        M::with_mut(&mut self.entries, |entries| entries.push(produce()));
    }

    pub fn entries(&self) -> &M::Journal<Vec<Entry>> {
        &self.entries
    }

    pub fn into_entries(self) -> M::Journal<Vec<Entry>> {
        self.entries
    }
}

impl<M: TraceMode, Entry> Default for TraceJournal<M, Entry> {
    fn default() -> Self {
        Self::new()
    }
}
