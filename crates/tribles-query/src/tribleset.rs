//! TribleSet: an immutable fact snapshot indexed under every ordering.
//!
//! Each of the 13 orderings keeps its own [`SortedIndex`] of reconstructed
//! keys, so any triple pattern can be answered by a single forward scan.
//! Adding facts or combining sets always yields a new snapshot; existing
//! snapshots (and the cursors reading them) are unaffected.

use rayon::prelude::*;

use crate::index::{IndexCursor, SortedIndex};
use crate::ordering::{IndexOrdering, INDEX_COUNT};
use crate::trible::{Trible, TRIBLE_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TribleSet {
    indexes: [SortedIndex; INDEX_COUNT],
}

impl TribleSet {
    pub fn new() -> Self {
        Self {
            indexes: std::array::from_fn(|i| SortedIndex::new(IndexOrdering::ALL[i].key_width())),
        }
    }

    /// Build every ordering's index from a batch of tribles.
    pub fn from_tribles(tribles: impl IntoIterator<Item = Trible>) -> Self {
        let tribles: Vec<Trible> = tribles.into_iter().collect();
        let mut built: Vec<SortedIndex> = IndexOrdering::ALL
            .par_iter()
            .map(|&ordering| {
                let keys: Vec<Box<[u8]>> = tribles
                    .iter()
                    .filter_map(|t| ordering.reconstruct(t))
                    .map(Vec::into_boxed_slice)
                    .collect();
                SortedIndex::from_unsorted_keys(ordering.key_width(), keys)
            })
            .collect();
        tracing::debug!(
            tribles = tribles.len(),
            distinct = built[IndexOrdering::Eav.index()].len(),
            "built trible set"
        );
        Self {
            indexes: std::array::from_fn(|i| std::mem::take(&mut built[i])),
        }
    }

    /// A new snapshot that additionally holds `tribles`.
    pub fn with(&self, tribles: impl IntoIterator<Item = Trible>) -> Self {
        let novel: Vec<Trible> = tribles
            .into_iter()
            .filter(|t| !self.contains(t))
            .collect();
        if novel.is_empty() {
            return self.clone();
        }
        self.union(&TribleSet::from_tribles(novel))
    }

    pub fn index(&self, ordering: IndexOrdering) -> &SortedIndex {
        &self.indexes[ordering.index()]
    }

    pub fn cursor(&self, ordering: IndexOrdering) -> IndexCursor {
        self.index(ordering).cursor()
    }

    pub fn len(&self) -> usize {
        self.index(IndexOrdering::Eav).len()
    }

    pub fn is_empty(&self) -> bool {
        self.index(IndexOrdering::Eav).is_empty()
    }

    pub fn contains(&self, trible: &Trible) -> bool {
        self.index(IndexOrdering::Eav).contains(trible.raw())
    }

    /// Facts in entity/attribute/value order.
    pub fn iter(&self) -> impl Iterator<Item = Trible> + '_ {
        self.index(IndexOrdering::Eav).keys().filter_map(|k| {
            let raw: [u8; TRIBLE_SIZE] = k.try_into().ok()?;
            Some(Trible::from_raw(raw))
        })
    }

    fn zip_with(&self, other: &Self, op: impl Fn(&SortedIndex, &SortedIndex) -> SortedIndex) -> Self {
        Self {
            indexes: std::array::from_fn(|i| op(&self.indexes[i], &other.indexes[i])),
        }
    }

    pub fn union(&self, other: &Self) -> Self {
        self.zip_with(other, SortedIndex::union_same_width)
    }

    pub fn intersect(&self, other: &Self) -> Self {
        self.zip_with(other, SortedIndex::intersect_same_width)
    }

    pub fn subtract(&self, other: &Self) -> Self {
        self.zip_with(other, SortedIndex::subtract_same_width)
    }

    /// Symmetric difference.
    pub fn difference(&self, other: &Self) -> Self {
        self.zip_with(other, SortedIndex::difference_same_width)
    }

    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.index(IndexOrdering::Eav)
            .is_subset_of(other.index(IndexOrdering::Eav))
    }

    pub fn is_intersecting(&self, other: &Self) -> bool {
        self.index(IndexOrdering::Eav)
            .is_intersecting(other.index(IndexOrdering::Eav))
    }
}

impl Default for TribleSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Trible> for TribleSet {
    fn from_iter<I: IntoIterator<Item = Trible>>(iter: I) -> Self {
        Self::from_tribles(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trible::{Id, Value};

    fn t(e: u128, a: u128, v: u128) -> Trible {
        Trible::new(Id::from_u128(e), Id::from_u128(a), Value::from_u128(v))
    }

    #[test]
    fn degenerate_indexes_only_hold_matching_tribles() {
        let set = TribleSet::from_tribles([t(1, 2, 3), t(4, 4, 9), t(5, 6, 6), t(7, 7, 7)]);
        assert_eq!(set.len(), 4);
        assert_eq!(set.index(IndexOrdering::Eva).len(), 4);
        assert_eq!(set.index(IndexOrdering::Xxv).len(), 2);
        assert_eq!(set.index(IndexOrdering::Exx).len(), 2);
        assert_eq!(set.index(IndexOrdering::Axx).len(), 1);
        assert_eq!(set.index(IndexOrdering::Xxx).len(), 1);
    }

    #[test]
    fn with_and_set_algebra() {
        let a = TribleSet::from_tribles([t(1, 2, 3), t(2, 2, 3)]);
        let b = a.with([t(3, 2, 1)]);
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 3);
        assert!(a.is_subset_of(&b));
        assert!(!b.is_subset_of(&a));

        let only_new = b.subtract(&a);
        assert_eq!(only_new.iter().collect::<Vec<_>>(), vec![t(3, 2, 1)]);
        assert_eq!(b.intersect(&a), a);
        assert_eq!(a.union(&only_new), b);
        assert_eq!(a.difference(&b), only_new);
        assert!(!a.is_intersecting(&only_new));
    }

    #[test]
    fn with_known_tribles_is_unchanged() {
        let a = TribleSet::from_tribles([t(1, 2, 3)]);
        assert_eq!(a.with([t(1, 2, 3)]), a);
    }

    #[test]
    fn empty_set() {
        let set = TribleSet::new();
        assert!(set.is_empty());
        assert!(!set.cursor(IndexOrdering::Eav).is_valid());
    }
}
