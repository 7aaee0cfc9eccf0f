//! SortedIndex: immutable, shared, fixed-width sorted key sets.
//!
//! This is the persistent index the join engine reads through cursors.
//! A snapshot never changes after `finish()`; every "mutation" (`with`,
//! `union`, `subtract`, ...) produces a new snapshot, so readers on other
//! threads are never disturbed. Clones share storage through an `Arc`.
//!
//! Keys compare as unsigned byte strings. Each key carries a payload `V`
//! (unit for plain key sets), which lets callers build lookup tables such
//! as "attribute id -> attribute names" and still join over their keys.
//!
//! ## Cursors
//!
//! [`IndexCursor`] iterates the key space one *infix* at a time. `push(len,
//! ascending)` descends into the keys sharing the currently peeked prefix
//! and enumerates the distinct next `len` bytes; `pop` returns to the
//! enclosing scope at the position it was pushed from.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::IndexError;

type Entry<V> = (Box<[u8]>, V);

#[derive(Debug)]
pub struct SortedIndex<V = ()> {
    width: usize,
    entries: Arc<[Entry<V>]>,
}

impl<V> Clone for SortedIndex<V> {
    fn clone(&self) -> Self {
        Self {
            width: self.width,
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<V> SortedIndex<V> {
    /// An empty index over keys of `width` bytes.
    pub fn new(width: usize) -> Self {
        Self {
            width,
            entries: Arc::from(Vec::new()),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether two handles point at the same snapshot storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }

    fn position(&self, key: &[u8]) -> Result<usize, usize> {
        self.entries.binary_search_by(|(k, _)| (**k).cmp(key))
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let idx = self.position(key).ok()?;
        Some(&self.entries[idx].1)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.position(key).is_ok()
    }

    pub fn keys(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.entries.iter().map(|(k, _)| &**k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &V)> + '_ {
        self.entries.iter().map(|(k, v)| (&**k, v))
    }

    pub fn cursor(&self) -> IndexCursor<V> {
        IndexCursor::new(self.clone())
    }

    /// Every key of `self` is also a key of `other`.
    pub fn is_subset_of<W>(&self, other: &SortedIndex<W>) -> bool {
        if self.width != other.width {
            return self.is_empty();
        }
        let mut j = 0;
        for (k, _) in self.entries.iter() {
            while j < other.entries.len() && *other.entries[j].0 < **k {
                j += 1;
            }
            if j == other.entries.len() || other.entries[j].0 != *k {
                return false;
            }
            j += 1;
        }
        true
    }

    /// `self` and `other` share at least one key.
    pub fn is_intersecting<W>(&self, other: &SortedIndex<W>) -> bool {
        if self.width != other.width {
            return false;
        }
        let (mut i, mut j) = (0, 0);
        while i < self.entries.len() && j < other.entries.len() {
            match self.entries[i].0.cmp(&other.entries[j].0) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => return true,
            }
        }
        false
    }
}

impl SortedIndex<()> {
    /// Build a key set from keys in any order, dropping duplicates.
    pub(crate) fn from_unsorted_keys(width: usize, mut keys: Vec<Box<[u8]>>) -> Self {
        keys.sort_unstable();
        keys.dedup();
        Self {
            width,
            entries: keys.into_iter().map(|k| (k, ())).collect(),
        }
    }
}

impl<V> Default for SortedIndex<V> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<V: PartialEq> PartialEq for SortedIndex<V> {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && (self.ptr_eq(other) || self.entries == other.entries)
    }
}

impl<V: Eq> Eq for SortedIndex<V> {}

// ============================================================================
// Set algebra
// ============================================================================

/// Which side(s) of a sorted merge survive.
#[derive(Debug, Clone, Copy)]
struct Keep {
    left_only: bool,
    right_only: bool,
    both: bool,
}

const UNION: Keep = Keep {
    left_only: true,
    right_only: true,
    both: true,
};
const INTERSECT: Keep = Keep {
    left_only: false,
    right_only: false,
    both: true,
};
const SUBTRACT: Keep = Keep {
    left_only: true,
    right_only: false,
    both: false,
};
const DIFFERENCE: Keep = Keep {
    left_only: true,
    right_only: true,
    both: false,
};

impl<V: Clone> SortedIndex<V> {
    fn check_width(&self, other: &Self) -> Result<(), IndexError> {
        // An empty index combines with anything; it contributes no keys.
        if self.width != other.width && !self.is_empty() && !other.is_empty() {
            return Err(IndexError::WidthMismatch {
                left: self.width,
                right: other.width,
            });
        }
        Ok(())
    }

    /// Sorted merge; on colliding keys the left payload wins.
    fn merge(&self, other: &Self, keep: Keep) -> Self {
        let (left, right) = (&self.entries, &other.entries);
        let mut out: Vec<Entry<V>> = Vec::with_capacity(left.len().max(right.len()));
        let (mut i, mut j) = (0, 0);
        while i < left.len() && j < right.len() {
            match left[i].0.cmp(&right[j].0) {
                Ordering::Less => {
                    if keep.left_only {
                        out.push(left[i].clone());
                    }
                    i += 1;
                }
                Ordering::Greater => {
                    if keep.right_only {
                        out.push(right[j].clone());
                    }
                    j += 1;
                }
                Ordering::Equal => {
                    if keep.both {
                        out.push(left[i].clone());
                    }
                    i += 1;
                    j += 1;
                }
            }
        }
        if keep.left_only {
            out.extend(left[i..].iter().cloned());
        }
        if keep.right_only {
            out.extend(right[j..].iter().cloned());
        }

        let width = if self.is_empty() { other.width } else { self.width };
        Self {
            width,
            entries: Arc::from(out),
        }
    }

    pub(crate) fn union_same_width(&self, other: &Self) -> Self {
        if other.is_empty() || self.ptr_eq(other) {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        self.merge(other, UNION)
    }

    pub(crate) fn intersect_same_width(&self, other: &Self) -> Self {
        if self.ptr_eq(other) {
            return self.clone();
        }
        self.merge(other, INTERSECT)
    }

    pub(crate) fn subtract_same_width(&self, other: &Self) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        self.merge(other, SUBTRACT)
    }

    pub(crate) fn difference_same_width(&self, other: &Self) -> Self {
        self.merge(other, DIFFERENCE)
    }

    pub fn union(&self, other: &Self) -> Result<Self, IndexError> {
        self.check_width(other)?;
        Ok(self.union_same_width(other))
    }

    pub fn intersect(&self, other: &Self) -> Result<Self, IndexError> {
        self.check_width(other)?;
        Ok(self.intersect_same_width(other))
    }

    pub fn subtract(&self, other: &Self) -> Result<Self, IndexError> {
        self.check_width(other)?;
        Ok(self.subtract_same_width(other))
    }

    /// Symmetric difference.
    pub fn difference(&self, other: &Self) -> Result<Self, IndexError> {
        self.check_width(other)?;
        Ok(self.difference_same_width(other))
    }
}

impl<V: Clone + Default> SortedIndex<V> {
    /// A new snapshot with `keys` added. Returns a handle to the same
    /// storage when every key is already present.
    pub fn with<'k>(&self, keys: impl IntoIterator<Item = &'k [u8]>) -> Result<Self, IndexError> {
        let mut batch = IndexBuilder::new(self.width);
        for key in keys {
            if !self.contains(key) {
                batch.put(key)?;
            }
        }
        if batch.is_empty() {
            return Ok(self.clone());
        }
        Ok(self.union_same_width(&batch.finish()))
    }
}

// ============================================================================
// Batch construction
// ============================================================================

/// Mutable batch that finalizes into an immutable [`SortedIndex`].
#[derive(Debug, Clone)]
pub struct IndexBuilder<V = ()> {
    width: usize,
    entries: BTreeMap<Box<[u8]>, V>,
}

impl<V> IndexBuilder<V> {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            entries: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert `key`, computing its payload from the previous one (if any).
    pub fn put_with(
        &mut self,
        key: &[u8],
        update: impl FnOnce(Option<V>) -> V,
    ) -> Result<(), IndexError> {
        if key.len() != self.width {
            return Err(IndexError::KeyWidth {
                expected: self.width,
                actual: key.len(),
            });
        }
        let previous = self.entries.remove(key);
        self.entries.insert(Box::from(key), update(previous));
        Ok(())
    }

    pub fn finish(self) -> SortedIndex<V> {
        SortedIndex {
            width: self.width,
            entries: self.entries.into_iter().collect(),
        }
    }
}

impl<V: Default> IndexBuilder<V> {
    /// Insert `key`, keeping an existing payload untouched.
    pub fn put(&mut self, key: &[u8]) -> Result<(), IndexError> {
        self.put_with(key, Option::unwrap_or_default)
    }
}

// ============================================================================
// Cursor
// ============================================================================

/// One pushed scope: the entries `[lo, hi)` share a prefix of `offset`
/// bytes; `[start, end)` is the group sharing the current infix.
#[derive(Debug, Clone, Copy)]
struct Frame {
    lo: usize,
    hi: usize,
    offset: usize,
    len: usize,
    ascending: bool,
    start: usize,
    end: usize,
}

impl Frame {
    fn infix<'k>(&self, key: &'k [u8]) -> &'k [u8] {
        &key[self.offset..self.offset + self.len]
    }

    /// End of the group beginning at `start`.
    fn group_end<V>(&self, entries: &[Entry<V>], start: usize) -> usize {
        let group = self.infix(&entries[start].0);
        start + entries[start..self.hi].partition_point(|(k, _)| self.infix(k) <= group)
    }

    /// Start of the group ending at `end` (exclusive).
    fn group_start<V>(&self, entries: &[Entry<V>], end: usize) -> usize {
        let group = self.infix(&entries[end - 1].0);
        self.lo + entries[self.lo..end].partition_point(|(k, _)| self.infix(k) < group)
    }
}

/// Stateful scoped iteration over a [`SortedIndex`] snapshot.
#[derive(Debug, Clone)]
pub struct IndexCursor<V = ()> {
    index: SortedIndex<V>,
    frames: Vec<Frame>,
}

impl<V> IndexCursor<V> {
    pub fn new(index: SortedIndex<V>) -> Self {
        let n = index.len();
        let root = Frame {
            lo: 0,
            hi: n,
            offset: 0,
            len: 0,
            ascending: true,
            start: 0,
            end: n,
        };
        Self {
            index,
            frames: vec![root],
        }
    }

    fn top(&self) -> &Frame {
        // The root frame is never popped.
        &self.frames[self.frames.len() - 1]
    }

    pub fn is_valid(&self) -> bool {
        let f = self.top();
        f.start < f.end
    }

    pub fn is_ascending(&self) -> bool {
        self.top().ascending
    }

    /// Number of scopes pushed below the root.
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    /// The current infix, or `None` once the scope is exhausted.
    pub fn peek(&self) -> Option<&[u8]> {
        let f = self.top();
        if f.start >= f.end {
            return None;
        }
        Some(f.infix(&self.index.entries[f.start].0))
    }

    /// Advance to the next distinct infix in scope order.
    pub fn next(&mut self) {
        let entries = &self.index.entries;
        let last = self.frames.len() - 1;
        let f = &mut self.frames[last];
        if f.start >= f.end {
            return;
        }
        if f.ascending {
            let start = f.end;
            if start >= f.hi {
                f.start = f.hi;
                f.end = f.hi;
                return;
            }
            let end = f.group_end(entries, start);
            f.start = start;
            f.end = end;
        } else {
            let end = f.start;
            if end <= f.lo {
                f.start = f.lo;
                f.end = f.lo;
                return;
            }
            let start = f.group_start(entries, end);
            f.start = start;
            f.end = end;
        }
    }

    /// Move to the first infix at or past `target` in scope order and
    /// report whether it equals `target`. Never moves backwards.
    pub fn seek(&mut self, target: &[u8]) -> bool {
        let entries = &self.index.entries;
        let last = self.frames.len() - 1;
        let f = &mut self.frames[last];
        if f.start >= f.end {
            return false;
        }
        debug_assert_eq!(target.len(), f.len);
        if f.ascending {
            let start =
                f.start + entries[f.start..f.hi].partition_point(|(k, _)| f.infix(k) < target);
            if start >= f.hi {
                f.start = f.hi;
                f.end = f.hi;
                return false;
            }
            let end = f.group_end(entries, start);
            f.start = start;
            f.end = end;
            f.infix(&entries[start].0) == target
        } else {
            let end = f.lo + entries[f.lo..f.end].partition_point(|(k, _)| f.infix(k) <= target);
            if end <= f.lo {
                f.start = f.lo;
                f.end = f.lo;
                return false;
            }
            let start = f.group_start(entries, end);
            f.start = start;
            f.end = end;
            f.infix(&entries[end - 1].0) == target
        }
    }

    /// Run the current scope dry, as a seek past its last infix would.
    pub fn exhaust(&mut self) {
        let last = self.frames.len() - 1;
        let f = &mut self.frames[last];
        let edge = if f.ascending { f.hi } else { f.lo };
        f.start = edge;
        f.end = edge;
    }

    /// Descend below the current infix, enumerating the next `len` bytes.
    pub fn push(&mut self, len: usize, ascending: bool) {
        let parent = *self.top();
        let offset = parent.offset + parent.len;
        debug_assert!(offset + len <= self.index.width);
        let len = len.min(self.index.width.saturating_sub(offset));

        let mut frame = Frame {
            lo: parent.start,
            hi: parent.end,
            offset,
            len,
            ascending,
            start: parent.start,
            end: parent.start,
        };
        if parent.start < parent.end {
            let entries = &self.index.entries;
            if ascending {
                frame.end = frame.group_end(entries, frame.lo);
            } else {
                frame.end = frame.hi;
                frame.start = frame.group_start(entries, frame.hi);
            }
        }
        self.frames.push(frame);
    }

    /// Return to the enclosing scope at the infix it was pushed from.
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(width: usize, keys: &[&[u8]]) -> SortedIndex {
        let mut batch = IndexBuilder::new(width);
        for k in keys {
            batch.put(k).unwrap();
        }
        batch.finish()
    }

    fn collect(cursor: &mut IndexCursor) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(v) = cursor.peek() {
            out.push(v.to_vec());
            cursor.next();
        }
        out
    }

    #[test]
    fn builder_sorts_and_deduplicates() {
        let idx = index(2, &[&[2, 0], &[1, 1], &[2, 0], &[1, 0]]);
        let keys: Vec<&[u8]> = idx.keys().collect();
        assert_eq!(keys, vec![&[1u8, 0][..], &[1, 1], &[2, 0]]);
    }

    #[test]
    fn builder_rejects_wrong_width() {
        let mut batch: IndexBuilder = IndexBuilder::new(4);
        assert_eq!(
            batch.put(&[1, 2]),
            Err(IndexError::KeyWidth {
                expected: 4,
                actual: 2
            })
        );
    }

    #[test]
    fn put_with_sees_previous_payload() {
        let mut batch: IndexBuilder<Vec<&str>> = IndexBuilder::new(1);
        batch
            .put_with(&[7], |old| {
                let mut v = old.unwrap_or_default();
                v.push("a");
                v
            })
            .unwrap();
        batch
            .put_with(&[7], |old| {
                let mut v = old.unwrap_or_default();
                v.push("b");
                v
            })
            .unwrap();
        let idx = batch.finish();
        assert_eq!(idx.get(&[7]), Some(&vec!["a", "b"]));
    }

    #[test]
    fn cursor_enumerates_distinct_infixes_per_scope() {
        let idx = index(2, &[&[1, 5], &[1, 6], &[3, 1], &[3, 9]]);
        let mut c = idx.cursor();
        assert!(c.is_valid());

        c.push(1, true);
        assert_eq!(c.peek(), Some(&[1u8][..]));
        c.push(1, true);
        assert_eq!(collect(&mut c), vec![vec![5], vec![6]]);
        c.pop();
        assert_eq!(c.peek(), Some(&[1u8][..]));
        c.next();
        assert_eq!(c.peek(), Some(&[3u8][..]));
        c.push(1, false);
        assert_eq!(collect(&mut c), vec![vec![9], vec![1]]);
        c.pop();
        c.next();
        assert_eq!(c.peek(), None);
    }

    #[test]
    fn seek_reports_exact_matches_and_exhaustion() {
        let idx = index(1, &[&[2], &[4], &[6]]);
        let mut c = idx.cursor();
        c.push(1, true);
        assert!(c.seek(&[4]));
        assert!(!c.seek(&[5]));
        assert_eq!(c.peek(), Some(&[6u8][..]));
        // Seeking backwards stays put.
        assert!(!c.seek(&[1]));
        assert_eq!(c.peek(), Some(&[6u8][..]));
        assert!(!c.seek(&[7]));
        assert!(!c.is_valid());
        c.pop();
        assert!(c.is_valid());
    }

    #[test]
    fn descending_seek_moves_down() {
        let idx = index(1, &[&[2], &[4], &[6]]);
        let mut c = idx.cursor();
        c.push(1, false);
        assert_eq!(c.peek(), Some(&[6u8][..]));
        assert!(!c.seek(&[5]));
        assert_eq!(c.peek(), Some(&[4u8][..]));
        assert!(c.seek(&[2]));
        assert!(!c.seek(&[1]));
        assert!(!c.is_valid());
    }

    #[test]
    fn empty_index_cursor_is_invalid() {
        let idx = index(4, &[]);
        let mut c = idx.cursor();
        assert!(!c.is_valid());
        c.push(4, true);
        assert_eq!(c.peek(), None);
    }

    #[test]
    fn set_algebra() {
        let a = index(1, &[&[1], &[2], &[3]]);
        let b = index(1, &[&[2], &[3], &[4]]);

        let keys = |i: &SortedIndex| i.keys().map(|k| k[0]).collect::<Vec<_>>();
        assert_eq!(keys(&a.union(&b).unwrap()), vec![1, 2, 3, 4]);
        assert_eq!(keys(&a.intersect(&b).unwrap()), vec![2, 3]);
        assert_eq!(keys(&a.subtract(&b).unwrap()), vec![1]);
        assert_eq!(keys(&a.difference(&b).unwrap()), vec![1, 4]);
        assert!(a.is_intersecting(&b));
        assert!(!a.is_subset_of(&b));
        assert!(a.intersect(&b).unwrap().is_subset_of(&a));
        assert!(a.subtract(&a).unwrap().is_empty());
    }

    #[test]
    fn width_mismatch_is_an_error() {
        let a = index(1, &[&[1]]);
        let b = index(2, &[&[1, 1]]);
        assert_eq!(
            a.union(&b),
            Err(IndexError::WidthMismatch { left: 1, right: 2 })
        );
    }

    #[test]
    fn with_shares_storage_when_nothing_is_new() {
        let a = index(1, &[&[1], &[2]]);
        let same = a.with([&[1u8][..]]).unwrap();
        assert!(same.ptr_eq(&a));
        let grown = a.with([&[9u8][..]]).unwrap();
        assert_eq!(grown.len(), 3);
        assert_eq!(a.len(), 2);
    }
}
