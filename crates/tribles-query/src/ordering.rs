//! The 13 canonical index orderings and the pattern classifier.
//!
//! A triple pattern `[e, a, v]` names one variable slot per role. The join
//! engine binds slots in increasing order, so a pattern needs an index
//! whose key lists its roles in that same order. With three distinct slots
//! there are six such permutations; when the pattern repeats a slot the
//! coincident roles collapse into one key segment, giving seven degenerate
//! orderings (`X` marks the collapsed roles):
//!
//! | ordering | pattern shape          | key layout          | infix schedule |
//! |----------|------------------------|---------------------|----------------|
//! | `EAV`    | e < a < v              | E A V               | 0 16 16 32     |
//! | `EVA`    | e < v < a              | E V A               | 0 16 32 16     |
//! | `AEV`    | a < e < v              | A E V               | 0 16 16 32     |
//! | `AVE`    | a < v < e              | A V E               | 0 16 32 16     |
//! | `VEA`    | v < e < a              | V E A               | 0 32 16 16     |
//! | `VAE`    | v < a < e              | V A E               | 0 32 16 16     |
//! | `EXX`    | e < (a = v)            | E A     (v = 0‖a)   | 0 16 16        |
//! | `XXE`    | (a = v) < e            | A E     (v = 0‖a)   | 0 16 16        |
//! | `AXX`    | a < (e = v)            | A E     (v = 0‖e)   | 0 16 16        |
//! | `XXA`    | (e = v) < a            | E A     (v = 0‖e)   | 0 16 16        |
//! | `VXX`    | v < (e = a)            | V E     (a = e)     | 0 32 16        |
//! | `XXV`    | (e = a) < v            | E V     (a = e)     | 0 16 32        |
//! | `XXX`    | e = a = v              | E       (a = e, v = 0‖e) | 0 16      |
//!
//! Depth 0 of every schedule is the root scope and consumes nothing.
//!
//! Degenerate orderings only index the tribles that actually satisfy their
//! coincidence; [`IndexOrdering::reconstruct`] returns `None` for the rest.
//! That is a filter, not an error: a pattern `(x, x, v)` simply cannot match
//! a trible whose entity and attribute differ.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::trible::{equal_id, Trible, ID_SIZE, VALUE_SIZE};

pub const INDEX_COUNT: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexOrdering {
    Eav = 0,
    Eva = 1,
    Aev = 2,
    Ave = 3,
    Vea = 4,
    Vae = 5,
    Exx = 6,
    Xxe = 7,
    Axx = 8,
    Xxa = 9,
    Vxx = 10,
    Xxv = 11,
    Xxx = 12,
}

use IndexOrdering::*;

const INFIX_SCHEDULES: [&[usize]; INDEX_COUNT] = [
    &[0, ID_SIZE, ID_SIZE, VALUE_SIZE],  // EAV
    &[0, ID_SIZE, VALUE_SIZE, ID_SIZE],  // EVA
    &[0, ID_SIZE, ID_SIZE, VALUE_SIZE],  // AEV
    &[0, ID_SIZE, VALUE_SIZE, ID_SIZE],  // AVE
    &[0, VALUE_SIZE, ID_SIZE, ID_SIZE],  // VEA
    &[0, VALUE_SIZE, ID_SIZE, ID_SIZE],  // VAE
    &[0, ID_SIZE, ID_SIZE],              // EXX
    &[0, ID_SIZE, ID_SIZE],              // XXE
    &[0, ID_SIZE, ID_SIZE],              // AXX
    &[0, ID_SIZE, ID_SIZE],              // XXA
    &[0, VALUE_SIZE, ID_SIZE],           // VXX
    &[0, ID_SIZE, VALUE_SIZE],           // XXV
    &[0, ID_SIZE],                       // XXX
];

const NAMES: [&str; INDEX_COUNT] = [
    "EAV", "EVA", "AEV", "AVE", "VEA", "VAE", "EXX", "XXE", "AXX", "XXA", "VXX", "XXV", "XXX",
];

impl IndexOrdering {
    pub const ALL: [IndexOrdering; INDEX_COUNT] =
        [Eav, Eva, Aev, Ave, Vea, Vae, Exx, Xxe, Axx, Xxa, Vxx, Xxv, Xxx];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        NAMES[self as usize]
    }

    /// Bytes consumed at each search depth, starting with the root.
    pub const fn infix_schedule(self) -> &'static [usize] {
        INFIX_SCHEDULES[self as usize]
    }

    /// Number of distinct slots a pattern of this shape binds.
    pub const fn depth_count(self) -> usize {
        self.infix_schedule().len() - 1
    }

    /// Total width of the reconstructed key.
    pub fn key_width(self) -> usize {
        self.infix_schedule().iter().sum()
    }

    /// The key this ordering stores for `trible`, or `None` when the trible
    /// lies outside the ordering's domain.
    pub fn reconstruct(self, trible: &Trible) -> Option<Vec<u8>> {
        let (e, a, v) = (trible.e(), trible.a(), trible.v());
        let key = match self {
            Eav => trible.raw().to_vec(),
            Eva => [e, v, a].concat(),
            Aev => [a, e, v].concat(),
            Ave => [a, v, e].concat(),
            Vea => [v, e, a].concat(),
            Vae => [v, a, e].concat(),
            Exx | Xxe => {
                if !(trible.v1_zero() && equal_id(a, trible.v2())) {
                    return None;
                }
                if self == Exx {
                    [e, a].concat()
                } else {
                    [a, e].concat()
                }
            }
            Axx | Xxa => {
                if !(trible.v1_zero() && equal_id(e, trible.v2())) {
                    return None;
                }
                if self == Axx {
                    [a, e].concat()
                } else {
                    [e, a].concat()
                }
            }
            Vxx => {
                if !equal_id(e, a) {
                    return None;
                }
                [v, e].concat()
            }
            Xxv => {
                if !equal_id(e, a) {
                    return None;
                }
                [e, v].concat()
            }
            Xxx => {
                if !(trible.v1_zero() && equal_id(e, a) && equal_id(e, trible.v2())) {
                    return None;
                }
                e.to_vec()
            }
        };
        debug_assert_eq!(key.len(), self.key_width());
        Some(key)
    }
}

impl fmt::Display for IndexOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Six-bit relative-order signature of a pattern's role slots:
/// `e<a`, `e<v`, `a<v`, `e==a`, `a==v`, `e==v` (lowest bit first).
pub const fn signature(e: usize, a: usize, v: usize) -> usize {
    ((e < a) as usize)
        | ((e < v) as usize) << 1
        | ((a < v) as usize) << 2
        | ((e == a) as usize) << 3
        | ((a == v) as usize) << 4
        | ((e == v) as usize) << 5
}

const fn ordering_table() -> [Option<IndexOrdering>; 64] {
    let mut table = [None; 64];
    table[signature(0, 1, 2)] = Some(Eav);
    table[signature(0, 2, 1)] = Some(Eva);
    table[signature(1, 0, 2)] = Some(Aev);
    table[signature(2, 0, 1)] = Some(Ave);
    table[signature(1, 2, 0)] = Some(Vea);
    table[signature(2, 1, 0)] = Some(Vae);
    table[signature(0, 1, 1)] = Some(Exx);
    table[signature(1, 0, 0)] = Some(Xxe);
    table[signature(1, 0, 1)] = Some(Axx);
    table[signature(0, 1, 0)] = Some(Xxa);
    table[signature(1, 1, 0)] = Some(Vxx);
    table[signature(0, 0, 1)] = Some(Xxv);
    table[signature(0, 0, 0)] = Some(Xxx);
    table
}

static ORDERING_BY_SIGNATURE: [Option<IndexOrdering>; 64] = ordering_table();

/// The ordering that answers pattern `[e, a, v]` in slot order.
pub fn classify(pattern: [usize; 3]) -> IndexOrdering {
    let [e, a, v] = pattern;
    // Three slots admit exactly 13 weak orders, one table entry each.
    ORDERING_BY_SIGNATURE[signature(e, a, v)].expect("every weak order of 3 slots has an ordering")
}

/// The distinct slots of a pattern, in increasing order; the order in which
/// the classified ordering visits them.
pub fn distinct_slots(pattern: [usize; 3]) -> Vec<usize> {
    let mut slots = pattern.to_vec();
    slots.sort_unstable();
    slots.dedup();
    slots
}
