use proptest::prelude::*;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tribles_query::{
    classify, distinct_slots, query, Constraint, Id, IndexOrdering, QueryOptions, Trible, TribleSet,
    TripleConstraint, Value,
};

fn id(n: u8) -> Id {
    Id::from_u128(n as u128)
}

/// Values below 4 are ids; the rest have a nonzero high half.
fn value(n: u8) -> Value {
    if n < 4 {
        Value::from_id(id(n))
    } else {
        let mut raw = [0u8; 32];
        raw[0] = 1;
        raw[31] = n;
        Value::new(raw)
    }
}

fn role_values(t: &Trible) -> [Value; 3] {
    [Value::from_id(t.entity()), Value::from_id(t.attribute()), t.value()]
}

/// Renumber the slots used by `patterns` to 0..n, keeping their order.
fn compact(patterns: &[[usize; 3]]) -> (Vec<[usize; 3]>, usize) {
    let used: BTreeSet<usize> = patterns.iter().flatten().copied().collect();
    let rank: BTreeMap<usize, usize> = used.iter().enumerate().map(|(i, &s)| (s, i)).collect();
    let out = patterns.iter().map(|p| p.map(|s| rank[&s])).collect();
    (out, used.len())
}

/// Every full assignment satisfying both patterns, by nested loops.
fn naive_join(facts: &[Trible], patterns: &[[usize; 3]], variable_count: usize) -> BTreeSet<Vec<Value>> {
    let mut out = BTreeSet::new();
    for t1 in facts {
        for t2 in facts {
            let mut row: Vec<Option<Value>> = vec![None; variable_count];
            let mut consistent = true;
            for (pattern, t) in patterns.iter().zip([t1, t2]) {
                for (&slot, v) in pattern.iter().zip(role_values(t)) {
                    match row[slot] {
                        Some(bound) if bound != v => consistent = false,
                        _ => row[slot] = Some(v),
                    }
                }
            }
            if consistent {
                out.insert(row.into_iter().flatten().collect());
            }
        }
    }
    out
}

fn directed_cmp(a: &[Value], b: &[Value], ascending: &[bool]) -> Ordering {
    for ((x, y), &asc) in a.iter().zip(b).zip(ascending) {
        let ord = if asc { x.cmp(y) } else { y.cmp(x) };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn facts_strategy() -> impl Strategy<Value = Vec<Trible>> {
    prop::collection::vec((0u8..4, 0u8..3, 0u8..6), 0..=12).prop_map(|raw| {
        raw.into_iter()
            .map(|(e, a, v)| Trible::new(id(e), id(a), value(v)))
            .collect()
    })
}

fn pattern_strategy() -> impl Strategy<Value = [usize; 3]> {
    (0usize..3, 0usize..3, 0usize..3).prop_map(|(e, a, v)| [e, a, v])
}

fn run(set: &TribleSet, patterns: &[[usize; 3]], options: &QueryOptions) -> Vec<Vec<Value>> {
    let constraints: Vec<Box<dyn Constraint>> = patterns
        .iter()
        .map(|&p| Box::new(TripleConstraint::new(set, p)) as Box<dyn Constraint>)
        .collect();
    query(&constraints, options)
        .expect("valid query")
        .map(|b| b.into_values())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn join_matches_naive_nested_loops(
        facts in facts_strategy(),
        p1 in pattern_strategy(),
        p2 in pattern_strategy(),
        directions in prop::collection::vec(any::<bool>(), 3),
    ) {
        let (patterns, n) = compact(&[p1, p2]);
        let ascending = directions[..n].to_vec();
        let set = TribleSet::from_tribles(facts.iter().copied());

        let mut expected: Vec<Vec<Value>> = naive_join(&facts, &patterns, n).into_iter().collect();
        expected.sort_by(|a, b| directed_cmp(a, b, &ascending));

        let actual = run(&set, &patterns, &QueryOptions::new(n).directions(ascending));
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn projection_yields_each_prefix_once(
        facts in facts_strategy(),
        p1 in pattern_strategy(),
        p2 in pattern_strategy(),
        k in 0usize..=3,
    ) {
        let (patterns, n) = compact(&[p1, p2]);
        let k = k.min(n);
        let set = TribleSet::from_tribles(facts.iter().copied());
        let solutions = naive_join(&facts, &patterns, n);

        let actual = run(&set, &patterns, &QueryOptions::new(n).project(k));
        if k == 0 {
            prop_assert_eq!(actual.len(), usize::from(!solutions.is_empty()));
        } else {
            let expected_prefixes: Vec<Vec<Value>> = solutions
                .iter()
                .map(|row| row[..k].to_vec())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let actual_prefixes: Vec<Vec<Value>> = actual.iter().map(|row| row[..k].to_vec()).collect();
            prop_assert_eq!(actual_prefixes, expected_prefixes);
        }
        for row in &actual {
            prop_assert!(solutions.contains(row));
        }
    }

    #[test]
    fn reruns_are_identical(facts in facts_strategy(), p1 in pattern_strategy(), p2 in pattern_strategy()) {
        let (patterns, n) = compact(&[p1, p2]);
        let set = TribleSet::from_tribles(facts);
        let options = QueryOptions::new(n);
        prop_assert_eq!(run(&set, &patterns, &options), run(&set, &patterns, &options));
    }

    #[test]
    fn reversing_a_slot_keeps_the_solution_set(
        facts in facts_strategy(),
        p1 in pattern_strategy(),
        p2 in pattern_strategy(),
        flipped in 0usize..3,
    ) {
        let (patterns, n) = compact(&[p1, p2]);
        let set = TribleSet::from_tribles(facts);
        let forward = run(&set, &patterns, &QueryOptions::new(n));
        let reversed = run(&set, &patterns, &QueryOptions::new(n).descend(flipped % n));

        let forward_set: BTreeSet<_> = forward.iter().cloned().collect();
        let reversed_set: BTreeSet<_> = reversed.iter().cloned().collect();
        prop_assert_eq!(forward.len(), reversed.len());
        prop_assert_eq!(forward_set, reversed_set);
    }
}

#[test]
fn classify_is_total_and_reconstruction_covers_the_fields() {
    let fact = Trible::new(id(1), id(1), Value::from_id(id(1)));
    let mut seen = BTreeSet::new();
    for e in 0..3 {
        for a in 0..3 {
            for v in 0..3 {
                let ordering = classify([e, a, v]);
                seen.insert(ordering);
                assert_eq!(ordering.depth_count(), distinct_slots([e, a, v]).len());
                let key = ordering
                    .reconstruct(&fact)
                    .expect("a fully coincident fact lies in every domain");
                assert_eq!(key.len(), ordering.key_width());
            }
        }
    }
    assert_eq!(seen.len(), IndexOrdering::ALL.len());
}
