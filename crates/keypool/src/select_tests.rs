// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use proptest::prelude::*;

use super::*;

fn cand(
    id: i64,
    active: i64,
    limit: i64,
    units: i64,
    rpm: Option<i64>,
    priority: i64,
) -> Candidate {
    Candidate {
        credential_id: id,
        key_name: format!("k{id}"),
        concurrency_limit: limit,
        rpm_limit: rpm,
        priority,
        active,
        bucket_units: units,
    }
}

#[yare::parameterized(
    least_loaded_wins     = { vec![cand(1, 1, 2, 0, None, 0), cand(2, 0, 2, 0, None, 0)], Some(2) },
    ratio_not_count       = { vec![cand(1, 2, 10, 0, None, 0), cand(2, 1, 2, 0, None, 0)], Some(1) },
    rate_headroom_next    = { vec![cand(1, 0, 1, 4, Some(5), 0), cand(2, 0, 1, 1, Some(5), 0)], Some(2) },
    unlimited_beats_used  = { vec![cand(1, 0, 1, 1, Some(100), 0), cand(2, 0, 1, 0, None, 0)], Some(2) },
    priority_breaks_tie   = { vec![cand(1, 0, 1, 0, None, 1), cand(2, 0, 1, 0, None, 9)], Some(2) },
    lowest_id_last_resort = { vec![cand(5, 0, 1, 0, None, 0), cand(3, 0, 1, 0, None, 0)], Some(3) },
    full_keys_skipped     = { vec![cand(1, 1, 1, 0, None, 9), cand(2, 0, 3, 0, None, 0)], Some(2) },
    rate_exhausted        = { vec![cand(1, 0, 1, 5, Some(5), 0)], None },
    none_configured       = { vec![], None },
)]
fn picks(cands: Vec<Candidate>, expected: Option<i64>) {
    assert_eq!(pick(&cands, 1).map(|c| c.credential_id), expected);
}

#[test]
fn request_units_count_against_rate() {
    let c = cand(1, 0, 1, 3, Some(5), 0);
    assert!(c.rpm_ok(2));
    assert!(!c.rpm_ok(3));
}

#[yare::parameterized(
    none            = { vec![], (0, 0, 0, 0) },
    slot_bound      = { vec![cand(1, 1, 1, 0, None, 0)], (1, 0, 1, 0) },
    rate_bound      = { vec![cand(1, 0, 1, 5, Some(5), 0)], (1, 1, 0, 0) },
    both_on_one     = { vec![cand(1, 1, 1, 5, Some(5), 0)], (1, 0, 0, 0) },
    split           = { vec![cand(1, 1, 1, 0, None, 0), cand(2, 0, 1, 5, Some(5), 0)], (2, 1, 1, 0) },
    admissible      = { vec![cand(1, 0, 1, 0, Some(5), 0)], (1, 1, 1, 1) },
)]
fn diagnoses(cands: Vec<Candidate>, expected: (u32, u32, u32, u32)) {
    let d = diagnose(&cands, 1);
    assert_eq!((d.total_keys, d.concurrency_ok, d.rpm_ok, d.both_ok), expected);
}

fn arb_candidate() -> impl Strategy<Value = Candidate> {
    (1i64..50, 0i64..6, 1i64..6, 0i64..12, prop::option::of(1i64..10), -3i64..3).prop_map(
        |(id, active, limit, units, rpm, priority)| {
            cand(id, active.min(limit), limit, units, rpm, priority)
        },
    )
}

proptest! {
    #[test]
    fn picked_candidate_is_admissible_and_best(
        cands in prop::collection::vec(arb_candidate(), 0..8),
        units in 0u32..4,
    ) {
        let admissible: Vec<&Candidate> =
            cands.iter().filter(|c| c.concurrency_ok() && c.rpm_ok(units)).collect();
        match pick(&cands, units) {
            None => prop_assert!(admissible.is_empty()),
            Some(best) => {
                prop_assert!(best.concurrency_ok() && best.rpm_ok(units));
                for other in admissible {
                    prop_assert_ne!(best.rank(other), Ordering::Greater);
                }
            }
        }
        prop_assert_eq!(diagnose(&cands, units).both_ok as usize,
            cands.iter().filter(|c| c.concurrency_ok() && c.rpm_ok(units)).count());
    }

    #[test]
    fn rank_is_antisymmetric(a in arb_candidate(), b in arb_candidate()) {
        prop_assert_eq!(a.rank(&b), b.rank(&a).reverse());
    }
}
