//! Property tests for the surplus engine over C1/C2-style weight vectors.

use proptest::prelude::*;

use ps_algo::{
    percent_shares, redistribute, redistribute_linked, BucketArena, LinkedTarget, Resolution,
    MAX_PASSES_LINKED, MAX_PASSES_PERCENT,
};

fn weights() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(1u32..500, 1..12)
}

fn arena_for(w: &[u32]) -> BucketArena {
    let order: Vec<usize> = (0..w.len()).collect();
    BucketArena::group_by(&order, |i| w[i])
}

fn as_f64(w: &[u32]) -> Vec<f64> {
    w.iter().map(|&x| f64::from(x)).collect()
}

proptest! {
    /// Property: either the sum lands within half a step of the target, or the
    /// engine gave up after exactly the bounded number of passes.
    #[test]
    fn prop_converges_or_reports(w in weights()) {
        let mut v = percent_shares(&as_f64(&w)).unwrap();
        let arena = arena_for(&w);
        let out = redistribute(&mut v, &arena, 100.0, Resolution::Percent, MAX_PASSES_PERCENT);
        let sum: f64 = v.iter().sum();
        if out.converged {
            prop_assert!((sum - 100.0).abs() < 0.0005 + 1e-9, "sum {}", sum);
            prop_assert_eq!(out.residual, 0.0);
        } else {
            prop_assert_eq!(out.passes, MAX_PASSES_PERCENT);
            prop_assert!(out.residual.abs() >= 0.0005);
        }
    }

    /// Property: members of one bucket always end with identical values.
    #[test]
    fn prop_ties_move_together(w in weights()) {
        let mut v = percent_shares(&as_f64(&w)).unwrap();
        let arena = arena_for(&w);
        redistribute(&mut v, &arena, 100.0, Resolution::Percent, MAX_PASSES_PERCENT);
        for bucket in arena.buckets() {
            let first = v[bucket.members[0]];
            for &m in &bucket.members {
                prop_assert_eq!(v[m], first);
            }
        }
    }

    /// Property: a converged vector is a fixed point.
    #[test]
    fn prop_second_run_is_a_no_op(w in weights()) {
        let mut v = percent_shares(&as_f64(&w)).unwrap();
        let arena = arena_for(&w);
        let first = redistribute(&mut v, &arena, 100.0, Resolution::Percent, MAX_PASSES_PERCENT);
        prop_assume!(first.converged);
        let snapshot = v.clone();
        let second = redistribute(&mut v, &arena, 100.0, Resolution::Percent, MAX_PASSES_PERCENT);
        prop_assert!(second.converged);
        prop_assert_eq!(second.passes, 0);
        prop_assert_eq!(second.adjusted_steps, 0);
        prop_assert_eq!(v, snapshot);
    }

    /// Property: the linked variant's area pass never leaves more than half a
    /// step on the area sum when it reports convergence.
    #[test]
    fn prop_linked_area_sum(w in weights(), basis_cents in 100u32..500_000) {
        let basis = f64::from(basis_cents) / 100.0;
        let mut pct = percent_shares(&as_f64(&w)).unwrap();
        let mut area: Vec<f64> = pct.iter().map(|p| Resolution::Area.round(p * basis / 100.0)).collect();
        let arena = arena_for(&w);
        let out = redistribute_linked(
            &mut pct,
            &mut area,
            &arena,
            LinkedTarget { percent: 100.0, basis },
            MAX_PASSES_LINKED,
        );
        if out.area.converged {
            let sum: f64 = area.iter().sum();
            prop_assert!((sum - basis).abs() < 0.005 + 1e-9, "area sum {} vs {}", sum, basis);
        }
    }
}
