//! Surplus redistribution: force rounded shares to sum to an authoritative
//! target using the smallest representable step.
//!
//! Contract:
//! - Members are partitioned into buckets held in a `BucketArena`; bucket
//!   identity is its creation index, never the value it was grouped by.
//! - `surplus = round(target − Σ values)`. While `|surplus| ≥ step/2`, buckets
//!   are visited in creation order. A bucket whose size does not exceed
//!   `round(|surplus| / step)` moves every member by `±step` together, and
//!   the surplus shrinks by `size × step`. Wrapping back to the first bucket
//!   counts one pass.
//! - After `max_passes` passes the procedure stops and reports the residual.
//! - `redistribute_nonzero` departs from the size rule: it moves only the
//!   nonzero members of a bucket and never waits for the surplus to cover
//!   them. A tied bucket of k nonzero members can therefore overshoot by
//!   `(k − 1) × step` and oscillate until the pass bound, ending with a
//!   residual of the opposite sign that is reported as non-converged.
//!
//! Determinism:
//! - No maps, no sorting inside; order is whatever order the caller built the
//!   arena in. Values are re-rounded after every step so drift cannot build up.

use ps_core::rounding::{round_to, AREA_DECIMALS, AREA_STEP, PERCENT_DECIMALS, PERCENT_STEP};

pub use ps_core::variables::{
    MAX_PASSES_LINKED, MAX_PASSES_PERCENT, MAX_PASSES_ROOMS, MAX_PASSES_SPECIAL,
};

// ----- Buckets -----

/// Stable bucket handle (creation index).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketId(pub usize);

/// Members moved together by the engine (indices into the caller's value slices).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bucket {
    pub id: BucketId,
    pub members: Vec<usize>,
}

impl Bucket {
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BucketArena {
    buckets: Vec<Bucket>,
}

impl BucketArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bucket. Empty buckets are ignored and return `None`.
    pub fn push(&mut self, members: Vec<usize>) -> Option<BucketId> {
        if members.is_empty() {
            return None;
        }
        let id = BucketId(self.buckets.len());
        self.buckets.push(Bucket { id, members });
        Some(id)
    }

    /// Group `members` (in the given order) by `key`. A member joins the first
    /// bucket created with an equal key; buckets keep creation order.
    pub fn group_by<K, F>(members: &[usize], key: F) -> Self
    where
        K: PartialEq,
        F: Fn(usize) -> K,
    {
        let mut keys: Vec<K> = Vec::new();
        let mut arena = BucketArena::new();
        for &m in members {
            let k = key(m);
            match keys.iter().position(|existing| *existing == k) {
                Some(i) => arena.buckets[i].members.push(m),
                None => {
                    keys.push(k);
                    arena.push(vec![m]);
                }
            }
        }
        arena
    }

    /// One bucket per member, in order.
    pub fn singletons(members: &[usize]) -> Self {
        let mut arena = BucketArena::new();
        for &m in members {
            arena.push(vec![m]);
        }
        arena
    }

    pub fn get(&self, id: BucketId) -> Option<&Bucket> {
        self.buckets.get(id.0)
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// All members, bucket by bucket.
    pub fn members(&self) -> impl Iterator<Item = usize> + '_ {
        self.buckets.iter().flat_map(|b| b.members.iter().copied())
    }

    pub fn member_count(&self) -> usize {
        self.buckets.iter().map(Bucket::size).sum()
    }
}

// ----- Resolution -----

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// 3 decimals, step 0.001.
    Percent,
    /// 2 decimals, step 0.01.
    Area,
}

impl Resolution {
    pub fn step(self) -> f64 {
        match self {
            Resolution::Percent => PERCENT_STEP,
            Resolution::Area => AREA_STEP,
        }
    }

    pub fn decimals(self) -> u32 {
        match self {
            Resolution::Percent => PERCENT_DECIMALS,
            Resolution::Area => AREA_DECIMALS,
        }
    }

    /// Surpluses below half a step are not representable.
    pub fn threshold(self) -> f64 {
        self.step() / 2.0
    }

    pub fn round(self, x: f64) -> f64 {
        round_to(x, self.decimals())
    }

    /// Number of whole steps in `|surplus|`.
    fn steps_in(self, surplus: f64) -> usize {
        (surplus.abs() / self.step()).round() as usize
    }
}

// ----- Outcome -----

/// Result of one bounded redistribution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Outcome {
    /// Completed round-robin passes (wraps).
    pub passes: u32,
    /// Bucket adjustments applied.
    pub adjusted_steps: u32,
    /// Surplus left in place (0 when converged).
    pub residual: f64,
    pub converged: bool,
}

impl Outcome {
    fn untouched(residual: f64, converged: bool) -> Self {
        Outcome { passes: 0, adjusted_steps: 0, residual, converged }
    }
}

/// Outcome of the percent pass and the follow-up area pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkedOutcome {
    pub percent: Outcome,
    pub area: Outcome,
}

impl LinkedOutcome {
    pub fn converged(&self) -> bool {
        self.percent.converged && self.area.converged
    }
}

/// Targets of the percent+area variant. `basis` drives the dependent
/// area (`area = round2(pct × basis / 100)`) and is also the area target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkedTarget {
    pub percent: f64,
    pub basis: f64,
}

// ----- Engine -----

fn current_sum(values: &[f64], arena: &BucketArena, res: Resolution) -> f64 {
    arena.members().map(|m| res.round(values[m])).sum()
}

/// Shared round-robin. `apply` moves a bucket by the signed step and returns
/// how many members moved, or `None` when the bucket is skipped.
fn round_robin<F>(arena: &BucketArena, surplus: f64, res: Resolution, max_passes: u32, mut apply: F) -> Outcome
where
    F: FnMut(&Bucket, f64, f64) -> Option<usize>,
{
    let mut surplus = res.round(surplus);
    let threshold = res.threshold();
    if surplus.abs() < threshold {
        return Outcome::untouched(0.0, true);
    }
    if arena.is_empty() {
        return Outcome::untouched(surplus, false);
    }

    let mut cursor = 0usize;
    let mut passes = 0u32;
    let mut steps = 0u32;

    while surplus.abs() >= threshold {
        if passes >= max_passes {
            return Outcome { passes, adjusted_steps: steps, residual: surplus, converged: false };
        }
        let bucket = &arena.buckets[cursor];
        let signed = surplus.signum() * res.step();
        if let Some(moved) = apply(bucket, signed, surplus) {
            surplus = res.round(surplus - moved as f64 * signed);
            steps += 1;
        }
        cursor += 1;
        if cursor == arena.len() {
            cursor = 0;
            passes += 1;
        }
    }

    Outcome { passes, adjusted_steps: steps, residual: 0.0, converged: true }
}

/// Percentage-only (or area-only) variant.
pub fn redistribute(
    values: &mut [f64],
    arena: &BucketArena,
    target: f64,
    res: Resolution,
    max_passes: u32,
) -> Outcome {
    let surplus = target - current_sum(values, arena, res);
    round_robin(arena, surplus, res, max_passes, |bucket, signed, surplus| {
        if res.steps_in(surplus) < bucket.size() {
            return None;
        }
        for &m in &bucket.members {
            values[m] = res.round(values[m] + signed);
        }
        Some(bucket.size())
    })
}

/// Percent+area variant. Every percent change recomputes the member's area
/// from `basis`; afterwards the area sum gets its own bounded pass,
/// because percent rounding and area rounding errors do not cancel.
pub fn redistribute_linked(
    percents: &mut [f64],
    areas: &mut [f64],
    arena: &BucketArena,
    target: LinkedTarget,
    max_passes: u32,
) -> LinkedOutcome {
    let pct_res = Resolution::Percent;
    let area_res = Resolution::Area;

    let pct_surplus = target.percent - current_sum(percents, arena, pct_res);
    let percent = round_robin(arena, pct_surplus, pct_res, max_passes, |bucket, signed, surplus| {
        if pct_res.steps_in(surplus) < bucket.size() {
            return None;
        }
        for &m in &bucket.members {
            percents[m] = pct_res.round(percents[m] + signed);
            areas[m] = area_res.round(percents[m] * target.basis / 100.0);
        }
        Some(bucket.size())
    });

    let area = redistribute(areas, arena, target.basis, area_res, max_passes);
    LinkedOutcome { percent, area }
}

/// Special-common-area variant: only members holding a nonzero value move,
/// and no bucket-size check applies. A full pass with nobody to move cannot
/// make progress, so it ends the procedure.
pub fn redistribute_nonzero(
    values: &mut [f64],
    arena: &BucketArena,
    target: f64,
    res: Resolution,
    max_passes: u32,
) -> Outcome {
    if !arena.members().any(|m| values[m] != 0.0) {
        let residual = res.round(target - current_sum(values, arena, res));
        return Outcome::untouched(residual, residual.abs() < res.threshold());
    }
    let surplus = target - current_sum(values, arena, res);
    round_robin(arena, surplus, res, max_passes, |bucket, signed, _| {
        let mut moved = 0usize;
        for &m in &bucket.members {
            if values[m] != 0.0 {
                values[m] = res.round(values[m] + signed);
                moved += 1;
            }
        }
        (moved > 0).then_some(moved)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(v: &[f64]) -> f64 {
        v.iter().sum()
    }

    #[test]
    fn group_by_keeps_first_appearance_order() {
        let keys = [5.0, 3.0, 5.0, 1.0, 3.0];
        let arena = BucketArena::group_by(&[0, 1, 2, 3, 4], |i| keys[i]);
        assert_eq!(arena.len(), 3);
        assert_eq!(arena.buckets()[0].members, vec![0, 2]);
        assert_eq!(arena.buckets()[1].members, vec![1, 4]);
        assert_eq!(arena.buckets()[2].members, vec![3]);
        assert_eq!(arena.get(BucketId(2)).map(Bucket::size), Some(1));
        assert_eq!(arena.member_count(), 5);
    }

    #[test]
    fn already_exact_is_a_no_op() {
        let mut v = vec![40.0, 35.0, 25.0];
        let arena = BucketArena::singletons(&[0, 1, 2]);
        let out = redistribute(&mut v, &arena, 100.0, Resolution::Percent, MAX_PASSES_PERCENT);
        assert!(out.converged);
        assert_eq!(out.passes, 0);
        assert_eq!(out.adjusted_steps, 0);
        assert_eq!(v, vec![40.0, 35.0, 25.0]);
    }

    #[test]
    fn first_bucket_takes_the_single_step() {
        let mut v = vec![33.33, 33.33, 33.33];
        let arena = BucketArena::singletons(&[0, 1, 2]);
        let out = redistribute(&mut v, &arena, 100.0, Resolution::Area, MAX_PASSES_PERCENT);
        assert!(out.converged);
        assert_eq!(out.adjusted_steps, 1);
        assert_eq!(v, vec![33.34, 33.33, 33.33]);
        assert!((sum(&v) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn tied_bucket_waits_until_surplus_covers_it() {
        // bucket of 2 cannot absorb a single step; the singleton behind it can
        let mut v = vec![33.333, 33.333, 33.333];
        let arena = BucketArena::group_by(&[0, 1, 2], |i| if i < 2 { 1 } else { 2 });
        let out = redistribute(&mut v, &arena, 100.0, Resolution::Percent, MAX_PASSES_PERCENT);
        assert!(out.converged);
        assert_eq!(v, vec![33.333, 33.333, 33.334]);
    }

    #[test]
    fn negative_surplus_moves_down() {
        let mut v = vec![50.003, 50.0];
        let arena = BucketArena::singletons(&[0, 1]);
        let out = redistribute(&mut v, &arena, 100.0, Resolution::Percent, MAX_PASSES_PERCENT);
        assert!(out.converged);
        assert_eq!(v, vec![50.001, 49.999]);
    }

    #[test]
    fn unreachable_target_stops_after_bounded_passes() {
        let mut v = vec![33.333, 33.333, 33.333];
        let arena = BucketArena::group_by(&[0, 1, 2], |_| 0);
        let out = redistribute(&mut v, &arena, 100.0, Resolution::Percent, MAX_PASSES_PERCENT);
        assert!(!out.converged);
        assert_eq!(out.passes, MAX_PASSES_PERCENT);
        assert!((out.residual - 0.001).abs() < 1e-12);
        assert_eq!(v, vec![33.333, 33.333, 33.333]);
    }

    #[test]
    fn empty_arena_reports_residual() {
        let mut v: Vec<f64> = Vec::new();
        let out = redistribute(&mut v, &BucketArena::new(), 100.0, Resolution::Percent, 10);
        assert!(!out.converged);
        assert_eq!(out.residual, 100.0);
    }

    #[test]
    fn linked_variant_recomputes_areas_then_fixes_area_sum() {
        // three equal-weight units of a 100 m² common total
        let mut pct = vec![33.333, 33.333, 33.333];
        let mut area = vec![33.33, 33.33, 33.33];
        let arena = BucketArena::singletons(&[0, 1, 2]);
        let out = redistribute_linked(
            &mut pct,
            &mut area,
            &arena,
            LinkedTarget { percent: 100.0, basis: 100.0 },
            MAX_PASSES_LINKED,
        );
        assert!(out.converged());
        assert_eq!(pct, vec![33.334, 33.333, 33.333]);
        assert!((sum(&pct) - 100.0).abs() < 1e-9);
        assert!((sum(&area) - 100.0).abs() < 1e-9);
        assert_eq!(area, vec![33.34, 33.33, 33.33]);
    }

    #[test]
    fn nonzero_variant_skips_zero_members() {
        let mut v = vec![0.0, 59.99, 0.0, 39.99];
        let arena = BucketArena::singletons(&[0, 1, 2, 3]);
        let out = redistribute_nonzero(&mut v, &arena, 100.0, Resolution::Area, MAX_PASSES_SPECIAL);
        assert!(out.converged);
        assert_eq!(v, vec![0.0, 60.0, 0.0, 40.0]);
    }

    #[test]
    fn nonzero_variant_overshoots_a_tied_bucket() {
        let mut v: Vec<f64> = vec![1.0, 1.0];
        let arena = BucketArena::group_by(&[0, 1], |i| v[i].to_bits());
        let out = redistribute_nonzero(&mut v, &arena, 2.01, Resolution::Area, MAX_PASSES_SPECIAL);
        assert!(!out.converged);
        assert_eq!(out.passes, MAX_PASSES_SPECIAL);
        assert_eq!(out.adjusted_steps, MAX_PASSES_SPECIAL);
        assert_eq!(out.residual, -0.01);
        assert_eq!(v, vec![1.01, 1.01]);
    }

    #[test]
    fn nonzero_variant_with_nothing_to_move() {
        let mut v = vec![0.0, 0.0];
        let arena = BucketArena::singletons(&[0, 1]);
        let out = redistribute_nonzero(&mut v, &arena, 1.0, Resolution::Area, MAX_PASSES_SPECIAL);
        assert!(!out.converged);
        assert_eq!(out.residual, 1.0);
    }
}
