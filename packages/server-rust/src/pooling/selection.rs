//! Weighted random choice of a pool for a new queue.
//!
//! Pools are laid end to end by weight; a uniform draw in `[0, total)` lands
//! in exactly one of them. Weight-0 pools occupy no space and are never
//! chosen.

use rand::Rng;
use wharf_core::PoolRecord;

/// Pools a queue with `flavor` may be placed on: matching flavor (an
/// unflavored queue only matches unflavored pools) and non-zero weight.
#[must_use]
pub fn eligible<'a>(pools: &'a [PoolRecord], flavor: Option<&str>) -> Vec<&'a PoolRecord> {
    pools
        .iter()
        .filter(|pool| pool.weight > 0 && pool.flavor.as_deref() == flavor)
        .collect()
}

#[must_use]
pub fn total_weight(pools: &[&PoolRecord]) -> u64 {
    pools.iter().map(|pool| u64::from(pool.weight)).sum()
}

/// Returns the first pool whose cumulative weight exceeds `draw`, or `None`
/// when `draw` is past the total.
#[must_use]
pub fn pick_with<'a>(pools: &[&'a PoolRecord], draw: u64) -> Option<&'a PoolRecord> {
    let mut cumulative = 0u64;
    for pool in pools {
        cumulative += u64::from(pool.weight);
        if draw < cumulative {
            return Some(*pool);
        }
    }
    None
}

/// Draws a pool at random, proportionally to weight.
pub fn pick<'a, R: Rng + ?Sized>(pools: &[&'a PoolRecord], rng: &mut R) -> Option<&'a PoolRecord> {
    let total = total_weight(pools);
    if total == 0 {
        return None;
    }
    pick_with(pools, rng.random_range(0..total))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn pools(weights: &[u32]) -> Vec<PoolRecord> {
        weights
            .iter()
            .enumerate()
            .map(|(i, w)| PoolRecord::new(format!("p{i}"), format!("memory://p{i}"), *w))
            .collect()
    }

    #[test]
    fn cumulative_boundaries() {
        let all = pools(&[10, 0, 30]);
        let refs: Vec<_> = all.iter().collect();

        assert_eq!(pick_with(&refs, 0).unwrap().name, "p0");
        assert_eq!(pick_with(&refs, 9).unwrap().name, "p0");
        assert_eq!(pick_with(&refs, 10).unwrap().name, "p2");
        assert_eq!(pick_with(&refs, 39).unwrap().name, "p2");
        assert!(pick_with(&refs, 40).is_none());
    }

    #[test]
    fn eligibility_filters_weight_and_flavor() {
        let mut all = pools(&[10, 0, 5, 5]);
        all[2].flavor = Some("gold".into());
        all[3].flavor = Some("gold".into());
        all[3].weight = 0;

        let plain: Vec<_> = eligible(&all, None).iter().map(|p| p.name.as_str()).collect();
        assert_eq!(plain, ["p0"]);
        let gold: Vec<_> = eligible(&all, Some("gold")).iter().map(|p| p.name.as_str()).collect();
        assert_eq!(gold, ["p2"]);
        assert!(eligible(&all, Some("silver")).is_empty());
    }

    #[test]
    fn nothing_to_pick_from_zero_total() {
        let all = pools(&[0, 0]);
        let refs: Vec<_> = all.iter().collect();
        assert!(pick(&refs, &mut rand::rng()).is_none());
        assert!(pick(&[], &mut rand::rng()).is_none());
    }

    #[test]
    fn frequencies_track_weights() {
        let all = pools(&[100, 300, 600]);
        let refs: Vec<_> = all.iter().collect();
        let mut rng = StdRng::seed_from_u64(7);
        let draws = 100_000;

        let mut counts: HashMap<&str, u32> = HashMap::new();
        for _ in 0..draws {
            let pool = pick(&refs, &mut rng).unwrap();
            *counts.entry(pool.name.as_str()).or_default() += 1;
        }

        for (name, weight) in [("p0", 0.1), ("p1", 0.3), ("p2", 0.6)] {
            let observed = f64::from(counts[name]) / f64::from(draws);
            assert!(
                (observed - weight).abs() < 0.01,
                "{name}: expected ~{weight}, observed {observed}"
            );
        }
    }

    proptest! {
        #[test]
        fn every_draw_lands_on_a_weighted_pool(
            weights in proptest::collection::vec(0u32..50, 1..8),
            seed in any::<u64>(),
        ) {
            let all = pools(&weights);
            let refs: Vec<_> = all.iter().collect();
            let total = total_weight(&refs);
            let mut rng = StdRng::seed_from_u64(seed);

            match pick(&refs, &mut rng) {
                Some(pool) => prop_assert!(pool.weight > 0),
                None => prop_assert_eq!(total, 0),
            }
            for draw in 0..total {
                prop_assert!(pick_with(&refs, draw).is_some_and(|p| p.weight > 0));
            }
        }
    }
}
