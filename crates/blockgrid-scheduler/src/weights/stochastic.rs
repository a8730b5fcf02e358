use std::fmt;
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, warn};

use blockgrid_state::FilterProperties;

use super::{ConfiguredWeigher, WeighedPool, WeightHandler};
use crate::backend_state::PoolState;

type Sampler = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Weighted lottery over raw combined weights.
///
/// Scores are not normalized and not sorted. One uniform draw in
/// `[0, total)` picks the winner; the result is the full candidate list
/// rotated so the winner is first and the others keep their relative
/// order, wrapping around.
#[derive(Clone)]
pub struct StochasticWeightHandler {
    sampler: Sampler,
}

impl fmt::Debug for StochasticWeightHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StochasticWeightHandler").finish_non_exhaustive()
    }
}

impl Default for StochasticWeightHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl StochasticWeightHandler {
    pub fn new() -> Self {
        Self {
            sampler: Arc::new(|| rand::thread_rng().gen_range(0.0..1.0)),
        }
    }

    /// Use `sampler` (values in `[0, 1)`) instead of the thread RNG.
    pub fn with_sampler(sampler: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        Self {
            sampler: Arc::new(sampler),
        }
    }
}

/// Index of the first candidate whose cumulative upper bound exceeds
/// `draw`. Falls back to the last candidate when `draw` reaches the total.
pub fn select_index(weights: &[f64], draw: f64) -> usize {
    let mut upper = 0.0;
    for (i, w) in weights.iter().enumerate() {
        upper += w;
        if draw < upper {
            return i;
        }
    }
    weights.len().saturating_sub(1)
}

impl WeightHandler for StochasticWeightHandler {
    fn get_weighed_objects(
        &self,
        weighers: &[ConfiguredWeigher],
        pools: Vec<PoolState>,
        props: &FilterProperties,
    ) -> Vec<WeighedPool> {
        if pools.is_empty() {
            return Vec::new();
        }

        let mut weights = vec![0.0; pools.len()];
        for w in weighers {
            for (total, score) in weights.iter_mut().zip(w.weigher.weigh_objects(&pools, props)) {
                *total += w.multiplier * score;
            }
        }
        for (pool, weight) in pools.iter().zip(weights.iter_mut()) {
            if *weight < 0.0 || !weight.is_finite() {
                warn!(pool = %pool.id(), weight = *weight, "invalid lottery weight, using zero");
                *weight = 0.0;
            }
        }

        let total: f64 = weights.iter().sum();
        let sample = (self.sampler)();
        let winner = if total > 0.0 {
            select_index(&weights, sample * total)
        } else {
            // every weight is zero: uniform pick
            ((sample * pools.len() as f64) as usize).min(pools.len() - 1)
        };
        debug!(winner = %pools[winner].id(), total, sample, "lottery drawn");

        let mut weighed: Vec<WeighedPool> = pools
            .into_iter()
            .zip(weights)
            .map(|(pool, weight)| WeighedPool { pool, weight })
            .collect();
        weighed.rotate_left(winner);
        weighed
    }
}
