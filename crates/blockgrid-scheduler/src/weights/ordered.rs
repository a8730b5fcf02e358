use blockgrid_state::FilterProperties;

use super::{ConfiguredWeigher, WeighedPool, WeightHandler, normalize};
use crate::backend_state::PoolState;

/// Normalize each weigher's scores, combine, sort descending.
///
/// The sort is stable: equal weights keep their input order.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrderedWeightHandler;

impl WeightHandler for OrderedWeightHandler {
    fn get_weighed_objects(
        &self,
        weighers: &[ConfiguredWeigher],
        pools: Vec<PoolState>,
        props: &FilterProperties,
    ) -> Vec<WeighedPool> {
        let mut totals = vec![0.0; pools.len()];
        for w in weighers {
            let scores = normalize(&w.weigher.weigh_objects(&pools, props));
            for (total, score) in totals.iter_mut().zip(scores) {
                *total += w.multiplier * score;
            }
        }

        let mut weighed: Vec<WeighedPool> = pools
            .into_iter()
            .zip(totals)
            .map(|(pool, weight)| WeighedPool { pool, weight })
            .collect();
        weighed.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        weighed
    }
}
