use rand::Rng;

use blockgrid_state::FilterProperties;

use super::{WeighError, Weigher};
use crate::backend_state::PoolState;

/// Independent uniform random score in `[0, 1)` per candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChanceWeigher;

impl Weigher for ChanceWeigher {
    fn name(&self) -> &'static str {
        "ChanceWeigher"
    }

    fn weigh(&self, _pool: &PoolState, _props: &FilterProperties) -> Result<f64, WeighError> {
        Ok(rand::thread_rng().gen_range(0.0..1.0))
    }
}
