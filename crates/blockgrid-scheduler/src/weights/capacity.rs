use blockgrid_state::{Capacity, FilterProperties};

use super::{WeighError, Weigher};
use crate::backend_state::PoolState;

/// Prefers pools with more virtual free capacity.
///
/// An infinite pool scores just above the largest finite candidate; an
/// unknown one scores zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct CapacityWeigher;

impl Weigher for CapacityWeigher {
    fn name(&self) -> &'static str {
        "CapacityWeigher"
    }

    fn weigh(&self, pool: &PoolState, _props: &FilterProperties) -> Result<f64, WeighError> {
        Ok(match pool.virtual_free_capacity_gb() {
            Capacity::Gb(v) => v,
            Capacity::Infinite => f64::INFINITY,
            Capacity::Unknown => 0.0,
        })
    }

    fn weigh_objects(&self, pools: &[PoolState], props: &FilterProperties) -> Vec<f64> {
        let raw: Vec<f64> = pools
            .iter()
            .map(|p| self.weigh(p, props).unwrap_or(0.0))
            .collect();
        let max_finite = raw
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(0.0_f64, f64::max);
        raw.into_iter()
            .map(|v| if v.is_finite() { v } else { max_finite + 1.0 })
            .collect()
    }
}

/// Prefers pools with less allocated capacity (negative default
/// multiplier), spreading volumes across pools.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllocatedCapacityWeigher;

impl Weigher for AllocatedCapacityWeigher {
    fn name(&self) -> &'static str {
        "AllocatedCapacityWeigher"
    }

    fn default_multiplier(&self) -> f64 {
        -1.0
    }

    fn weigh(&self, pool: &PoolState, _props: &FilterProperties) -> Result<f64, WeighError> {
        Ok(pool
            .allocated_capacity_gb
            .and_then(|c| c.as_gb())
            .unwrap_or(0.0))
    }
}
