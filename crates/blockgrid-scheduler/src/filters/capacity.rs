use tracing::debug;

use blockgrid_state::{Capacity, FilterProperties};

use super::{Filter, FilterError};
use crate::backend_state::PoolState;

/// Keeps pools with enough free capacity left after the reserve.
#[derive(Debug, Default, Clone, Copy)]
pub struct CapacityFilter;

impl Filter for CapacityFilter {
    fn name(&self) -> &'static str {
        "CapacityFilter"
    }

    fn passes(&self, pool: &PoolState, props: &FilterProperties) -> Result<bool, FilterError> {
        let requested = props.requested_size() as f64;
        let free = match pool.free_capacity_gb {
            None => {
                debug!(pool = %pool.id(), "free capacity not reported");
                return Ok(false);
            }
            Some(Capacity::Infinite) | Some(Capacity::Unknown) => return Ok(true),
            Some(Capacity::Gb(free)) => free,
        };

        let free_after_reserve = (free * (1.0 - pool.reserved_percentage / 100.0)).floor();
        if free_after_reserve < requested {
            debug!(
                pool = %pool.id(),
                requested,
                free_after_reserve,
                "insufficient free capacity"
            );
            return Ok(false);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::testing::pool;
    use serde_json::json;

    fn request(size: u64) -> FilterProperties {
        let mut props = FilterProperties::default();
        props.request_spec.resource_properties.size = size;
        props
    }

    #[test]
    fn unset_free_capacity_always_excludes() {
        let p = pool("a@lvm", json!({"total_capacity_gb": 100}));
        for size in [0, 1, 1000] {
            assert!(!CapacityFilter.passes(&p, &request(size)).unwrap());
        }
    }

    #[test]
    fn reserve_is_subtracted() {
        let p = pool("a@lvm", json!({"free_capacity_gb": 100, "reserved_percentage": 10}));
        assert!(CapacityFilter.passes(&p, &request(90)).unwrap());
        assert!(!CapacityFilter.passes(&p, &request(91)).unwrap());
    }

    #[test]
    fn sentinels_pass() {
        let inf = pool("a@lvm", json!({"free_capacity_gb": "infinite"}));
        let unk = pool("b@lvm", json!({"free_capacity_gb": "unknown"}));
        assert!(CapacityFilter.passes(&inf, &request(10_000)).unwrap());
        assert!(CapacityFilter.passes(&unk, &request(10_000)).unwrap());
    }
}
