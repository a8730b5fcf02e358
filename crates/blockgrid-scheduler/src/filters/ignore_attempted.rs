use tracing::debug;

use blockgrid_state::FilterProperties;

use super::{Filter, FilterError};
use crate::backend_state::PoolState;

/// Skips pools and backends this request already tried.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreAttemptedHostsFilter;

impl Filter for IgnoreAttemptedHostsFilter {
    fn name(&self) -> &'static str {
        "IgnoreAttemptedHostsFilter"
    }

    fn passes(&self, pool: &PoolState, props: &FilterProperties) -> Result<bool, FilterError> {
        let Some(retry) = &props.retry else {
            return Ok(true);
        };
        let id = pool.id();
        let attempted = retry
            .backends
            .iter()
            .any(|b| b == &id || b == pool.backend_id());
        if attempted {
            debug!(pool = %id, attempts = retry.num_attempts, "already attempted");
        }
        Ok(!attempted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::testing::plain;

    #[test]
    fn first_attempt_passes_everything() {
        let p = plain("a@lvm");
        assert!(IgnoreAttemptedHostsFilter.passes(&p, &FilterProperties::default()).unwrap());
    }

    #[test]
    fn attempted_pools_and_backends_are_skipped() {
        let mut props = FilterProperties::default();
        props.record_attempt("a@lvm#_pool0");
        props.record_attempt("b@lvm");

        assert!(!IgnoreAttemptedHostsFilter.passes(&plain("a@lvm"), &props).unwrap());
        assert!(!IgnoreAttemptedHostsFilter.passes(&plain("b@lvm"), &props).unwrap());
        assert!(IgnoreAttemptedHostsFilter.passes(&plain("c@lvm"), &props).unwrap());
    }
}
