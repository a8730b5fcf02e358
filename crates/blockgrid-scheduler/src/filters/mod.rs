//! Filter pipeline: hard predicates that remove ineligible pools.
//!
//! Filters are resolved by name at startup ([`build_filters`]) and run in
//! configured order by the [`FilterHandler`]. A filter that fails on one
//! candidate excludes that candidate and nothing else.

pub mod affinity;
pub mod availability_zone;
pub mod capabilities;
pub mod capacity;
pub mod driver;
mod handler;
pub mod ignore_attempted;
pub mod shard;

use std::sync::Arc;

use thiserror::Error;

use blockgrid_core::ShardConfig;
use blockgrid_state::FilterProperties;

use crate::backend_state::PoolState;
use crate::collab::{ExpressionEvaluator, SpecMatcher, VolumeLookup};
use crate::error::{SchedulerError, SchedulerResult};
use crate::extra_specs::ExtraSpecsMatcher;

pub use handler::{FilterHandler, FilterOutcome, FilterStep, FilterTrace};

/// Per-candidate filter failure. Always turns into "exclude".
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("malformed scheduler hint {hint}: {value}")]
    MalformedHint { hint: &'static str, value: String },

    #[error("{0} is not available")]
    MissingDependency(&'static str),

    #[error("lookup failed: {0}")]
    Lookup(#[source] anyhow::Error),

    #[error("filter expression failed: {0}")]
    Evaluation(#[source] anyhow::Error),
}

pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the result cannot change between resources of one request.
    fn run_filter_once_per_request(&self) -> bool {
        false
    }

    /// Whether to run for the `index`-th resource of a multi-resource
    /// request.
    fn run_filter_for_index(&self, index: usize) -> bool {
        index == 0 || !self.run_filter_once_per_request()
    }

    fn passes(&self, pool: &PoolState, props: &FilterProperties) -> Result<bool, FilterError>;
}

/// Collaborators filters may need.
#[derive(Clone)]
pub struct FilterDeps {
    pub matcher: Arc<dyn SpecMatcher>,
    pub volumes: Option<Arc<dyn VolumeLookup>>,
    pub evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    pub shard: ShardConfig,
}

impl Default for FilterDeps {
    fn default() -> Self {
        Self {
            matcher: Arc::new(ExtraSpecsMatcher),
            volumes: None,
            evaluator: None,
            shard: ShardConfig::default(),
        }
    }
}

impl FilterDeps {
    pub fn with_volumes(mut self, volumes: Arc<dyn VolumeLookup>) -> Self {
        self.volumes = Some(volumes);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn SpecMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_shard(mut self, shard: ShardConfig) -> Self {
        self.shard = shard;
        self
    }
}

/// Names accepted by [`build_filter`].
pub const FILTER_NAMES: &[&str] = &[
    "AvailabilityZoneFilter",
    "CapacityFilter",
    "CapabilitiesFilter",
    "DriverFilter",
    "IgnoreAttemptedHostsFilter",
    "SameBackendFilter",
    "DifferentBackendFilter",
    "SameSiteFilter",
    "DifferentSiteFilter",
    "ShardFilter",
];

/// Resolve one configured filter name.
pub fn build_filter(name: &str, deps: &FilterDeps) -> SchedulerResult<Arc<dyn Filter>> {
    use affinity::{AffinityFilter, AffinityMode};

    let filter: Arc<dyn Filter> = match name {
        "AvailabilityZoneFilter" => Arc::new(availability_zone::AvailabilityZoneFilter),
        "CapacityFilter" => Arc::new(capacity::CapacityFilter),
        "CapabilitiesFilter" => Arc::new(capabilities::CapabilitiesFilter::new(Arc::clone(
            &deps.matcher,
        ))),
        "DriverFilter" => Arc::new(driver::DriverFilter::new(deps.evaluator.clone())),
        "IgnoreAttemptedHostsFilter" => Arc::new(ignore_attempted::IgnoreAttemptedHostsFilter),
        "SameBackendFilter" => Arc::new(AffinityFilter::new(
            AffinityMode::Same,
            false,
            deps.volumes.clone(),
        )),
        "DifferentBackendFilter" => Arc::new(AffinityFilter::new(
            AffinityMode::Different,
            false,
            deps.volumes.clone(),
        )),
        "SameSiteFilter" => Arc::new(AffinityFilter::new(
            AffinityMode::Same,
            true,
            deps.volumes.clone(),
        )),
        "DifferentSiteFilter" => Arc::new(AffinityFilter::new(
            AffinityMode::Different,
            true,
            deps.volumes.clone(),
        )),
        "ShardFilter" => Arc::new(shard::ShardFilter::new(&deps.shard)),
        other => return Err(SchedulerError::UnknownFilter(other.to_string())),
    };
    Ok(filter)
}

/// Resolve the configured filter chain, failing on the first unknown name.
pub fn build_filters(names: &[String], deps: &FilterDeps) -> SchedulerResult<Vec<Arc<dyn Filter>>> {
    names.iter().map(|n| build_filter(n, deps)).collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_every_known_filter() {
        let names: Vec<String> = FILTER_NAMES.iter().map(|s| s.to_string()).collect();
        let filters = build_filters(&names, &FilterDeps::default()).unwrap();
        let built: Vec<&str> = filters.iter().map(|f| f.name()).collect();
        assert_eq!(built, FILTER_NAMES);
    }

    #[test]
    fn unknown_filter_is_fatal() {
        let names = vec!["CapacityFilter".to_string(), "NoSuchFilter".to_string()];
        let err = build_filters(&names, &FilterDeps::default()).err().unwrap();
        assert!(matches!(err, SchedulerError::UnknownFilter(ref n) if n == "NoSuchFilter"));
    }

    #[test]
    fn once_per_request_filters_skip_later_indexes() {
        let az = build_filter("AvailabilityZoneFilter", &FilterDeps::default()).unwrap();
        let cap = build_filter("CapacityFilter", &FilterDeps::default()).unwrap();
        assert!(az.run_filter_for_index(0));
        assert!(!az.run_filter_for_index(1));
        assert!(cap.run_filter_for_index(3));
    }
}
