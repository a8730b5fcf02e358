use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use blockgrid_state::FilterProperties;

use super::Filter;
use crate::backend_state::PoolState;

/// Result of running the filter chain.
#[derive(Debug)]
pub enum FilterOutcome {
    /// Distinct surviving candidates, in input order.
    Passed(Vec<PoolState>),
    /// Some filter removed every candidate.
    NoMatch(FilterTrace),
}

impl FilterOutcome {
    pub fn into_candidates(self) -> Vec<PoolState> {
        match self {
            FilterOutcome::Passed(pools) => pools,
            FilterOutcome::NoMatch(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterStep {
    pub filter: String,
    pub before: usize,
    pub after: usize,
}

/// What happened on the way to an empty candidate list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterTrace {
    pub steps: Vec<FilterStep>,
    /// The filter that left nothing.
    pub zeroed_by: Option<String>,
    /// Pool ids that filter removed.
    pub removed: Vec<String>,
}

impl fmt::Display for FilterTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self
            .steps
            .iter()
            .map(|s| format!("{}: {} -> {}", s.filter, s.before, s.after))
            .collect();
        write!(f, "[{}]", steps.join(", "))?;
        if let Some(filter) = &self.zeroed_by {
            write!(f, "; {filter} removed [{}]", self.removed.join(", "))?;
        }
        Ok(())
    }
}

/// Runs an ordered filter chain over a candidate snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilterHandler;

impl FilterHandler {
    pub fn new() -> Self {
        Self
    }

    /// Run `filters` in order over `candidates`.
    ///
    /// Stops at the first filter that leaves no candidate; the remaining
    /// filters never run.
    pub fn get_filtered_objects(
        &self,
        filters: &[Arc<dyn Filter>],
        candidates: Vec<PoolState>,
        props: &FilterProperties,
        index: usize,
    ) -> FilterOutcome {
        let mut trace = FilterTrace::default();
        let mut current = candidates;

        for filter in filters {
            if !filter.run_filter_for_index(index) {
                debug!(filter = filter.name(), index, "filter skipped for this resource");
                continue;
            }
            let before = current.len();
            let (kept, removed): (Vec<PoolState>, Vec<PoolState>) =
                current.into_iter().partition(|pool| run_one(filter.as_ref(), pool, props));

            debug!(filter = filter.name(), before, after = kept.len(), "filter applied");
            trace.steps.push(FilterStep {
                filter: filter.name().to_string(),
                before,
                after: kept.len(),
            });

            if kept.is_empty() {
                trace.zeroed_by = Some(filter.name().to_string());
                trace.removed = removed.iter().map(PoolState::id).collect();
                log_no_match(&trace);
                return FilterOutcome::NoMatch(trace);
            }
            current = kept;
        }

        let mut seen = HashSet::new();
        current.retain(|pool| seen.insert(pool.id()));
        FilterOutcome::Passed(current)
    }
}

fn run_one(filter: &dyn Filter, pool: &PoolState, props: &FilterProperties) -> bool {
    match filter.passes(pool, props) {
        Ok(passed) => passed,
        Err(e) => {
            warn!(filter = filter.name(), pool = %pool.id(), error = %e, "filter failed, excluding candidate");
            false
        }
    }
}

fn log_no_match(trace: &FilterTrace) {
    debug!(steps = ?trace.steps, "filter chain trace");
    info!(
        filter = trace.zeroed_by.as_deref().unwrap_or_default(),
        removed = ?trace.removed,
        "filter removed all candidates"
    );
    warn!(%trace, "no candidate passed the filter chain");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::filters::FilterError;
    use crate::filters::testing::plain;

    struct Counting {
        name: &'static str,
        keep: fn(&PoolState) -> bool,
        calls: AtomicUsize,
    }

    impl Counting {
        fn new(name: &'static str, keep: fn(&PoolState) -> bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                keep,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Filter for Counting {
        fn name(&self) -> &'static str {
            self.name
        }

        fn passes(&self, pool: &PoolState, _props: &FilterProperties) -> Result<bool, FilterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((self.keep)(pool))
        }
    }

    struct Failing;

    impl Filter for Failing {
        fn name(&self) -> &'static str {
            "Failing"
        }

        fn passes(&self, pool: &PoolState, _props: &FilterProperties) -> Result<bool, FilterError> {
            if pool.backend_id() == "b@lvm" {
                Err(FilterError::MissingDependency("test collaborator"))
            } else {
                Ok(true)
            }
        }
    }

    fn four() -> Vec<PoolState> {
        ["a@lvm", "b@lvm", "c@lvm", "d@lvm"].into_iter().map(plain).collect()
    }

    #[test]
    fn zeroing_filter_stops_the_chain() {
        let a = Counting::new("A", |_| false);
        let b = Counting::new("B", |_| true);
        let filters: Vec<Arc<dyn Filter>> = vec![a.clone(), b.clone()];

        let outcome =
            FilterHandler::new().get_filtered_objects(&filters, four(), &FilterProperties::default(), 0);

        assert_eq!(a.calls.load(Ordering::SeqCst), 4);
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
        let FilterOutcome::NoMatch(trace) = outcome else {
            panic!("expected no match");
        };
        assert_eq!(trace.zeroed_by.as_deref(), Some("A"));
        assert_eq!(trace.removed.len(), 4);
        assert_eq!(
            trace.steps,
            vec![FilterStep {
                filter: "A".to_string(),
                before: 4,
                after: 0
            }]
        );
        assert!(trace.to_string().contains("A: 4 -> 0"));
    }

    #[test]
    fn filters_run_in_order_on_survivors() {
        let a = Counting::new("A", |p| p.backend_id() != "a@lvm");
        let b = Counting::new("B", |_| true);
        let filters: Vec<Arc<dyn Filter>> = vec![a.clone(), b.clone()];

        let passed = FilterHandler::new()
            .get_filtered_objects(&filters, four(), &FilterProperties::default(), 0)
            .into_candidates();

        assert_eq!(passed.len(), 3);
        assert_eq!(b.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn filter_error_excludes_only_that_candidate() {
        let filters: Vec<Arc<dyn Filter>> = vec![Arc::new(Failing)];
        let passed = FilterHandler::new()
            .get_filtered_objects(&filters, four(), &FilterProperties::default(), 0)
            .into_candidates();
        let ids: Vec<&str> = passed.iter().map(|p| p.backend_id()).collect();
        assert_eq!(ids, vec!["a@lvm", "c@lvm", "d@lvm"]);
    }

    #[test]
    fn duplicates_are_collapsed() {
        let mut candidates = four();
        candidates.push(plain("a@lvm"));
        let outcome =
            FilterHandler::new().get_filtered_objects(&[], candidates, &FilterProperties::default(), 0);
        assert_eq!(outcome.into_candidates().len(), 4);
    }
}
