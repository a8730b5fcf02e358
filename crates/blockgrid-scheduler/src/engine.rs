//! PlacementEngine — the scheduler driver.
//!
//! ```text
//! get_all_backend_states ─► flatten pools ─► get_filtered_backends
//!                                                   │
//!                   record attempt + consume ◄─ weigh (ordered | stochastic)
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use blockgrid_core::SchedulerConfig;
use blockgrid_state::FilterProperties;

use crate::backend_state::PoolState;
use crate::error::{SchedulerError, SchedulerResult};
use crate::filters::{FilterOutcome, FilterTrace};
use crate::host_manager::HostManager;
use crate::weights::{
    ConfiguredWeigher, WeighedPool, WeightHandler, build_weighers, build_weight_handler,
};

pub struct PlacementEngine {
    host_manager: Arc<HostManager>,
    weighers: Vec<ConfiguredWeigher>,
    handler: Arc<dyn WeightHandler>,
}

impl PlacementEngine {
    /// Resolve the configured weighers and weight handler.
    pub fn new(config: &SchedulerConfig, host_manager: Arc<HostManager>) -> SchedulerResult<Self> {
        let weighers = build_weighers(&config.weighers)?;
        let handler = build_weight_handler(config.weight_handler);
        info!(
            weighers = ?config.weighers.iter().map(|w| w.name.as_str()).collect::<Vec<_>>(),
            handler = ?config.weight_handler,
            "placement engine ready"
        );
        Ok(Self {
            host_manager,
            weighers,
            handler,
        })
    }

    pub fn with_weight_handler(mut self, handler: Arc<dyn WeightHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn host_manager(&self) -> &Arc<HostManager> {
        &self.host_manager
    }

    /// Filter and rank the current pools for the `index`-th resource of a
    /// request, without committing to any of them.
    pub async fn weighed_backends(
        &self,
        props: &mut FilterProperties,
        index: usize,
    ) -> SchedulerResult<Vec<WeighedPool>> {
        let snapshot = self.host_manager.get_all_backend_states().await?;
        let candidates: Vec<PoolState> = snapshot
            .iter()
            .flat_map(|backend| backend.pools.values().cloned())
            .collect();
        debug!(backends = snapshot.len(), pools = candidates.len(), "candidate snapshot");

        match self
            .host_manager
            .get_filtered_backends(candidates, props, index)
            .await
        {
            FilterOutcome::NoMatch(trace) => Err(SchedulerError::NoValidBackend { trace }),
            FilterOutcome::Passed(pools) if pools.is_empty() => Err(SchedulerError::NoValidBackend {
                trace: FilterTrace::default(),
            }),
            FilterOutcome::Passed(pools) => {
                Ok(self.handler.get_weighed_objects(&self.weighers, pools, props))
            }
        }
    }

    /// Choose a pool for the request.
    ///
    /// The winner is recorded in the request's retry history and its
    /// capacity is debited in the registry. The full ranked list is
    /// returned so a caller can fall through to the next candidate.
    pub async fn place(&self, props: &mut FilterProperties) -> SchedulerResult<Vec<WeighedPool>> {
        let ranked = self.weighed_backends(props, 0).await?;
        let Some(winner) = ranked.first() else {
            return Err(SchedulerError::NoValidBackend {
                trace: FilterTrace::default(),
            });
        };

        props.record_attempt(&winner.pool.id());
        self.host_manager
            .consume_from_volume(&winner.pool, props.requested_size() as f64)
            .await;
        info!(
            pool = %winner.pool.id(),
            weight = winner.weight,
            candidates = ranked.len(),
            "placement chosen"
        );
        Ok(ranked)
    }
}
