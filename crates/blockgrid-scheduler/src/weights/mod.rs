//! Weigher pipeline: soft ranking of the pools that survived filtering.
//!
//! Every configured weigher scores every candidate; a [`WeightHandler`]
//! combines the scores (each scaled by the weigher's multiplier) and
//! decides the order. Two handlers exist:
//!
//! - [`OrderedWeightHandler`]: min-max normalizes each weigher's scores,
//!   sums them, sorts descending.
//! - [`StochasticWeightHandler`]: sums raw scores and runs a weighted
//!   lottery; the winner comes first, the rest follow in rotated order.

pub mod capacity;
pub mod chance;
mod ordered;
mod stochastic;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use blockgrid_core::{WeightHandlerKind, WeigherConfig};
use blockgrid_state::FilterProperties;

use crate::backend_state::PoolState;
use crate::error::{SchedulerError, SchedulerResult};

pub use ordered::OrderedWeightHandler;
pub use stochastic::{StochasticWeightHandler, select_index};

/// Per-candidate weigher failure. The candidate gets zero from that weigher.
#[derive(Debug, Error)]
pub enum WeighError {
    #[error("cannot weigh {pool}: {reason}")]
    Unweighable { pool: String, reason: String },
}

pub trait Weigher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Multiplier used when the configuration does not set one.
    fn default_multiplier(&self) -> f64 {
        1.0
    }

    fn weigh(&self, pool: &PoolState, props: &FilterProperties) -> Result<f64, WeighError>;

    /// Score every candidate. A failed score counts as zero.
    fn weigh_objects(&self, pools: &[PoolState], props: &FilterProperties) -> Vec<f64> {
        pools
            .iter()
            .map(|pool| match self.weigh(pool, props) {
                Ok(w) => w,
                Err(e) => {
                    warn!(weigher = self.name(), error = %e, "weigher failed, scoring zero");
                    0.0
                }
            })
            .collect()
    }
}

/// A weigher with its effective multiplier.
#[derive(Clone)]
pub struct ConfiguredWeigher {
    pub weigher: Arc<dyn Weigher>,
    pub multiplier: f64,
}

impl ConfiguredWeigher {
    pub fn new(weigher: Arc<dyn Weigher>, multiplier: Option<f64>) -> Self {
        let multiplier = multiplier.unwrap_or_else(|| weigher.default_multiplier());
        Self { weigher, multiplier }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeighedPool {
    pub pool: PoolState,
    pub weight: f64,
}

pub trait WeightHandler: Send + Sync {
    fn get_weighed_objects(
        &self,
        weighers: &[ConfiguredWeigher],
        pools: Vec<PoolState>,
        props: &FilterProperties,
    ) -> Vec<WeighedPool>;
}

/// Min-max normalize into `[0, 1]`. All-equal input maps to all zeros.
pub fn normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if values.is_empty() || range <= 0.0 || !range.is_finite() {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}

/// Names accepted by [`build_weigher`].
pub const WEIGHER_NAMES: &[&str] = &["CapacityWeigher", "AllocatedCapacityWeigher", "ChanceWeigher"];

pub fn build_weigher(config: &WeigherConfig) -> SchedulerResult<ConfiguredWeigher> {
    let weigher: Arc<dyn Weigher> = match config.name.as_str() {
        "CapacityWeigher" => Arc::new(capacity::CapacityWeigher),
        "AllocatedCapacityWeigher" => Arc::new(capacity::AllocatedCapacityWeigher),
        "ChanceWeigher" => Arc::new(chance::ChanceWeigher),
        other => return Err(SchedulerError::UnknownWeigher(other.to_string())),
    };
    Ok(ConfiguredWeigher::new(weigher, config.multiplier))
}

/// Resolve the configured weighers, failing on the first unknown name.
pub fn build_weighers(configs: &[WeigherConfig]) -> SchedulerResult<Vec<ConfiguredWeigher>> {
    configs.iter().map(build_weigher).collect()
}

pub fn build_weight_handler(kind: WeightHandlerKind) -> Arc<dyn WeightHandler> {
    match kind {
        WeightHandlerKind::Ordered => Arc::new(OrderedWeightHandler),
        WeightHandlerKind::Stochastic => Arc::new(StochasticWeightHandler::new()),
    }
}
