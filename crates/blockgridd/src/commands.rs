//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use blockgrid_core::SchedulerConfig;
use blockgrid_scheduler::{
    FilterDeps, FilterTrace, HostManager, PlacementEngine, PoolQuery, PoolSummary, SchedulerError,
    StoreServiceRegistry, VolumeLookup,
};
use blockgrid_state::{Capacity, CapabilityReport, FilterProperties, ServiceRecord, StateStore};

/// One capability delivery as the transport would hand it over.
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityDelivery {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    pub host: String,
    #[serde(default)]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub capabilities: CapabilityReport,
}

fn default_service_name() -> String {
    "volume".to_string()
}

#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PlacementOutcome {
    Placed { candidates: Vec<RankedPool> },
    NoValidBackend { trace: FilterTrace },
}

#[derive(Debug, Serialize)]
pub struct RankedPool {
    pub pool: String,
    pub host: String,
    pub weight: f64,
    pub free_capacity_gb: Option<Capacity>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Upsert service records. Returns how many were written.
pub fn register(db: &Path, services: &Path) -> anyhow::Result<usize> {
    let records: Vec<ServiceRecord> = read_json(services)?;
    let store = StateStore::open(db)?;
    for record in &records {
        store.put_service(record)?;
    }
    info!(count = records.len(), "services registered");
    Ok(records.len())
}

async fn host_manager(
    config: &SchedulerConfig,
    store: &StateStore,
    reports: &Path,
) -> anyhow::Result<Arc<HostManager>> {
    let deliveries: Vec<CapabilityDelivery> = read_json(reports)?;
    let registry = Arc::new(StoreServiceRegistry::new(
        store.clone(),
        config.service_down_time(),
    ));
    let volumes: Arc<dyn VolumeLookup> = Arc::new(store.clone());
    let hm = HostManager::new(config, registry, FilterDeps::default().with_volumes(volumes))?;

    for d in &deliveries {
        let accepted = hm
            .update_service_capabilities(
                &d.service_name,
                &d.host,
                &d.capabilities,
                d.cluster_name.as_deref(),
                d.timestamp,
            )
            .await;
        if !accepted {
            continue;
        }
        if let Err(e) = hm
            .notify_service_capabilities(&d.service_name, &d.host, &d.capabilities, d.timestamp)
            .await
        {
            warn!(host = %d.host, error = %e, "usage notification skipped");
        }
    }
    Ok(Arc::new(hm))
}

/// Replay `reports`, then place the request read from `request`.
pub async fn place(
    config: &SchedulerConfig,
    db: &Path,
    reports: &Path,
    request: &Path,
) -> anyhow::Result<PlacementOutcome> {
    let mut props: FilterProperties = read_json(request)?;
    let store = StateStore::open(db)?;
    let hm = host_manager(config, &store, reports).await?;
    let engine = PlacementEngine::new(config, hm)?;

    match engine.place(&mut props).await {
        Ok(ranked) => Ok(PlacementOutcome::Placed {
            candidates: ranked
                .into_iter()
                .map(|w| RankedPool {
                    pool: w.pool.id(),
                    host: w.pool.backend.host.clone(),
                    weight: w.weight,
                    free_capacity_gb: w.pool.free_capacity_gb,
                })
                .collect(),
        }),
        Err(SchedulerError::NoValidBackend { trace }) => {
            Ok(PlacementOutcome::NoValidBackend { trace })
        }
        Err(e) => Err(e.into()),
    }
}

/// Replay `reports`, then list pools matching the narrowing.
pub async fn pools(
    config: &SchedulerConfig,
    db: &Path,
    reports: &Path,
    name: Option<String>,
    multiattach: Option<bool>,
) -> anyhow::Result<Vec<PoolSummary>> {
    let store = StateStore::open(db)?;
    let hm = host_manager(config, &store, reports).await?;
    let query = PoolQuery {
        name,
        multiattach,
        volume_type: None,
    };
    Ok(hm.get_pools(&query).await?)
}
