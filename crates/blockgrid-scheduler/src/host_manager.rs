//! HostManager — process-wide registry of backend capabilities.
//!
//! Owns three pieces of shared state:
//!
//! - `service_states`: the last accepted capability report per host,
//!   stamped with the local time it was stored.
//! - `service_states_last_update`: the last report this process itself
//!   announced to telemetry (the notification ledger).
//! - `backend_state_map`: the [`BackendState`] model rebuilt from reports.
//!
//! Every mutation runs under its [`RegistryScope`]. Readers take snapshots;
//! a placement never iterates live registry state. Nothing here
//! coordinates with other scheduler processes, so two replicas can both
//! announce the same snapshot.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use blockgrid_core::SchedulerConfig;
use blockgrid_state::{CapabilityReport, FilterProperties, VolumeType, append_pool};

use crate::backend_state::{BackendState, PoolState};
use crate::collab::{LogUsageSink, ProjectTagSource, ServiceRegistry, SpecMatcher, UsageSink};
use crate::error::{SchedulerError, SchedulerResult};
use crate::filters::capabilities::satisfies_extra_specs;
use crate::filters::{Filter, FilterDeps, FilterHandler, FilterOutcome, build_filters};
use crate::locks::{RegistryLocks, RegistryScope};
use crate::ttl_cache::TtlCache;
use crate::usage::get_usage;

/// A capability report as stored in the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCapabilities {
    pub report: CapabilityReport,
    /// Producer time, or the local receive time when the producer sent none.
    pub producer_timestamp: DateTime<Utc>,
    /// Local time this process stored the entry.
    pub observed_at: DateTime<Utc>,
}

/// Narrowing for [`HostManager::get_pools`].
#[derive(Debug, Clone, Default)]
pub struct PoolQuery {
    /// Pool id (`backend#pool`) or backend id.
    pub name: Option<String>,
    pub multiattach: Option<bool>,
    pub volume_type: Option<VolumeType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolSummary {
    pub name: String,
    pub capabilities: Value,
}

pub struct HostManager {
    topic: String,
    registry: Arc<dyn ServiceRegistry>,
    telemetry: Arc<dyn UsageSink>,
    project_tags: Option<Arc<dyn ProjectTagSource>>,
    telemetry_timeout: Duration,
    auth_timeout: Duration,
    site_attribute: Option<String>,
    filters: Vec<Arc<dyn Filter>>,
    handler: FilterHandler,
    matcher: Arc<dyn SpecMatcher>,
    locks: RegistryLocks,
    service_states: RwLock<HashMap<String, StoredCapabilities>>,
    service_states_last_update: RwLock<HashMap<String, StoredCapabilities>>,
    backend_state_map: RwLock<HashMap<String, BackendState>>,
    shard_tags: TtlCache<String, Vec<String>>,
}

impl HostManager {
    /// Build the registry and resolve the configured filter chain.
    pub fn new(
        config: &SchedulerConfig,
        registry: Arc<dyn ServiceRegistry>,
        deps: FilterDeps,
    ) -> SchedulerResult<Self> {
        config.validate()?;
        let deps = deps.with_shard(config.shard.clone());
        let filters = build_filters(&config.filters, &deps)?;
        info!(
            topic = %config.capability_topic,
            filters = ?config.filters,
            "host manager ready"
        );

        Ok(Self {
            topic: config.capability_topic.clone(),
            registry,
            telemetry: Arc::new(LogUsageSink),
            project_tags: None,
            telemetry_timeout: config.telemetry_timeout(),
            auth_timeout: config.auth_timeout(),
            site_attribute: config.site_attribute.clone(),
            filters,
            handler: FilterHandler::new(),
            matcher: deps.matcher,
            locks: RegistryLocks::new(),
            service_states: RwLock::new(HashMap::new()),
            service_states_last_update: RwLock::new(HashMap::new()),
            backend_state_map: RwLock::new(HashMap::new()),
            shard_tags: TtlCache::new(config.shard_cache_ttl()),
        })
    }

    pub fn with_telemetry(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.telemetry = sink;
        self
    }

    pub fn with_project_tags(mut self, source: Arc<dyn ProjectTagSource>) -> Self {
        self.project_tags = Some(source);
        self
    }

    pub fn filters(&self) -> &[Arc<dyn Filter>] {
        &self.filters
    }

    // ── Capability ingestion ──────────────────────────────────────

    /// Store a capability report for `host`.
    ///
    /// A report older (by producer time) than the stored one is dropped.
    /// A report without a producer time is stamped with the local clock.
    /// Returns whether the report was accepted.
    pub async fn update_service_capabilities(
        &self,
        service_name: &str,
        host: &str,
        report: &CapabilityReport,
        cluster_name: Option<&str>,
        producer_timestamp: Option<DateTime<Utc>>,
    ) -> bool {
        if service_name != self.topic {
            debug!(%service_name, %host, "ignoring capabilities for another topic");
            return false;
        }
        let _scope = self.locks.enter(RegistryScope::CapabilityUpdate).await;
        let now = Utc::now();
        let producer_timestamp = producer_timestamp.or(report.timestamp).unwrap_or(now);

        {
            let mut states = self.service_states.write().await;
            if let Some(stored) = states.get(host) {
                if producer_timestamp < stored.producer_timestamp {
                    debug!(
                        %host,
                        received = ?producer_timestamp,
                        stored = ?stored.producer_timestamp,
                        "dropping stale capability report"
                    );
                    return false;
                }
            }
            states.insert(
                host.to_string(),
                StoredCapabilities {
                    report: report.clone(),
                    producer_timestamp,
                    observed_at: now,
                },
            );
        }

        let mut backends = self.backend_state_map.write().await;
        let state = backends
            .entry(host.to_string())
            .or_insert_with(|| BackendState::new(host));
        state.update_from_report(report, cluster_name, Some(producer_timestamp), now);
        debug!(%host, pools = state.pools.len(), "capabilities updated");
        true
    }

    /// Announce a capability snapshot to telemetry unless this process
    /// already announced the same content.
    ///
    /// Returns whether a notification went out. A telemetry failure or
    /// timeout fails this call and leaves the ledger untouched.
    pub async fn notify_service_capabilities(
        &self,
        service_name: &str,
        host: &str,
        report: &CapabilityReport,
        producer_timestamp: Option<DateTime<Utc>>,
    ) -> SchedulerResult<bool> {
        if service_name != self.topic {
            return Ok(false);
        }
        let _scope = self.locks.enter(RegistryScope::Notification).await;
        let snapshot = report.without_timestamp();

        {
            let ledger = self.service_states_last_update.read().await;
            if ledger.get(host).is_some_and(|s| s.report == snapshot) {
                debug!(%host, "capabilities already announced");
                return Ok(false);
            }
        }

        let now = Utc::now();
        let producer_timestamp = producer_timestamp.or(report.timestamp).unwrap_or(now);
        let mut scratch = BackendState::new(host);
        scratch.update_from_report(report, None, Some(producer_timestamp), now);
        let records = get_usage(host, report, &scratch.pool_candidates(), now);

        match tokio::time::timeout(self.telemetry_timeout, self.telemetry.emit_usage(records)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(%host, error = %e, "usage notification failed");
                return Err(SchedulerError::Telemetry(e));
            }
            Err(_) => {
                warn!(%host, timeout = ?self.telemetry_timeout, "usage notification timed out");
                return Err(SchedulerError::Timeout {
                    collaborator: "telemetry",
                    timeout: self.telemetry_timeout,
                });
            }
        }

        self.service_states_last_update.write().await.insert(
            host.to_string(),
            StoredCapabilities {
                report: snapshot,
                producer_timestamp,
                observed_at: Utc::now(),
            },
        );
        info!(%host, "capacity usage announced");
        Ok(true)
    }

    pub async fn service_capabilities(&self, host: &str) -> Option<StoredCapabilities> {
        self.service_states.read().await.get(host).cloned()
    }

    pub async fn last_announced(&self, host: &str) -> Option<StoredCapabilities> {
        self.service_states_last_update.read().await.get(host).cloned()
    }

    // ── Backend snapshots ─────────────────────────────────────────

    /// One state per schedulable unit that is up, enabled, and has
    /// reported, sorted by backend id.
    ///
    /// Cluster members collapse into the member with the freshest report;
    /// on a tie the lexicographically first host wins.
    pub async fn get_all_backend_states(&self) -> SchedulerResult<Vec<BackendState>> {
        let mut services = self
            .registry
            .list_services(&self.topic, false, false)
            .map_err(SchedulerError::Registry)?;
        services.sort_by(|a, b| a.host.cmp(&b.host));

        let _scope = self.locks.enter(RegistryScope::CapabilityUpdate).await;
        let mut backends = self.backend_state_map.write().await;
        let mut chosen: BTreeMap<String, (DateTime<Utc>, String)> = BTreeMap::new();

        for service in &services {
            let is_up = self.registry.is_up(service);
            let state = backends
                .entry(service.host.clone())
                .or_insert_with(|| BackendState::new(&service.host));
            state.update_from_service(service, is_up);

            if !is_up || state.disabled {
                debug!(host = %service.host, is_up, disabled = state.disabled, "backend unavailable");
                continue;
            }
            let Some(freshness) = state.reported_at.or(state.updated_at) else {
                debug!(host = %service.host, "no capabilities reported yet");
                continue;
            };

            let id = service.schedulable_id().to_string();
            let replace = chosen.get(&id).is_none_or(|(seen, _)| freshness > *seen);
            if replace {
                chosen.insert(id, (freshness, service.host.clone()));
            }
        }

        Ok(chosen
            .into_iter()
            .filter_map(|(id, (_, host))| {
                let state = backends.get(&host)?;
                Some(if state.backend_id() == id {
                    state.clone()
                } else {
                    state.with_backend_id(&id)
                })
            })
            .collect())
    }

    /// Whether every live service has delivered at least one report.
    pub async fn has_all_capabilities(&self) -> SchedulerResult<bool> {
        let services = self
            .registry
            .list_services(&self.topic, false, false)
            .map_err(SchedulerError::Registry)?;
        let states = self.service_states.read().await;
        Ok(services
            .iter()
            .filter(|s| self.registry.is_up(s) && s.is_schedulable())
            .all(|s| states.contains_key(&s.host)))
    }

    // ── Filtering ─────────────────────────────────────────────────

    /// Run the configured filter chain over a candidate snapshot.
    ///
    /// Resolves the request's project shard tags and the pool site index
    /// into `props.resolved` first.
    pub async fn get_filtered_backends(
        &self,
        candidates: Vec<PoolState>,
        props: &mut FilterProperties,
        index: usize,
    ) -> FilterOutcome {
        self.resolve_lookups(props).await;
        self.handler
            .get_filtered_objects(&self.filters, candidates, props, index)
    }

    async fn resolve_lookups(&self, props: &mut FilterProperties) {
        if let Some(attribute) = &self.site_attribute {
            props.resolved.pool_sites = self.site_index(attribute).await;
        }
        if self.filters.iter().any(|f| f.name() == "ShardFilter") {
            props.resolved.project_shards = match props.context.project_id.clone() {
                Some(project_id) => self.project_shard_tags(&project_id).await,
                None => None,
            };
        }
    }

    /// Site of every known pool, keyed by pool id under both the member
    /// host and the cluster name, plus a backend-level entry.
    async fn site_index(&self, attribute: &str) -> HashMap<String, String> {
        let backends = self.backend_state_map.read().await;
        let mut sites = HashMap::new();
        for backend in backends.values() {
            for pool in backend.pools.values() {
                let Some(site) = pool.capability(attribute).and_then(Value::as_str) else {
                    continue;
                };
                sites.insert(append_pool(&backend.info.host, &pool.pool_name), site.to_string());
                if let Some(cluster) = &backend.info.cluster_name {
                    sites.insert(append_pool(cluster, &pool.pool_name), site.to_string());
                }
                sites
                    .entry(backend.info.host.clone())
                    .or_insert_with(|| site.to_string());
            }
        }
        sites
    }

    /// Shard tags of a project, from the cache or the tag source.
    ///
    /// `None` when the source is missing, fails, or times out.
    async fn project_shard_tags(&self, project_id: &str) -> Option<Vec<String>> {
        let key = project_id.to_string();
        {
            let _scope = self.locks.enter(RegistryScope::ShardTagCache).await;
            if let Some(tags) = self.shard_tags.get(&key).await {
                return Some(tags);
            }
        }

        let Some(source) = &self.project_tags else {
            warn!(%project_id, "no project tag source configured");
            return None;
        };
        let tags = match tokio::time::timeout(self.auth_timeout, source.project_tags(project_id)).await {
            Ok(Ok(tags)) => tags,
            Ok(Err(e)) => {
                warn!(%project_id, error = %e, "project tag lookup failed");
                return None;
            }
            Err(_) => {
                warn!(%project_id, timeout = ?self.auth_timeout, "project tag lookup timed out");
                return None;
            }
        };

        let _scope = self.locks.enter(RegistryScope::ShardTagCache).await;
        self.shard_tags.insert(key, tags.clone()).await;
        Some(tags)
    }

    // ── Introspection and accounting ──────────────────────────────

    /// Pools of every schedulable backend, narrowed by `query`.
    pub async fn get_pools(&self, query: &PoolQuery) -> SchedulerResult<Vec<PoolSummary>> {
        let backends = self.get_all_backend_states().await?;
        let mut pools = Vec::new();
        for backend in &backends {
            for pool in backend.pools.values() {
                let id = pool.id();
                if let Some(name) = &query.name {
                    if name != &id && name != backend.backend_id() {
                        continue;
                    }
                }
                if let Some(wanted) = query.multiattach {
                    let reported = pool
                        .capability("multiattach")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    if reported != wanted {
                        continue;
                    }
                }
                let capabilities = pool.capability_tree();
                if let Some(volume_type) = &query.volume_type {
                    if !satisfies_extra_specs(
                        self.matcher.as_ref(),
                        &capabilities,
                        &volume_type.extra_specs,
                    ) {
                        continue;
                    }
                }
                pools.push(PoolSummary {
                    name: id,
                    capabilities,
                });
            }
        }
        Ok(pools)
    }

    /// Debit a placed volume from the registry's copy of `pool`.
    ///
    /// Returns false if the pool is no longer known.
    pub async fn consume_from_volume(&self, pool: &PoolState, size_gb: f64) -> bool {
        let _scope = self.locks.enter(RegistryScope::CapabilityUpdate).await;
        let mut backends = self.backend_state_map.write().await;
        match backends
            .get_mut(&pool.backend.host)
            .and_then(|b| b.pool_mut(&pool.pool_name))
        {
            Some(state) => {
                state.consume_from_volume(size_gb, Utc::now());
                debug!(pool = %pool.id(), size_gb, "capacity consumed");
                true
            }
            None => false,
        }
    }
}
