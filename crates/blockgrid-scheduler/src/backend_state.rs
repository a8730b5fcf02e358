//! In-memory model of backends and their pools.
//!
//! A [`BackendState`] is the latest known state of one backend service; its
//! pool map is rebuilt wholesale from every accepted capability report, so
//! a pool that disappears from the report disappears here too. Pools carry
//! a copy of the backend metadata they need ([`BackendInfo`]) so a pool
//! snapshot can be filtered and weighed on its own.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use blockgrid_state::{
    Capacity, CapabilityReport, DEFAULT_POOL_NAME, ServiceRecord, append_pool,
};

/// Backend metadata shared by all pools of one backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackendInfo {
    /// Schedulable identity: host, `host@backend`, or cluster name.
    pub backend_id: String,
    /// Service host whose reports back this state.
    pub host: String,
    pub cluster_name: Option<String>,
    pub volume_backend_name: Option<String>,
    pub vendor_name: Option<String>,
    pub driver_version: Option<String>,
    pub storage_protocol: Option<String>,
    pub availability_zone: Option<String>,
}

/// State of one pool as last reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolState {
    pub backend: BackendInfo,
    pub pool_name: String,
    pub total_capacity_gb: Option<Capacity>,
    pub free_capacity_gb: Option<Capacity>,
    pub allocated_capacity_gb: Option<Capacity>,
    pub provisioned_capacity_gb: Option<Capacity>,
    pub reserved_percentage: f64,
    pub max_over_subscription_ratio: f64,
    /// Every other capability, verbatim.
    pub capabilities: Map<String, Value>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PoolState {
    /// Build a pool from its report entry.
    ///
    /// `backend_report` supplies fallbacks for reserved percentage,
    /// oversubscription ratio, and shared extra capabilities; capacities
    /// always come from the pool entry itself.
    fn from_report(
        backend: &BackendInfo,
        pool_name: &str,
        pool_report: &CapabilityReport,
        backend_report: &CapabilityReport,
        observed_at: DateTime<Utc>,
    ) -> Self {
        let mut capabilities = backend_report.extra.clone();
        for (k, v) in &pool_report.extra {
            capabilities.insert(k.clone(), v.clone());
        }

        Self {
            backend: backend.clone(),
            pool_name: pool_name.to_string(),
            total_capacity_gb: pool_report.total_capacity_gb,
            free_capacity_gb: pool_report.free_capacity_gb,
            allocated_capacity_gb: pool_report.allocated_capacity_gb,
            provisioned_capacity_gb: pool_report.provisioned_capacity_gb,
            reserved_percentage: pool_report
                .reserved_percentage
                .or(backend_report.reserved_percentage)
                .unwrap_or(0.0),
            max_over_subscription_ratio: pool_report
                .max_over_subscription_ratio
                .or(backend_report.max_over_subscription_ratio)
                .unwrap_or(1.0),
            capabilities,
            updated_at: Some(observed_at),
        }
    }

    /// `backend_id#pool_name`.
    pub fn id(&self) -> String {
        append_pool(&self.backend.backend_id, &self.pool_name)
    }

    pub fn backend_id(&self) -> &str {
        &self.backend.backend_id
    }

    pub fn capability(&self, key: &str) -> Option<&Value> {
        self.capabilities.get(key)
    }

    /// Reserved capacity in GiB, floored.
    pub fn reserved_capacity_gb(&self) -> Option<f64> {
        self.total_capacity_gb
            .and_then(|t| t.as_gb())
            .map(|total| (total * self.reserved_percentage / 100.0).floor())
    }

    /// Free capacity once oversubscription and the reserve are applied.
    ///
    /// `free + total * (ratio - 1) - reserved`. Sentinels pass through.
    pub fn virtual_free_capacity_gb(&self) -> Capacity {
        let free = self.free_capacity_gb.unwrap_or(Capacity::Unknown);
        let total = self.total_capacity_gb.unwrap_or(Capacity::Unknown);
        match (free, total) {
            (Capacity::Gb(free), Capacity::Gb(total)) => {
                let reserved = self.reserved_capacity_gb().unwrap_or(0.0);
                Capacity::Gb(free + total * (self.max_over_subscription_ratio - 1.0) - reserved)
            }
            (Capacity::Unknown, _) | (_, Capacity::Unknown) => Capacity::Unknown,
            _ => Capacity::Infinite,
        }
    }

    /// The full capability tree as filters see it: backend metadata,
    /// capacity figures, and every extra capability.
    pub fn capability_tree(&self) -> Value {
        let mut tree = Map::new();
        let info = &self.backend;
        let strings = [
            ("volume_backend_name", &info.volume_backend_name),
            ("vendor_name", &info.vendor_name),
            ("driver_version", &info.driver_version),
            ("storage_protocol", &info.storage_protocol),
        ];
        for (key, value) in strings {
            if let Some(v) = value {
                tree.insert(key.to_string(), Value::String(v.clone()));
            }
        }
        tree.insert("pool_name".to_string(), Value::String(self.pool_name.clone()));
        let capacities = [
            ("total_capacity_gb", self.total_capacity_gb),
            ("free_capacity_gb", self.free_capacity_gb),
            ("allocated_capacity_gb", self.allocated_capacity_gb),
            ("provisioned_capacity_gb", self.provisioned_capacity_gb),
        ];
        for (key, value) in capacities {
            if let Some(c) = value {
                tree.insert(key.to_string(), capacity_value(c));
            }
        }
        tree.insert(
            "reserved_percentage".to_string(),
            Value::from(self.reserved_percentage),
        );
        tree.insert(
            "max_over_subscription_ratio".to_string(),
            Value::from(self.max_over_subscription_ratio),
        );
        for (k, v) in &self.capabilities {
            tree.insert(k.clone(), v.clone());
        }
        Value::Object(tree)
    }

    /// Account for a volume just placed here, ahead of the next report.
    pub fn consume_from_volume(&mut self, size_gb: f64, now: DateTime<Utc>) {
        let add = |c: Option<Capacity>| Some(c.unwrap_or(Capacity::Gb(0.0)).map_gb(|v| v + size_gb));
        self.allocated_capacity_gb = add(self.allocated_capacity_gb);
        self.provisioned_capacity_gb = add(self.provisioned_capacity_gb);
        self.free_capacity_gb = self.free_capacity_gb.map(|c| c.map_gb(|v| v - size_gb));
        self.updated_at = Some(now);
    }
}

fn capacity_value(c: Capacity) -> Value {
    match c {
        Capacity::Gb(v) => Value::from(v),
        other => Value::String(other.to_string()),
    }
}

/// Latest known state of one backend service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendState {
    pub info: BackendInfo,
    pub is_up: bool,
    pub disabled: bool,
    pub disabled_reason: Option<String>,
    /// Backend-level extra capabilities.
    pub capabilities: Map<String, Value>,
    pub pools: BTreeMap<String, PoolState>,
    /// Producer timestamp of the report backing this state.
    pub reported_at: Option<DateTime<Utc>>,
    /// Local time the report was observed.
    pub updated_at: Option<DateTime<Utc>>,
}

impl BackendState {
    /// A state with no report yet.
    pub fn new(host: &str) -> Self {
        Self {
            info: BackendInfo {
                backend_id: host.to_string(),
                host: host.to_string(),
                ..BackendInfo::default()
            },
            is_up: false,
            disabled: false,
            disabled_reason: None,
            capabilities: Map::new(),
            pools: BTreeMap::new(),
            reported_at: None,
            updated_at: None,
        }
    }

    pub fn backend_id(&self) -> &str {
        &self.info.backend_id
    }

    /// Apply a capability report. The pool map is replaced, never merged.
    pub fn update_from_report(
        &mut self,
        report: &CapabilityReport,
        cluster_name: Option<&str>,
        producer_timestamp: Option<DateTime<Utc>>,
        observed_at: DateTime<Utc>,
    ) {
        self.info.cluster_name = cluster_name.map(str::to_string);
        self.info.volume_backend_name = report.volume_backend_name.clone();
        self.info.vendor_name = report.vendor_name.clone();
        self.info.driver_version = report.driver_version.clone();
        self.info.storage_protocol = report.storage_protocol.clone();
        self.capabilities = report.extra.clone();
        self.pools = build_pools(&self.info, report, observed_at);
        self.reported_at = producer_timestamp.or(report.timestamp);
        self.updated_at = Some(observed_at);
    }

    /// Refresh liveness and placement metadata from the service record.
    pub fn update_from_service(&mut self, service: &ServiceRecord, is_up: bool) {
        self.is_up = is_up;
        self.disabled = !service.is_schedulable();
        self.disabled_reason = service.disabled_reason.clone();
        self.info.availability_zone = Some(service.availability_zone.clone());
        self.info.cluster_name = service.cluster_name.clone();
        self.sync_pool_info();
    }

    /// A copy of this state under another schedulable identity (cluster).
    pub fn with_backend_id(&self, backend_id: &str) -> BackendState {
        let mut copy = self.clone();
        copy.info.backend_id = backend_id.to_string();
        copy.sync_pool_info();
        copy
    }

    pub fn pool_candidates(&self) -> Vec<PoolState> {
        self.pools.values().cloned().collect()
    }

    pub fn pool_mut(&mut self, pool_name: &str) -> Option<&mut PoolState> {
        self.pools.get_mut(pool_name)
    }

    fn sync_pool_info(&mut self) {
        for pool in self.pools.values_mut() {
            pool.backend = self.info.clone();
        }
    }
}

/// Build the pool map for a report: one pool per `pools` entry, or the
/// synthetic [`DEFAULT_POOL_NAME`] pool from backend-level fields.
pub fn build_pools(
    info: &BackendInfo,
    report: &CapabilityReport,
    observed_at: DateTime<Utc>,
) -> BTreeMap<String, PoolState> {
    match &report.pools {
        Some(pools) => pools
            .iter()
            .filter_map(|pool| {
                let Some(name) = pool.pool_name.as_deref() else {
                    warn!(host = %info.host, "skipping pool entry without pool_name");
                    return None;
                };
                Some((
                    name.to_string(),
                    PoolState::from_report(info, name, pool, report, observed_at),
                ))
            })
            .collect(),
        None => {
            let pool = PoolState::from_report(info, DEFAULT_POOL_NAME, report, report, observed_at);
            BTreeMap::from([(DEFAULT_POOL_NAME.to_string(), pool)])
        }
    }
}
