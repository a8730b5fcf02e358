//! Usage records derived from capability reports.
//!
//! One record per pool plus one aggregate record for the backend. The
//! backend record sums its pools; it is never recomputed from the
//! backend-level figures of the report.

use chrono::{DateTime, Utc};
use serde::Serialize;

use blockgrid_state::{Capacity, CapabilityReport};

use crate::backend_state::PoolState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageKind {
    Pool,
    Backend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    #[serde(rename = "type")]
    pub kind: UsageKind,
    /// `backend#pool` or `backend`.
    pub name_to_id: String,
    pub total_capacity_gb: Capacity,
    pub free_capacity_gb: Capacity,
    pub allocated_capacity_gb: Capacity,
    pub provisioned_capacity_gb: Capacity,
    pub virtual_free_capacity_gb: Capacity,
    pub reported_at: DateTime<Utc>,
}

/// Build the usage records for one backend's report and its updated pools.
pub fn get_usage(
    backend_id: &str,
    report: &CapabilityReport,
    pools: &[PoolState],
    now: DateTime<Utc>,
) -> Vec<UsageRecord> {
    let reported_at = report.timestamp.unwrap_or(now);
    let mut records = Vec::with_capacity(pools.len() + 1);
    let mut backend = UsageRecord {
        kind: UsageKind::Backend,
        name_to_id: backend_id.to_string(),
        total_capacity_gb: Capacity::Gb(0.0),
        free_capacity_gb: Capacity::Gb(0.0),
        allocated_capacity_gb: Capacity::Gb(0.0),
        provisioned_capacity_gb: Capacity::Gb(0.0),
        virtual_free_capacity_gb: Capacity::Gb(0.0),
        reported_at,
    };

    for pool in pools {
        let record = UsageRecord {
            kind: UsageKind::Pool,
            name_to_id: pool.id(),
            total_capacity_gb: pool.total_capacity_gb.unwrap_or(Capacity::Unknown),
            free_capacity_gb: pool.free_capacity_gb.unwrap_or(Capacity::Unknown),
            allocated_capacity_gb: pool.allocated_capacity_gb.unwrap_or(Capacity::Gb(0.0)),
            provisioned_capacity_gb: pool.provisioned_capacity_gb.unwrap_or(Capacity::Gb(0.0)),
            virtual_free_capacity_gb: pool.virtual_free_capacity_gb(),
            reported_at,
        };

        backend.total_capacity_gb = backend.total_capacity_gb.accumulate(record.total_capacity_gb);
        backend.free_capacity_gb = backend.free_capacity_gb.accumulate(record.free_capacity_gb);
        backend.allocated_capacity_gb = backend
            .allocated_capacity_gb
            .accumulate(record.allocated_capacity_gb);
        backend.provisioned_capacity_gb = backend
            .provisioned_capacity_gb
            .accumulate(record.provisioned_capacity_gb);
        backend.virtual_free_capacity_gb = backend
            .virtual_free_capacity_gb
            .accumulate(record.virtual_free_capacity_gb);

        records.push(record);
    }

    records.push(backend);
    records
}
