//! Contracts for the collaborators the scheduler consumes.
//!
//! Everything that crosses a process boundary (service registry, telemetry,
//! identity service) or embeds a policy language (extra-spec operators,
//! admin filter expressions) sits behind one of these traits.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use blockgrid_state::{ServiceRecord, StateStore};

use crate::usage::UsageRecord;

/// Source of live service records.
pub trait ServiceRegistry: Send + Sync {
    fn list_services(
        &self,
        topic: &str,
        disabled: bool,
        frozen: bool,
    ) -> anyhow::Result<Vec<ServiceRecord>>;

    fn is_up(&self, service: &ServiceRecord) -> bool;
}

/// [`ServiceRegistry`] over the redb state store; liveness comes from the
/// heartbeat age.
#[derive(Clone)]
pub struct StoreServiceRegistry {
    store: StateStore,
    service_down_time: Duration,
}

impl StoreServiceRegistry {
    pub fn new(store: StateStore, service_down_time: Duration) -> Self {
        Self {
            store,
            service_down_time,
        }
    }
}

impl ServiceRegistry for StoreServiceRegistry {
    fn list_services(
        &self,
        topic: &str,
        disabled: bool,
        frozen: bool,
    ) -> anyhow::Result<Vec<ServiceRecord>> {
        Ok(self.store.list_services_by_topic(topic, disabled, frozen)?)
    }

    fn is_up(&self, service: &ServiceRecord) -> bool {
        service.is_up(Utc::now(), self.service_down_time)
    }
}

/// Resolves where an existing volume currently lives.
pub trait VolumeLookup: Send + Sync {
    /// `host@backend#pool` of the volume, `None` if unknown or unplaced.
    fn volume_host(&self, id: &Uuid) -> anyhow::Result<Option<String>>;
}

impl VolumeLookup for StateStore {
    fn volume_host(&self, id: &Uuid) -> anyhow::Result<Option<String>> {
        Ok(self.get_volume(id)?.and_then(|v| v.host))
    }
}

/// Receiver of usage notifications.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn emit_usage(&self, records: Vec<UsageRecord>) -> anyhow::Result<()>;
}

/// Writes usage records to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogUsageSink;

#[async_trait]
impl UsageSink for LogUsageSink {
    async fn emit_usage(&self, records: Vec<UsageRecord>) -> anyhow::Result<()> {
        for record in &records {
            info!(
                kind = ?record.kind,
                name = %record.name_to_id,
                total = %record.total_capacity_gb,
                free = %record.free_capacity_gb,
                virtual_free = %record.virtual_free_capacity_gb,
                "capacity usage"
            );
        }
        Ok(())
    }
}

/// Identity service lookup of a project's tags.
#[async_trait]
pub trait ProjectTagSource: Send + Sync {
    async fn project_tags(&self, project_id: &str) -> anyhow::Result<Vec<String>>;
}

/// Matches a reported capability value against an extra-spec requirement.
pub trait SpecMatcher: Send + Sync {
    fn matches(&self, value: &Value, requirement: &str) -> bool;
}

/// Evaluates an admin-supplied filter expression.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, namespace: &Value) -> anyhow::Result<bool>;
}
