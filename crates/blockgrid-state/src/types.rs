//! Persisted records for the blockgrid state store.
//!
//! Service records describe the volume services known to the control
//! plane; volume records are the minimal view the scheduler needs to
//! resolve affinity hints.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Service ───────────────────────────────────────────────────────

/// A registered backend service instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRecord {
    /// `host` or `host@backend`.
    pub host: String,
    /// Message topic the service listens on (e.g. `volume`).
    pub topic: String,
    pub binary: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub disabled_reason: Option<String>,
    #[serde(default)]
    pub frozen: bool,
    /// Set when the service is forcibly marked down by an operator.
    #[serde(default)]
    pub forced_down: bool,
    #[serde(default)]
    pub cluster_name: Option<String>,
    /// Disabled flag of the owning cluster, if any.
    #[serde(default)]
    pub cluster_disabled: bool,
    pub availability_zone: String,
    pub created_at: DateTime<Utc>,
    /// Last heartbeat.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ServiceRecord {
    /// Build the composite key for the services table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.topic, self.host)
    }

    /// Whether the last heartbeat is recent enough to consider the service
    /// alive.
    pub fn is_up(&self, now: DateTime<Utc>, down_time: Duration) -> bool {
        if self.forced_down {
            return false;
        }
        let last_seen = self.updated_at.unwrap_or(self.created_at);
        let elapsed = now.signed_duration_since(last_seen);
        elapsed.to_std().map(|e| e <= down_time).unwrap_or(true)
    }

    /// Whether the scheduler may place onto this service at all.
    pub fn is_schedulable(&self) -> bool {
        !self.disabled && !self.cluster_disabled
    }

    /// Identity of the schedulable unit: cluster name when clustered.
    pub fn schedulable_id(&self) -> &str {
        self.cluster_name.as_deref().unwrap_or(&self.host)
    }
}

// ── Volume ────────────────────────────────────────────────────────

/// The parts of a volume the scheduler looks at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeRecord {
    pub id: Uuid,
    /// `host@backend#pool` the volume lives on, once placed.
    #[serde(default)]
    pub host: Option<String>,
    pub size_gb: u64,
    #[serde(default)]
    pub project_id: Option<String>,
    pub status: String,
}

impl VolumeRecord {
    /// Build the key for the volumes table.
    pub fn table_key(&self) -> String {
        self.id.to_string()
    }
}
