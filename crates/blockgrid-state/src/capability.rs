//! Capability reports published by storage backends.
//!
//! A report describes backend-level capacity and features and optionally
//! carries a `pools` list with per-pool overrides. Capacity figures are
//! either a number of GiB or one of the sentinels `"infinite"` /
//! `"unknown"`, which are carried through untouched.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A capacity figure as reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCapacity", into = "RawCapacity")]
pub enum Capacity {
    /// A concrete amount in GiB.
    Gb(f64),
    /// The backend has no meaningful upper bound.
    Infinite,
    /// The backend cannot tell.
    Unknown,
}

impl Capacity {
    /// Numeric value in GiB, `None` for sentinels.
    pub fn as_gb(&self) -> Option<f64> {
        match self {
            Capacity::Gb(v) => Some(*v),
            Capacity::Infinite | Capacity::Unknown => None,
        }
    }

    /// Add two capacities without ever doing arithmetic on a sentinel.
    ///
    /// `Unknown` absorbs everything, `Infinite` absorbs numbers.
    pub fn accumulate(self, other: Capacity) -> Capacity {
        match (self, other) {
            (Capacity::Unknown, _) | (_, Capacity::Unknown) => Capacity::Unknown,
            (Capacity::Infinite, _) | (_, Capacity::Infinite) => Capacity::Infinite,
            (Capacity::Gb(a), Capacity::Gb(b)) => Capacity::Gb(a + b),
        }
    }

    /// Apply `f` to a numeric value; sentinels pass through unchanged.
    pub fn map_gb(self, f: impl FnOnce(f64) -> f64) -> Capacity {
        match self {
            Capacity::Gb(v) => Capacity::Gb(f(v)),
            other => other,
        }
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capacity::Gb(v) => write!(f, "{v}"),
            Capacity::Infinite => f.write_str("infinite"),
            Capacity::Unknown => f.write_str("unknown"),
        }
    }
}

/// Wire shape of a capacity: a JSON number or a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawCapacity {
    Number(f64),
    Text(String),
}

impl TryFrom<RawCapacity> for Capacity {
    type Error = String;

    fn try_from(raw: RawCapacity) -> Result<Self, Self::Error> {
        match raw {
            RawCapacity::Number(v) => Ok(Capacity::Gb(v)),
            RawCapacity::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "infinite" => Ok(Capacity::Infinite),
                "unknown" => Ok(Capacity::Unknown),
                other => other
                    .parse::<f64>()
                    .map(Capacity::Gb)
                    .map_err(|_| format!("invalid capacity value: {s:?}")),
            },
        }
    }
}

impl From<Capacity> for RawCapacity {
    fn from(c: Capacity) -> Self {
        match c {
            Capacity::Gb(v) => RawCapacity::Number(v),
            Capacity::Infinite => RawCapacity::Text("infinite".to_string()),
            Capacity::Unknown => RawCapacity::Text("unknown".to_string()),
        }
    }
}

/// Periodic self-description of a backend (or, nested under `pools`, of
/// one of its pools).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityReport {
    /// Only set on entries of the `pools` list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_backend_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_capacity_gb: Option<Capacity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_capacity_gb: Option<Capacity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocated_capacity_gb: Option<Capacity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned_capacity_gb: Option<Capacity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_over_subscription_ratio: Option<f64>,
    /// Per-pool overrides. Absent means the backend is a single pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pools: Option<Vec<CapabilityReport>>,
    /// Producer-side timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Every other reported capability, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CapabilityReport {
    /// The same report with its producer timestamp cleared, so two
    /// snapshots of identical content compare equal.
    pub fn without_timestamp(&self) -> CapabilityReport {
        let mut copy = self.clone();
        copy.timestamp = None;
        if let Some(pools) = copy.pools.as_mut() {
            for pool in pools {
                pool.timestamp = None;
            }
        }
        copy
    }
}
